//! Scanner invocation assembly.
//!
//! Builds the `oscap-chroot <mount> <evaltype> eval ...` argument vector
//! and the per-invocation artifact paths inside the working directory.

use std::path::{Path, PathBuf};

use crate::document::{EvalSpec, EvalType};

/// One fully assembled eval invocation: arguments plus artifact paths.
#[derive(Debug, Clone)]
pub struct EvalInvocation {
    pub eval_type: EvalType,
    pub definitions_file: PathBuf,
    pub profile: Option<String>,
    pub tailoring_file: Option<PathBuf>,
    pub fetch_remote_resources: bool,
    /// Durable copy of the combined stdout/stderr stream.
    pub log_path: PathBuf,
    /// XML results document written by the scanner.
    pub results_path: PathBuf,
    /// HTML report document written by the scanner.
    pub report_path: PathBuf,
}

impl EvalInvocation {
    pub fn new(spec: &EvalSpec, definitions_file: &Path, work_dir: &Path) -> Self {
        let eval_type = spec.eval_type;
        Self {
            eval_type,
            definitions_file: definitions_file.to_path_buf(),
            profile: spec.profile.clone(),
            tailoring_file: spec.tailoring_file.clone(),
            fetch_remote_resources: spec.fetch_remote_resources,
            log_path: work_dir.join(format!("oscap-{eval_type}-out")),
            results_path: work_dir.join(format!("oscap-{eval_type}-results.xml")),
            report_path: work_dir.join(format!("oscap-{eval_type}-report.html")),
        }
    }

    /// Argument vector for `oscap-chroot`, scanning the given mount path.
    pub fn to_args(&self, mount_path: &Path) -> Vec<String> {
        let mut args = vec![
            mount_path.display().to_string(),
            self.eval_type.to_string(),
            "eval".to_string(),
        ];
        if let Some(profile) = &self.profile {
            args.push(format!("--profile={profile}"));
        }
        if self.fetch_remote_resources {
            args.push("--fetch-remote-resources".to_string());
        }
        if let Some(tailoring_file) = &self.tailoring_file {
            args.push(format!("--tailoring-file={}", tailoring_file.display()));
        }
        args.push(format!("--results={}", self.results_path.display()));
        args.push(format!("--report={}", self.report_path.display()));
        args.push(self.definitions_file.display().to_string());
        args
    }
}
