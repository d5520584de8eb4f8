//! oscap integration: document probe and isolated eval.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use scap_core::{EvalCapture, EvalInvocation, MountedSnapshot, ScanBackend, ScanError, ScanResult};

use crate::capture::run_with_tee;
use crate::{run_command, ToolError, ToolResult};

/// oscap / oscap-chroot wrapper
pub struct Oscap {
    oscap_executable: PathBuf,
    buildah_executable: PathBuf,
}

impl Oscap {
    pub fn new() -> ToolResult<Self> {
        let oscap_executable = crate::get_command_path("oscap")
            .ok_or_else(|| ToolError::NotFound("oscap".to_string()))?;
        let buildah_executable = crate::get_command_path("buildah")
            .ok_or_else(|| ToolError::NotFound("buildah".to_string()))?;
        Ok(Self {
            oscap_executable,
            buildah_executable,
        })
    }

    pub fn with_executables(oscap_executable: PathBuf, buildah_executable: PathBuf) -> Self {
        Self {
            oscap_executable,
            buildah_executable,
        }
    }

    /// `oscap info <file>` output.
    pub fn info(&self, definitions_file: &Path) -> ToolResult<String> {
        let (stdout, stderr, code) = run_command(
            &self.oscap_executable,
            [OsStr::new("info"), definitions_file.as_os_str()],
        )?;
        if code != 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "oscap info {} exited with code {code}: {}",
                definitions_file.display(),
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

impl ScanBackend for Oscap {
    fn probe_info(&self, definitions_file: &Path) -> ScanResult<String> {
        debug!(
            "probing document type of {}",
            definitions_file.display()
        );
        self.info(definitions_file).map_err(|tool_error| {
            ScanError::Tool(format!(
                "error getting document type of oscap input file ({}): {tool_error}",
                definitions_file.display()
            ))
        })
    }

    fn evaluate(
        &self,
        snapshot: &MountedSnapshot,
        invocation: &EvalInvocation,
    ) -> ScanResult<EvalCapture> {
        let args = invocation.to_args(&snapshot.mount_path);
        info!(
            "running oscap-chroot {} eval against {}",
            invocation.eval_type,
            snapshot.mount_path.display()
        );

        // run inside `buildah unshare` so the mount is reachable rootless
        let mut command = Command::new(&self.buildah_executable);
        command.arg("unshare").arg("oscap-chroot").args(&args);

        let (exit_code, output) = run_with_tee(command, &invocation.log_path)
            .map_err(|tool_error| ScanError::Tool(tool_error.to_string()))?;
        debug!("oscap-chroot exited with code {exit_code}");

        Ok(EvalCapture { exit_code, output })
    }
}
