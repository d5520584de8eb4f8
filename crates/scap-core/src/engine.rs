//! Scan orchestration.
//!
//! The engine drives one invocation end to end: resolve inputs, classify
//! the definitions document, select the eval type, run the scan inside the
//! mounted snapshot, and assemble the verdict. The mounted snapshot is
//! exclusively owned by the invocation and released on every exit path.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::document::{document_type_from_probe, eval_type_for_document, EvalSpec, EvalType};
use crate::invocation::EvalInvocation;
use crate::outcome::{resolve_outcome, EvalCapture, ScanOutcome};
use crate::report::{
    ScanArtifact, ScanEvidence, ScanReport, HTML_REPORT, STDOUT_REPORT, XML_REPORT,
};
use crate::{ScanRequest, ScanResult};

/// A mounted, read-accessible copy of a container image's filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedSnapshot {
    pub container_id: String,
    pub mount_path: PathBuf,
}

/// A definitions or tailoring file resolved to the working directory.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub sha256: String,
}

/// The resolved inputs of one invocation; lifetime bounded to its working
/// directory.
#[derive(Debug, Clone)]
pub struct DefinitionsBundle {
    pub definitions: FetchedFile,
    pub tailoring: Option<FetchedFile>,
}

/// Collaborator contract: create a mountable container instance from an
/// image reference and tear it down again. `release` must be callable for
/// any snapshot returned by `acquire`.
pub trait ContainerRuntime {
    fn acquire(&self, image_ref: &str, registry_driver: &str) -> ScanResult<MountedSnapshot>;
    fn release(&self, snapshot: &MountedSnapshot) -> ScanResult<()>;
}

/// Collaborator contract: resolve a definitions/tailoring URI to a local,
/// decompressed file in the given directory.
pub trait DefinitionsFetcher {
    fn fetch(&self, uri: &str, dest_dir: &Path) -> ScanResult<FetchedFile>;
}

/// Collaborator contract for the OpenSCAP tooling.
pub trait ScanBackend {
    /// Raw `oscap info` output for the given definitions file.
    fn probe_info(&self, definitions_file: &Path) -> ScanResult<String>;

    /// Run the eval inside the isolation wrapper against the mounted
    /// snapshot, streaming combined output to the invocation's log path and
    /// an in-memory buffer. Non-zero scanner exits are data, not errors;
    /// only spawn and capture failures are.
    fn evaluate(
        &self,
        snapshot: &MountedSnapshot,
        invocation: &EvalInvocation,
    ) -> ScanResult<EvalCapture>;
}

/// Release-exactly-once scope for a mounted snapshot.
///
/// The happy path calls [`SnapshotGuard::release`] and observes the result;
/// if the invocation unwinds first, `Drop` releases best-effort.
pub struct SnapshotGuard<'a> {
    runtime: &'a dyn ContainerRuntime,
    snapshot: Option<MountedSnapshot>,
}

impl<'a> SnapshotGuard<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, snapshot: MountedSnapshot) -> Self {
        Self {
            runtime,
            snapshot: Some(snapshot),
        }
    }

    pub fn snapshot(&self) -> &MountedSnapshot {
        self.snapshot
            .as_ref()
            .expect("snapshot accessed after release")
    }

    /// Unmount and remove the snapshot, consuming the guard.
    pub fn release(mut self) -> ScanResult<()> {
        match self.snapshot.take() {
            Some(snapshot) => self.runtime.release(&snapshot),
            None => Ok(()),
        }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(release_error) = self.runtime.release(&snapshot) {
                warn!(
                    "failed to release mounted snapshot {}: {release_error}",
                    snapshot.container_id
                );
            }
        }
    }
}

/// Inner result of a scan that ran to completion.
struct CompletedScan {
    document_type: String,
    eval_type: EvalType,
    bundle: DefinitionsBundle,
    invocation: EvalInvocation,
    outcome: ScanOutcome,
}

/// The compliance scan engine.
///
/// Holds the three collaborator seams; one `run` call is one fully
/// synchronous invocation.
pub struct ComplianceScanner {
    runtime: Box<dyn ContainerRuntime>,
    fetcher: Box<dyn DefinitionsFetcher>,
    backend: Box<dyn ScanBackend>,
}

impl ComplianceScanner {
    pub fn new(
        runtime: Box<dyn ContainerRuntime>,
        fetcher: Box<dyn DefinitionsFetcher>,
        backend: Box<dyn ScanBackend>,
    ) -> Self {
        Self {
            runtime,
            fetcher,
            backend,
        }
    }

    /// Run one scan invocation.
    ///
    /// Fatal errors are converted into a failed report carrying the error
    /// text; rule failures are a first-class negative result, not an error.
    pub fn run(&self, request: &ScanRequest, work_dir: &Path) -> ScanReport {
        let id = Uuid::new_v4();
        let started_at = Utc::now();

        let (success, message, artifacts, evidence) = match self.scan(request, work_dir) {
            Ok(scan) => {
                info!(
                    "oscap scan completed with eval success: {}",
                    scan.outcome.success
                );
                let message = if scan.outcome.success {
                    String::new()
                } else {
                    format!("OSCAP eval found issues:\n{}", scan.outcome.failures_text())
                };
                (
                    scan.outcome.success,
                    message,
                    artifacts_for(&scan.invocation),
                    evidence_for(&scan),
                )
            }
            Err(scan_error) => {
                error!("compliance scan failed: {scan_error}");
                (false, scan_error.to_string(), Vec::new(), Vec::new())
            }
        };

        ScanReport {
            id,
            image_ref: request.image_ref.clone(),
            started_at,
            completed_at: Utc::now(),
            success,
            message,
            artifacts,
            evidence,
        }
    }

    fn scan(&self, request: &ScanRequest, work_dir: &Path) -> ScanResult<CompletedScan> {
        request.validate()?;
        fs::create_dir_all(work_dir)?;

        info!("creating container from image {}", request.image_ref);
        let snapshot = self
            .runtime
            .acquire(&request.image_ref, &request.registry_driver)?;
        info!(
            "mounted container {} at {}",
            snapshot.container_id,
            snapshot.mount_path.display()
        );
        let guard = SnapshotGuard::new(self.runtime.as_ref(), snapshot);

        let scan = self.scan_mounted(request, guard.snapshot(), work_dir);
        let released = guard.release();

        let completed = scan?;
        released?;
        Ok(completed)
    }

    fn scan_mounted(
        &self,
        request: &ScanRequest,
        snapshot: &MountedSnapshot,
        work_dir: &Path,
    ) -> ScanResult<CompletedScan> {
        info!("downloading input definitions {}", request.definitions_uri);
        let definitions = self.fetcher.fetch(&request.definitions_uri, work_dir)?;
        let tailoring = match &request.tailoring_uri {
            Some(tailoring_uri) => {
                info!("downloading tailoring file {tailoring_uri}");
                Some(self.fetcher.fetch(tailoring_uri, work_dir)?)
            }
            None => None,
        };
        let bundle = DefinitionsBundle {
            definitions,
            tailoring,
        };

        let probe_output = self.backend.probe_info(&bundle.definitions.path)?;
        let document_type = document_type_from_probe(&probe_output)?;
        let eval_type = eval_type_for_document(&document_type)?;
        info!("document type '{document_type}' selects {eval_type} eval");

        let spec = EvalSpec {
            document_type: document_type.clone(),
            eval_type,
            profile: request.profile.clone(),
            tailoring_file: bundle.tailoring.as_ref().map(|fetched| fetched.path.clone()),
            fetch_remote_resources: request.fetch_remote_resources,
        };
        let invocation = EvalInvocation::new(&spec, &bundle.definitions.path, work_dir);

        info!("running oscap scan");
        let capture = self.backend.evaluate(snapshot, &invocation)?;
        let outcome = resolve_outcome(eval_type, &capture)?;

        Ok(CompletedScan {
            document_type,
            eval_type,
            bundle,
            invocation,
            outcome,
        })
    }
}

fn artifacts_for(invocation: &EvalInvocation) -> Vec<ScanArtifact> {
    vec![
        ScanArtifact::new(HTML_REPORT, invocation.report_path.clone()),
        ScanArtifact::new(XML_REPORT, invocation.results_path.clone()),
        ScanArtifact::new(STDOUT_REPORT, invocation.log_path.clone()),
    ]
}

fn evidence_for(scan: &CompletedScan) -> Vec<ScanEvidence> {
    let mut evidence = vec![
        ScanEvidence::new("oscap-document-type", scan.document_type.clone()),
        ScanEvidence::new("oscap-eval-type", scan.eval_type.as_str()),
        ScanEvidence::new("definitions-sha256", scan.bundle.definitions.sha256.clone()),
    ];
    if let Some(tailoring) = &scan.bundle.tailoring {
        evidence.push(ScanEvidence::new(
            "tailoring-sha256",
            tailoring.sha256.clone(),
        ));
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScanError;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeRuntime {
        acquires: Rc<Cell<u32>>,
        releases: Rc<Cell<u32>>,
    }

    impl FakeRuntime {
        fn new() -> (Self, Rc<Cell<u32>>, Rc<Cell<u32>>) {
            let acquires = Rc::new(Cell::new(0));
            let releases = Rc::new(Cell::new(0));
            (
                Self {
                    acquires: Rc::clone(&acquires),
                    releases: Rc::clone(&releases),
                },
                acquires,
                releases,
            )
        }
    }

    impl ContainerRuntime for FakeRuntime {
        fn acquire(&self, _image_ref: &str, _registry_driver: &str) -> ScanResult<MountedSnapshot> {
            self.acquires.set(self.acquires.get() + 1);
            Ok(MountedSnapshot {
                container_id: "working-container-1".to_string(),
                mount_path: PathBuf::from("/proc/self/fake-mount"),
            })
        }

        fn release(&self, _snapshot: &MountedSnapshot) -> ScanResult<()> {
            self.releases.set(self.releases.get() + 1);
            Ok(())
        }
    }

    struct FakeFetcher;

    impl DefinitionsFetcher for FakeFetcher {
        fn fetch(&self, uri: &str, dest_dir: &Path) -> ScanResult<FetchedFile> {
            crate::validate_source_uri(uri)?;
            Ok(FetchedFile {
                path: dest_dir.join("defs.xml"),
                sha256: "0".repeat(64),
            })
        }
    }

    struct FakeBackend {
        document_type: &'static str,
        eval: ScanResult<EvalCapture>,
    }

    impl ScanBackend for FakeBackend {
        fn probe_info(&self, _definitions_file: &Path) -> ScanResult<String> {
            Ok(format!("Document type: {}\nImported: today\n", self.document_type))
        }

        fn evaluate(
            &self,
            _snapshot: &MountedSnapshot,
            _invocation: &EvalInvocation,
        ) -> ScanResult<EvalCapture> {
            match &self.eval {
                Ok(capture) => Ok(capture.clone()),
                Err(ScanError::Tool(text)) => Err(ScanError::Tool(text.clone())),
                Err(_) => Err(ScanError::Tool("unexpected".to_string())),
            }
        }
    }

    fn scanner(
        runtime: FakeRuntime,
        backend: FakeBackend,
    ) -> ComplianceScanner {
        ComplianceScanner::new(Box::new(runtime), Box::new(FakeFetcher), Box::new(backend))
    }

    fn request() -> ScanRequest {
        ScanRequest::new("quay.io/org/app:1.0", "https://example.com/defs.xml")
    }

    #[test]
    fn test_release_called_exactly_once_on_success() {
        let (runtime, acquires, releases) = FakeRuntime::new();
        let backend = FakeBackend {
            document_type: "Source Data Stream",
            eval: Ok(EvalCapture {
                exit_code: 0,
                output: "Title\tx\nResult\tpass\n".to_string(),
            }),
        };
        let work_dir = tempfile::tempdir().unwrap();

        let report = scanner(runtime, backend).run(&request(), work_dir.path());
        assert!(report.success);
        assert!(report.message.is_empty());
        assert_eq!(acquires.get(), 1);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_release_called_exactly_once_when_executor_fails() {
        let (runtime, acquires, releases) = FakeRuntime::new();
        let backend = FakeBackend {
            document_type: "Source Data Stream",
            eval: Err(ScanError::Tool("oscap-chroot crashed".to_string())),
        };
        let work_dir = tempfile::tempdir().unwrap();

        let report = scanner(runtime, backend).run(&request(), work_dir.path());
        assert!(!report.success);
        assert!(report.message.contains("oscap-chroot crashed"));
        assert_eq!(acquires.get(), 1);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_validation_fails_before_acquire() {
        let (runtime, acquires, releases) = FakeRuntime::new();
        let backend = FakeBackend {
            document_type: "Source Data Stream",
            eval: Ok(EvalCapture {
                exit_code: 0,
                output: String::new(),
            }),
        };
        let work_dir = tempfile::tempdir().unwrap();

        let mut bad_request = request();
        bad_request.definitions_uri = "ftp://example.com/defs.xml".to_string();
        let report = scanner(runtime, backend).run(&bad_request, work_dir.path());

        assert!(!report.success);
        assert!(report.message.contains("known protocol"));
        assert_eq!(acquires.get(), 0);
        assert_eq!(releases.get(), 0);
    }

    #[test]
    fn test_rule_failure_is_data_with_artifacts() {
        let (runtime, _, releases) = FakeRuntime::new();
        let backend = FakeBackend {
            document_type: "OVAL Definitions",
            eval: Ok(EvalCapture {
                exit_code: 0,
                output: "Definition oval:a:def:1: false\nDefinition oval:b:def:2: true\n"
                    .to_string(),
            }),
        };
        let work_dir = tempfile::tempdir().unwrap();

        let report = scanner(runtime, backend).run(&request(), work_dir.path());
        assert!(!report.success);
        assert!(report.message.starts_with("OSCAP eval found issues:"));
        assert!(report.message.contains("oval:b:def:2"));
        assert!(!report.message.contains("oval:a:def:1: false"));
        assert_eq!(releases.get(), 1);

        for name in [STDOUT_REPORT, XML_REPORT, HTML_REPORT] {
            assert!(report.artifact(name).is_some(), "missing artifact {name}");
        }
        assert_eq!(report.evidence_value("oscap-eval-type"), Some("oval"));
        assert_eq!(
            report.evidence_value("oscap-document-type"),
            Some("OVAL Definitions")
        );
    }

    #[test]
    fn test_unknown_document_type_fails_after_release() {
        let (runtime, _, releases) = FakeRuntime::new();
        let backend = FakeBackend {
            document_type: "CPE Dictionary",
            eval: Ok(EvalCapture {
                exit_code: 0,
                output: String::new(),
            }),
        };
        let work_dir = tempfile::tempdir().unwrap();

        let report = scanner(runtime, backend).run(&request(), work_dir.path());
        assert!(!report.success);
        assert!(report.message.contains("unsupported OpenSCAP document type"));
        assert_eq!(releases.get(), 1);
        assert!(report.artifacts.is_empty());
    }
}
