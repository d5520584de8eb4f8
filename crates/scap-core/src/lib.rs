//! Compliance Scan Core Engine
//!
//! This crate provides the core engine for scanning container images
//! against OpenSCAP security definitions: document classification, eval
//! type selection, output parsing, and result assembly.

pub mod document;
pub mod engine;
pub mod invocation;
pub mod outcome;
pub mod parser;
pub mod report;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use document::{document_type_from_probe, eval_type_for_document, EvalSpec, EvalType};
pub use engine::{
    ComplianceScanner, ContainerRuntime, DefinitionsBundle, DefinitionsFetcher, FetchedFile,
    MountedSnapshot, ScanBackend, SnapshotGuard,
};
pub use invocation::EvalInvocation;
pub use outcome::{resolve_outcome, EvalCapture, ScanOutcome};
pub use parser::{parse_eval_output, sanitize_output, EvalFindings};
pub use report::{ScanArtifact, ScanEvidence, ScanReport};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Tool invocation error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Registry driver prefix used when none is configured.
pub const DEFAULT_REGISTRY_DRIVER: &str = "containers-storage:";

/// Everything the engine needs to run one scan invocation.
///
/// Immutable once constructed; configuration precedence and previous-step
/// chaining are the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Container image to scan.
    pub image_ref: String,
    /// Registry driver prefix for the pull source, e.g. `containers-storage:`.
    pub registry_driver: String,
    /// URI of the definitions file (file://|http://|https://, .xml|.bz2).
    pub definitions_uri: String,
    /// URI of an optional tailoring file, same restrictions.
    pub tailoring_uri: Option<String>,
    /// Profile to evaluate, if the definitions carry more than one.
    pub profile: Option<String>,
    /// Fetch remote resources referenced by the definitions.
    pub fetch_remote_resources: bool,
}

impl ScanRequest {
    pub fn new(image_ref: impl Into<String>, definitions_uri: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            registry_driver: DEFAULT_REGISTRY_DRIVER.to_string(),
            definitions_uri: definitions_uri.into(),
            tailoring_uri: None,
            profile: None,
            fetch_remote_resources: true,
        }
    }

    /// Validate the request before any external process runs.
    pub fn validate(&self) -> ScanResult<()> {
        if self.image_ref.trim().is_empty() {
            return Err(ScanError::Validation(
                "container image reference must not be empty".to_string(),
            ));
        }
        validate_source_uri(&self.definitions_uri)?;
        if let Some(tailoring_uri) = &self.tailoring_uri {
            validate_source_uri(tailoring_uri)?;
        }
        Ok(())
    }
}

/// Check that a definitions/tailoring source URI uses a known protocol and
/// payload type. Runs before any network or file access.
pub fn validate_source_uri(uri: &str) -> ScanResult<()> {
    if !(uri.starts_with("file://") || uri.starts_with("http://") || uri.starts_with("https://")) {
        return Err(ScanError::Validation(format!(
            "definitions source ({uri}) must start with a known protocol (file://|http://|https://)"
        )));
    }
    if !(uri.ends_with(".xml") || uri.ends_with(".bz2")) {
        return Err(ScanError::Validation(format!(
            "definitions source ({uri}) must be of a known type (xml|bz2)"
        )));
    }
    Ok(())
}

/// Parse a configuration truth value the way external config layers spell
/// them: `y`/`yes`/`t`/`true`/`on`/`1` and their negative counterparts.
pub fn parse_truthy(value: &str) -> ScanResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        other => Err(ScanError::Validation(format!(
            "invalid truth value: {other:?}"
        ))),
    }
}
