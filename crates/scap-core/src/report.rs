//! Assembled scan results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Artifact names consumed by result sinks.
pub const STDOUT_REPORT: &str = "stdout-report";
pub const XML_REPORT: &str = "xml-report";
pub const HTML_REPORT: &str = "html-report";

/// A named file artifact produced by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanArtifact {
    pub name: String,
    pub path: PathBuf,
}

impl ScanArtifact {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
        }
    }
}

/// A named evidence value recorded alongside the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvidence {
    pub name: String,
    pub value: String,
}

impl ScanEvidence {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Final result of one scan invocation.
///
/// `message` is empty on success, enumerates failing rule blocks on rule
/// failure, and carries the propagated error text on fatal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub image_ref: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub message: String,
    pub artifacts: Vec<ScanArtifact>,
    pub evidence: Vec<ScanEvidence>,
}

impl ScanReport {
    pub fn artifact(&self, name: &str) -> Option<&ScanArtifact> {
        self.artifacts.iter().find(|artifact| artifact.name == name)
    }

    pub fn evidence_value(&self, name: &str) -> Option<&str> {
        self.evidence
            .iter()
            .find(|evidence| evidence.name == name)
            .map(|evidence| evidence.value.as_str())
    }
}
