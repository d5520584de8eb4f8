//! Document classification and eval type selection.
//!
//! `oscap info` reports the structural format of a definitions file; the
//! eval type decides which evaluation grammar (and exit-code policy) the
//! rest of the engine uses. The two concerns are kept separate so the
//! selection stays a pure mapping with no I/O.

use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ScanError, ScanResult};

static DOC_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Document type: (?P<doctype>.+)").unwrap());

/// Evaluation grammar selected from the document type.
///
/// A tagged variant, not a class hierarchy: parser and exit-code policy are
/// looked up by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalType {
    Xccdf,
    Oval,
}

impl EvalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalType::Xccdf => "xccdf",
            EvalType::Oval => "oval",
        }
    }
}

impl fmt::Display for EvalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the document type from `oscap info` output.
///
/// A probe that produced no recognizable `Document type:` line is a tool
/// failure, not a validation failure: the file was already fetched and the
/// probe already ran.
pub fn document_type_from_probe(probe_output: &str) -> ScanResult<String> {
    let captures = DOC_TYPE_PATTERN
        .captures(probe_output.trim_end())
        .ok_or_else(|| {
            ScanError::Tool("no document type found in oscap info output".to_string())
        })?;
    Ok(captures["doctype"].trim().to_string())
}

/// Map an OpenSCAP document type to the eval type to scan it with.
pub fn eval_type_for_document(document_type: &str) -> ScanResult<EvalType> {
    match document_type {
        "Source Data Stream" => Ok(EvalType::Xccdf),
        "XCCDF Checklist" => Ok(EvalType::Xccdf),
        "OVAL Definitions" => Ok(EvalType::Oval),
        other => Err(ScanError::Validation(format!(
            "unsupported OpenSCAP document type: {other}"
        ))),
    }
}

/// Fully derived evaluation parameters for one invocation.
///
/// Read-only after selection; exactly one eval type per invocation.
#[derive(Debug, Clone)]
pub struct EvalSpec {
    pub document_type: String,
    pub eval_type: EvalType,
    pub profile: Option<String>,
    pub tailoring_file: Option<PathBuf>,
    pub fetch_remote_resources: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_from_probe() {
        let probe = "\
Document type: Source Data Stream
Imported: 2020-10-08T09:10:11

Stream: scap_org.open-scap_datastream_from_xccdf
";
        assert_eq!(
            document_type_from_probe(probe).unwrap(),
            "Source Data Stream"
        );
    }

    #[test]
    fn test_document_type_missing_is_tool_error() {
        let err = document_type_from_probe("oscap: command output garbled").unwrap_err();
        assert!(matches!(err, ScanError::Tool(_)));
    }

    #[test]
    fn test_eval_type_mapping_holds_exactly() {
        let cases = [
            ("Source Data Stream", Some(EvalType::Xccdf)),
            ("XCCDF Checklist", Some(EvalType::Xccdf)),
            ("OVAL Definitions", Some(EvalType::Oval)),
            ("OVAL Results", None),
            ("CPE Dictionary", None),
        ];
        for (document_type, expected) in cases {
            match expected {
                Some(eval_type) => {
                    assert_eq!(eval_type_for_document(document_type).unwrap(), eval_type)
                }
                None => assert!(matches!(
                    eval_type_for_document(document_type),
                    Err(ScanError::Validation(_))
                )),
            }
        }
    }

    #[test]
    fn test_eval_type_display() {
        assert_eq!(EvalType::Xccdf.to_string(), "xccdf");
        assert_eq!(EvalType::Oval.to_string(), "oval");
    }
}
