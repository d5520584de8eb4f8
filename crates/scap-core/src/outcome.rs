//! Exit-code policy for the two eval types.
//!
//! The two grammars have incompatible exit-code conventions, inherited from
//! the underlying scanner and preserved exactly:
//!
//! * xccdf: 0 means every rule passed; 2 means at least one rule failed or
//!   was indeterminate (an expected, non-fatal outcome); anything else,
//!   including 1, is a fatal tool error.
//! * oval: 0 is returned regardless of rule outcome, so the output text is
//!   the only truth source; any non-zero exit is a fatal tool error.

use crate::document::EvalType;
use crate::parser::{parse_eval_output, sanitize_output};
use crate::{ScanError, ScanResult};

/// Raw result of one scanner invocation: exit code plus the dual-captured
/// combined stdout/stderr text.
#[derive(Debug, Clone)]
pub struct EvalCapture {
    pub exit_code: i32,
    pub output: String,
}

/// Verdict of one scan invocation that ran to completion.
///
/// Rule failure is data, never an error: `success` is false and
/// `failing_blocks` enumerates the failures.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub success: bool,
    pub failing_blocks: Vec<String>,
    /// Sanitized captured text the verdict was parsed from.
    pub output: String,
}

impl ScanOutcome {
    /// Failing blocks joined by blank lines, in first-seen order.
    pub fn failures_text(&self) -> String {
        self.failing_blocks.join("\n\n")
    }
}

/// Apply the per-grammar exit-code policy to a completed invocation.
pub fn resolve_outcome(eval_type: EvalType, capture: &EvalCapture) -> ScanResult<ScanOutcome> {
    let output = sanitize_output(&capture.output);
    match (eval_type, capture.exit_code) {
        (EvalType::Xccdf, 0) => Ok(ScanOutcome {
            success: true,
            failing_blocks: Vec::new(),
            output,
        }),
        (EvalType::Xccdf, 2) => {
            let findings = parse_eval_output(eval_type, &output);
            Ok(ScanOutcome {
                success: false,
                failing_blocks: findings.failing_blocks,
                output,
            })
        }
        (EvalType::Oval, 0) => {
            let findings = parse_eval_output(eval_type, &output);
            Ok(ScanOutcome {
                success: findings.is_pass(),
                failing_blocks: findings.failing_blocks,
                output,
            })
        }
        (_, code) => Err(ScanError::Tool(format!(
            "error running 'oscap {eval_type} eval': exited with code {code}"
        ))),
    }
}
