//! Output grammars for the two OpenSCAP eval types.
//!
//! xccdf output is block structured: each evaluated rule spans from a
//! `Title` line through its terminating `Result <verdict>` line. oval
//! output is line structured: `Definition <id>: (true|false)`, where `true`
//! means the condition (vulnerability) is present.
//!
//! Example xccdf input:
//!
//! ```text
//! Title   RHSA-2020:4186: spice and spice-gtk security update (Important)
//! Rule    xccdf_com.redhat.rhsa_rule_oval-com.redhat.rhsa-def-20204186
//! Ident   RHSA-2020:4186
//! Ident   CVE-2020-14355
//! Result  pass
//!
//! Title   RHSA-2020:3658: librepo security update (Important)
//! Rule    xccdf_com.redhat.rhsa_rule_oval-com.redhat.rhsa-def-20203658
//! Ident   RHSA-2020:3658
//! Ident   CVE-2020-14352
//! Result  fail
//! ```
//!
//! Example oval input:
//!
//! ```text
//! Definition oval:com.redhat.rhsa:def:20202031: false
//! Definition oval:com.redhat.rhsa:def:20201998: true
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::EvalType;

static XCCDF_RULE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(?P<ruleblock>Title.+?Result\s+(?P<ruleresult>[^\n]+))\n").unwrap()
});
static XCCDF_FAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"fail").unwrap());

static OVAL_RULE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?P<ruleblock>^.*:\s*(?P<ruleresult>true|false)\s*$)$").unwrap()
});
static OVAL_FAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"true").unwrap());

static STYLING_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

/// Strip carriage returns and terminal styling sequences from captured tool
/// output. The scanner interleaves both with terminal redraws; neither may
/// reach parsed failing-block text.
pub fn sanitize_output(raw: &str) -> String {
    let stripped = raw.replace('\r', "");
    STYLING_PATTERN.replace_all(&stripped, "").into_owned()
}

/// Parsed rule verdicts for one eval run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalFindings {
    /// Raw text of every failing rule block, in first-seen order.
    pub failing_blocks: Vec<String>,
}

impl EvalFindings {
    pub fn is_pass(&self) -> bool {
        self.failing_blocks.is_empty()
    }

    /// Failing blocks joined by blank lines, in first-seen order.
    pub fn failures_text(&self) -> String {
        self.failing_blocks.join("\n\n")
    }
}

/// Parse sanitized eval output with the grammar for the given eval type.
pub fn parse_eval_output(eval_type: EvalType, output: &str) -> EvalFindings {
    match eval_type {
        EvalType::Xccdf => parse_xccdf(output),
        EvalType::Oval => parse_oval(output),
    }
}

fn parse_xccdf(output: &str) -> EvalFindings {
    let mut failing_blocks = Vec::new();
    for captures in XCCDF_RULE_PATTERN.captures_iter(output) {
        // match the verdict, not the whole block: styling may be embedded
        if XCCDF_FAIL_PATTERN.is_match(&captures["ruleresult"]) {
            failing_blocks.push(captures["ruleblock"].to_string());
        }
    }
    EvalFindings { failing_blocks }
}

fn parse_oval(output: &str) -> EvalFindings {
    let mut failing_blocks = Vec::new();
    for captures in OVAL_RULE_PATTERN.captures_iter(output) {
        if OVAL_FAIL_PATTERN.is_match(&captures["ruleresult"]) {
            failing_blocks.push(captures["ruleblock"].to_string());
        }
    }
    EvalFindings { failing_blocks }
}
