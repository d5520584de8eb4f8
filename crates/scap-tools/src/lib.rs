//! External Tool Integration for Compliance Scanning
//!
//! This crate wraps the external binaries the scan engine drives:
//! `buildah` for unprivileged container filesystem snapshots and
//! `oscap`/`oscap-chroot` for document probes and isolated evals.

pub mod buildah;
pub mod capture;
pub mod oscap;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

pub use buildah::Buildah;
pub use capture::{run_with_tee, SharedBuffer, TeeWriter};
pub use oscap::Oscap;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Run a command to completion, capturing stdout and stderr separately.
pub fn run_command<I, S>(cmd: &Path, args: I) -> ToolResult<(String, String, i32)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(cmd)
        .args(args)
        .output()
        .map_err(|spawn_error| {
            ToolError::ExecutionFailed(format!("{}: {spawn_error}", cmd.display()))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    Ok((stdout, stderr, code))
}

/// Check if a command exists in PATH
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Get command path
pub fn get_command_path(cmd: &str) -> Option<PathBuf> {
    which::which(cmd).ok()
}
