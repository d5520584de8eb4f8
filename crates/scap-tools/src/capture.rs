//! Dual-sink output capture.
//!
//! The scan's combined stdout/stderr stream must land in a durable log file
//! and an in-memory parse buffer at the same time, without a second read
//! pass over the file. A single fan-out writer forwards each chunk to every
//! sink; one pump thread per pipe feeds it, and both are joined before the
//! invocation returns.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::{ToolError, ToolResult};

/// Fan-out writer: forwards every chunk to each underlying sink.
pub struct TeeWriter {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl TeeWriter {
    pub fn new(sinks: Vec<Box<dyn Write + Send>>) -> Self {
        Self { sinks }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &mut self.sinks {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// A `Write` handle onto a shared byte buffer.
#[derive(Clone)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "capture buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run a command, streaming combined stdout+stderr into `log_path` and an
/// in-memory buffer simultaneously. Blocks until the process exits and both
/// pump threads drain; returns the exit code and the captured text.
pub fn run_with_tee(mut command: Command, log_path: &Path) -> ToolResult<(i32, String)> {
    let log_file = File::create(log_path)?;
    let buffer = SharedBuffer::new();
    let tee = Arc::new(Mutex::new(TeeWriter::new(vec![
        Box::new(log_file),
        Box::new(buffer.clone()),
    ])));

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|spawn_error| ToolError::ExecutionFailed(spawn_error.to_string()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::ExecutionFailed("no stdout pipe".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolError::ExecutionFailed("no stderr pipe".to_string()))?;

    let stdout_pump = pump(stdout, Arc::clone(&tee));
    let stderr_pump = pump(stderr, Arc::clone(&tee));

    let status = child.wait()?;
    for handle in [stdout_pump, stderr_pump] {
        handle
            .join()
            .map_err(|_| ToolError::ExecutionFailed("output pump thread panicked".to_string()))??;
    }

    if let Ok(mut tee) = tee.lock() {
        tee.flush()?;
    }

    let captured = String::from_utf8_lossy(&buffer.contents()).to_string();
    Ok((status.code().unwrap_or(-1), captured))
}

fn pump<R: Read + Send + 'static>(
    mut reader: R,
    writer: Arc<Mutex<TeeWriter>>,
) -> thread::JoinHandle<ToolResult<()>> {
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            let mut writer = writer.lock().map_err(|_| {
                ToolError::ExecutionFailed("output writer poisoned".to_string())
            })?;
            writer.write_all(&chunk[..read])?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::get_command_path;

    #[test]
    fn test_tee_writer_fans_out_to_all_sinks() {
        let first = SharedBuffer::new();
        let second = SharedBuffer::new();
        let mut tee = TeeWriter::new(vec![Box::new(first.clone()), Box::new(second.clone())]);

        tee.write_all(b"Definition oval:x:def:1: true\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(first.contents(), b"Definition oval:x:def:1: true\n");
        assert_eq!(first.contents(), second.contents());
    }

    #[test]
    fn test_run_with_tee_captures_both_streams_and_log() {
        let sh = get_command_path("sh").expect("sh available");
        let work_dir = tempfile::tempdir().unwrap();
        let log_path = work_dir.path().join("scan-out");

        let mut command = Command::new(sh);
        command.args(["-c", "echo from-stdout; echo from-stderr 1>&2; exit 2"]);
        let (code, captured) = run_with_tee(command, &log_path).unwrap();

        assert_eq!(code, 2);
        assert!(captured.contains("from-stdout"));
        assert!(captured.contains("from-stderr"));

        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(logged.len(), captured.len());
        assert!(logged.contains("from-stdout"));
        assert!(logged.contains("from-stderr"));
    }
}
