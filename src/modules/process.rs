use std::fmt;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeoutInfo {
    pub label: String,
    pub timeout_secs: u64,
}

#[derive(Debug)]
pub enum ProcessError {
    /// The program could not be started (missing binary, permissions).
    Spawn {
        label: String,
        source: std::io::Error,
    },
    Timeout(TimeoutInfo),
    Message(String),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { label, source } => write!(f, "{label} spawn failed: {source}"),
            Self::Timeout(info) => {
                write!(f, "{} timed out after {}s", info.label, info.timeout_secs)
            }
            Self::Message(msg) => write!(f, "{msg}"),
        }
    }
}

fn spawn(cmd: &mut Command, label: &str) -> Result<Child, ProcessError> {
    cmd.spawn().map_err(|source| ProcessError::Spawn {
        label: label.to_string(),
        source,
    })
}

/// Runs to completion and collects stdout/stderr. No deadline is applied;
/// bounding the wrapped command is the caller's policy.
pub fn run_command_output(mut cmd: Command, label: &str) -> Result<Output, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = spawn(&mut cmd, label)?;
    child
        .wait_with_output()
        .map_err(|e| ProcessError::Message(format!("{label} read output failed: {e}")))
}

/// Feeds `stdin_text` from a writer thread so a child that streams output
/// before draining its input cannot deadlock against us.
pub fn run_command_with_stdin_output(
    mut cmd: Command,
    stdin_text: &str,
    label: &str,
) -> Result<Output, ProcessError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(&mut cmd, label)?;
    let writer = child.stdin.take().map(|mut stdin| {
        let payload = stdin_text.as_bytes().to_vec();
        thread::spawn(move || stdin.write_all(&payload))
    });
    let out = child
        .wait_with_output()
        .map_err(|e| ProcessError::Message(format!("{label} read output failed: {e}")))?;
    if let Some(handle) = writer {
        match handle.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit before reading all input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(ProcessError::Message(format!(
                    "{label} failed writing stdin: {e}"
                )));
            }
            Err(_) => {
                return Err(ProcessError::Message(format!(
                    "{label} stdin writer panicked"
                )));
            }
        }
    }
    Ok(out)
}

fn wait_bounded(
    child: &mut Child,
    label: &str,
    timeout_secs: u64,
) -> Result<ExitStatus, ProcessError> {
    let secs = timeout_secs.max(1);
    match child
        .wait_timeout(Duration::from_secs(secs))
        .map_err(|e| ProcessError::Message(format!("{label} wait timeout error: {e}")))?
    {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(ProcessError::Timeout(TimeoutInfo {
                label: label.to_string(),
                timeout_secs: secs,
            }))
        }
    }
}

/// Short-lived tool probes (`--help`, `--version`) only.
pub fn run_probe_status(
    mut cmd: Command,
    label: &str,
    timeout_secs: u64,
) -> Result<ExitStatus, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = spawn(&mut cmd, label)?;
    wait_bounded(&mut child, label, timeout_secs)
}

/// Probe variant that keeps the (small) stdout/stderr payload.
pub fn run_probe_output(
    mut cmd: Command,
    label: &str,
    timeout_secs: u64,
) -> Result<Output, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(&mut cmd, label)?;
    let status = wait_bounded(&mut child, label, timeout_secs)?;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let Some(mut s) = child.stdout.take() {
        let _ = s.read_to_end(&mut stdout);
    }
    if let Some(mut s) = child.stderr.take() {
        let _ = s.read_to_end(&mut stderr);
    }
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}
