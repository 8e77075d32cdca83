use std::process::{Command, Output};

use crate::error::{CxError, CxResult};
use crate::process::{ProcessError, run_command_output};

use super::capture_reduce::native_reduce_output;
use super::capture_reducer::{ReducerConfig, should_use_reducer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProvider {
    Reducer,
    Native,
    Raw,
}

impl CaptureProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reducer => "reducer",
            Self::Native => "native",
            Self::Raw => "raw",
        }
    }
}

/// Output of one wrapped command. `processed` is what the budgeter sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub raw: String,
    pub processed: String,
    pub raw_len_chars: usize,
    pub raw_len_lines: usize,
    pub processed_len_chars: usize,
    pub processed_len_lines: usize,
    pub reducer_used: bool,
    pub provider: CaptureProvider,
    /// Exit status of the wrapped command (1 when killed by a signal).
    pub status: i32,
}

pub fn text_len(s: &str) -> (usize, usize) {
    (s.chars().count(), s.lines().count())
}

fn collect_text(output: &Output, with_stderr: bool) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    if with_stderr {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
    }
    combined
}

fn run_capture(command: &[String], with_stderr: bool) -> Result<(String, i32), ProcessError> {
    let Some((bin, args)) = command.split_first() else {
        return Err(ProcessError::Message("missing command".to_string()));
    };
    let mut c = Command::new(bin);
    c.args(args);
    let output = run_command_output(c, &format!("system command '{bin}'"))?;
    let status = output.status.code().unwrap_or(1);
    Ok((collect_text(&output, with_stderr), status))
}

fn run_reducer(cmd: &[String], cfg: &ReducerConfig) -> Option<String> {
    let mut reducer_cmd = cfg.program.clone();
    reducer_cmd.extend_from_slice(cmd);
    match run_capture(&reducer_cmd, cfg.capture_stderr) {
        Ok((out, 0)) if !out.trim().is_empty() => Some(out),
        _ => None,
    }
}

/// Runs `cmd` and produces its captured output. A command that cannot start
/// is a `CxError::Capture`; one that runs and exits non-zero is ordinary
/// output with that status. Reducer failures always fall back silently.
pub fn capture_command(
    cmd: &[String],
    cfg: &ReducerConfig,
    reducer_usable: bool,
) -> CxResult<CapturedOutput> {
    let label = shell_words::join(cmd);
    let (raw, status) = run_capture(cmd, cfg.capture_stderr).map_err(|e| match e {
        ProcessError::Spawn { source, .. } => CxError::Capture {
            command: label.clone(),
            source,
        },
        other => CxError::invalid(format!("capture of '{label}' failed: {other}")),
    })?;

    let reduced = if should_use_reducer(cmd, cfg, reducer_usable) {
        run_reducer(cmd, cfg)
    } else {
        None
    };
    let (processed, provider) = match reduced {
        Some(out) => (out, CaptureProvider::Reducer),
        None if cfg.native_reduce => (native_reduce_output(cmd, &raw), CaptureProvider::Native),
        None => (raw.clone(), CaptureProvider::Raw),
    };

    let (raw_len_chars, raw_len_lines) = text_len(&raw);
    let (processed_len_chars, processed_len_lines) = text_len(&processed);
    Ok(CapturedOutput {
        raw,
        processed,
        raw_len_chars,
        raw_len_lines,
        processed_len_chars,
        processed_len_lines,
        reducer_used: provider == CaptureProvider::Reducer,
        provider,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::{CaptureProvider, capture_command, text_len};
    use crate::capture::{CaptureProviderMode, ReducerConfig};
    use crate::error::CxError;

    fn reducer_cfg() -> ReducerConfig {
        ReducerConfig {
            enabled: true,
            program: vec!["cxharness-missing-reducer".to_string()],
            provider: CaptureProviderMode::Auto,
            min_version: "0.22.1".to_string(),
            max_version: None,
            probe_timeout_secs: 1,
            native_reduce: false,
            capture_stderr: false,
        }
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn text_len_counts_chars_and_lines() {
        assert_eq!(text_len(""), (0, 0));
        assert_eq!(text_len("é\nb\n"), (4, 2));
    }

    #[test]
    fn unstartable_command_is_capture_failure() {
        let err = capture_command(&cmd(&["cxharness-no-such-program"]), &reducer_cfg(), false)
            .expect_err("spawn should fail");
        assert!(matches!(err, CxError::Capture { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn stdout_only_by_default_and_status_is_kept() {
        let out = capture_command(
            &cmd(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
            &reducer_cfg(),
            false,
        )
        .expect("capture");
        assert_eq!(out.raw, "out\n");
        assert_eq!(out.processed, out.raw);
        assert_eq!(out.status, 3);
        assert_eq!(out.provider, CaptureProvider::Raw);
        assert!(!out.reducer_used);
    }

    #[cfg(unix)]
    #[test]
    fn stderr_is_merged_when_enabled() {
        let mut cfg = reducer_cfg();
        cfg.capture_stderr = true;
        let out = capture_command(&cmd(&["sh", "-c", "echo out; echo err >&2"]), &cfg, false)
            .expect("capture");
        assert_eq!(out.raw, "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn failing_reducer_falls_back_to_raw() {
        // `ls` is allow-listed and the reducer is reported usable, but the
        // reducer binary does not exist.
        let out = capture_command(&cmd(&["ls", "/"]), &reducer_cfg(), true).expect("capture");
        assert!(!out.reducer_used);
        assert_eq!(out.processed, out.raw);
        assert_eq!(out.raw_len_chars, out.processed_len_chars);
    }

    #[cfg(unix)]
    #[test]
    fn reducer_output_replaces_raw_when_it_succeeds() {
        let mut cfg = reducer_cfg();
        cfg.program = cmd(&["sh", "-c", "echo reduced", "reducer"]);
        let out = capture_command(&cmd(&["ls", "/"]), &cfg, true).expect("capture");
        assert!(out.reducer_used);
        assert_eq!(out.provider, CaptureProvider::Reducer);
        assert_eq!(out.processed, "reduced\n");
        assert_ne!(out.raw, out.processed);
    }

    #[cfg(unix)]
    #[test]
    fn native_reduce_applies_when_reducer_is_skipped() {
        let mut cfg = reducer_cfg();
        cfg.native_reduce = true;
        let out = capture_command(&cmd(&["sh", "-c", "printf 'a\\n\\n\\n\\nb\\n'"]), &cfg, false)
            .expect("capture");
        assert_eq!(out.provider, CaptureProvider::Native);
        assert_eq!(out.processed, "a\n\nb\n");
        assert_eq!(out.raw_len_lines, 5);
        assert_eq!(out.processed_len_lines, 3);
    }
}
