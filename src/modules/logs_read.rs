use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CxError, CxResult};
use crate::types::LogEntry;

use super::validate_log_entry;

static RUNS_PARSE_WARNED: AtomicBool = AtomicBool::new(false);

pub(super) const REQUIRED_FIELDS: [&str; 24] = [
    "execution_id",
    "timestamp",
    "tool",
    "cwd",
    "scope",
    "repo_root",
    "backend",
    "execution_mode",
    "outcome",
    "duration_ms",
    "input_tokens",
    "cached_input_tokens",
    "effective_input_tokens",
    "output_tokens",
    "prompt_sha256",
    "system_output_len_raw",
    "system_output_len_processed",
    "system_output_len_clipped",
    "clipped",
    "reducer_used",
    "schema_enforced",
    "schema_valid",
    "schema_reason",
    "quarantine_id",
];

#[derive(Debug, Default, Clone)]
pub struct LogValidateOutcome {
    pub total: usize,
    pub corrupted_lines: BTreeSet<usize>,
    pub invalid_json_lines: usize,
    pub issues: Vec<String>,
}

fn preview(line: &str) -> String {
    line.chars().take(160).collect()
}

/// Scans the whole run log. Malformed lines, typically a torn last line from
/// a killed writer, are reported rather than treated as fatal.
pub fn validate_runs_jsonl_file(log_file: &Path) -> CxResult<LogValidateOutcome> {
    let file = File::open(log_file)
        .map_err(|e| CxError::io(format!("cannot open {}", log_file.display()), e))?;
    let reader = BufReader::new(file);
    let mut out = LogValidateOutcome::default();
    for (idx, line_res) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = match line_res {
            Ok(v) => v,
            Err(e) => {
                out.corrupted_lines.insert(line_no);
                out.issues.push(format!("line {line_no}: read error: {e}"));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        out.total += 1;
        let parsed: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                out.corrupted_lines.insert(line_no);
                out.invalid_json_lines += 1;
                out.issues.push(
                    CxError::JsonLineParse {
                        file: log_file.to_path_buf(),
                        line: line_no,
                        content_preview: preview(&line),
                        source: e,
                    }
                    .to_string(),
                );
                continue;
            }
        };
        validate_row(parsed, line_no, &mut out);
    }
    Ok(out)
}

fn validate_row(parsed: Value, line_no: usize, out: &mut LogValidateOutcome) {
    let Some(obj) = parsed.as_object() else {
        out.corrupted_lines.insert(line_no);
        out.issues.push(format!("line {line_no}: json is not an object"));
        return;
    };
    let mut missing = false;
    for k in REQUIRED_FIELDS {
        if !obj.contains_key(k) {
            missing = true;
            out.issues
                .push(format!("line {line_no}: missing required field '{k}'"));
        }
    }
    if missing {
        out.corrupted_lines.insert(line_no);
        return;
    }
    let contract = serde_json::from_value::<LogEntry>(parsed)
        .map_err(|e| e.to_string())
        .and_then(|row| validate_log_entry(&row));
    if let Err(e) = contract {
        out.corrupted_lines.insert(line_no);
        out.issues.push(format!("line {line_no}: {e}"));
    }
}

/// Last `limit` parseable rows (all when `limit` is 0). Unparseable lines are
/// skipped with a one-time warning.
pub fn load_entries(log_file: &Path, limit: usize) -> CxResult<Vec<LogEntry>> {
    let file = File::open(log_file)
        .map_err(|e| CxError::io(format!("cannot open {}", log_file.display()), e))?;
    let reader = BufReader::new(file);
    let mut out: Vec<LogEntry> = Vec::new();
    let mut invalid = 0usize;
    let mut sample: Option<String> = None;
    for (idx, line_res) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = match line_res {
            Ok(v) => v,
            Err(e) => {
                invalid += 1;
                sample.get_or_insert_with(|| format!("read error at line {line_no}: {e}"));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(&line) {
            Ok(v) => out.push(v),
            Err(e) => {
                invalid += 1;
                if sample.is_none() {
                    sample = Some(
                        CxError::JsonLineParse {
                            file: log_file.to_path_buf(),
                            line: line_no,
                            content_preview: preview(&line),
                            source: e,
                        }
                        .to_string(),
                    );
                }
            }
        }
    }
    maybe_warn_invalid_lines(log_file, invalid, sample);
    if limit > 0 && out.len() > limit {
        out.drain(..out.len() - limit);
    }
    Ok(out)
}

fn maybe_warn_invalid_lines(log_file: &Path, invalid: usize, sample: Option<String>) {
    if invalid == 0 || RUNS_PARSE_WARNED.swap(true, Ordering::SeqCst) {
        return;
    }
    crate::cx_eprintln!(
        "{}: warning: skipped {} invalid JSON lines in {} (sample: {}). Run '{} logs validate' for details.",
        crate::config::APP_NAME,
        invalid,
        log_file.display(),
        sample.unwrap_or_else(|| "n/a".to_string()),
        crate::config::APP_NAME
    );
}
