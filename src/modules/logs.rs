use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{CxError, CxResult};
use crate::paths::ensure_parent_dir;
use crate::types::{LogEntry, Outcome};

#[path = "logs_cmd.rs"]
mod logs_cmd;
#[path = "logs_read.rs"]
mod logs_read;

pub use logs_cmd::cmd_logs;
#[allow(unused_imports)]
pub use logs_read::{LogValidateOutcome, load_entries, validate_runs_jsonl_file};

/// Row contract checked before every append and by `logs validate`.
pub fn validate_log_entry(row: &LogEntry) -> Result<(), String> {
    for (name, value) in [
        ("execution_id", &row.execution_id),
        ("timestamp", &row.timestamp),
        ("tool", &row.tool),
        ("backend", &row.backend),
        ("execution_mode", &row.execution_mode),
    ] {
        if value.trim().is_empty() {
            return Err(format!("log entry missing {name}"));
        }
    }
    if row.schema_enforced
        && row.outcome == Outcome::Invalid
        && row
            .schema_reason
            .as_ref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        return Err("schema failure missing schema_reason".to_string());
    }
    if row.effective_input_tokens.is_some()
        && (row.input_tokens.is_none() || row.cached_input_tokens.is_none())
    {
        return Err("effective_input_tokens set without input and cached counts".to_string());
    }
    Ok(())
}

/// Appends one JSON line with a single write on an append-mode handle, so
/// concurrent writers never interleave within a line. No lock is taken.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> CxResult<()> {
    ensure_parent_dir(path)?;
    let mut line =
        serde_json::to_string(value).map_err(|e| CxError::json("log json serialize", e))?;
    line.push('\n');
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CxError::io(format!("failed opening {}", path.display()), e))?;
    f.write_all(line.as_bytes())
        .and_then(|_| f.flush())
        .map_err(|e| CxError::io(format!("failed writing {}", path.display()), e))
}
