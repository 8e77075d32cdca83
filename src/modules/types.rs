use serde::{Deserialize, Serialize};

use crate::config::{ExecutionMode, Strictness};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsageStats {
    pub input_tokens: Option<u64>,
    pub cached_input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// One completed backend round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub duration_ms: u64,
    pub input_tokens: Option<u64>,
    pub cached_input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub effective_input_tokens: Option<u64>,
    pub raw_response_text: String,
}

/// Terminal state of one invocation, as recorded in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    PlainDone,
    Valid,
    Invalid,
    InvocationFailed,
    CaptureFailed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainDone => "plain_done",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::InvocationFailed => "invocation_failed",
            Self::CaptureFailed => "capture_failed",
        }
    }
}

/// Run-log row. Every numeric field is nullable; readers must skip nulls
/// rather than treat them as zero.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LogEntry {
    pub execution_id: String,
    pub timestamp: String,
    pub tool: String,
    pub command: Option<String>,
    pub cwd: String,
    pub scope: String,
    pub repo_root: Option<String>,
    pub backend: String,
    pub model: Option<String>,
    pub execution_mode: String,
    pub strictness: String,
    pub outcome: Outcome,
    pub duration_ms: Option<u64>,
    pub input_tokens: Option<u64>,
    pub cached_input_tokens: Option<u64>,
    pub effective_input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub prompt_len_raw: Option<u64>,
    pub prompt_sha256: Option<String>,
    pub prompt_len_processed: Option<u64>,
    pub full_prompt_sha256: Option<String>,
    pub prompt_preview: Option<String>,
    pub system_output_len_raw: Option<u64>,
    pub system_output_len_processed: Option<u64>,
    pub system_output_len_clipped: Option<u64>,
    pub system_output_lines_raw: Option<u64>,
    pub system_output_lines_processed: Option<u64>,
    pub system_output_lines_clipped: Option<u64>,
    pub clipped: Option<bool>,
    pub budget_chars: Option<u64>,
    pub budget_lines: Option<u64>,
    pub clip_mode: Option<String>,
    pub clip_footer: Option<bool>,
    pub reducer_used: Option<bool>,
    pub capture_provider: Option<String>,
    pub system_status: Option<i32>,
    pub schema_enforced: bool,
    pub schema_valid: Option<bool>,
    pub schema_reason: Option<String>,
    pub quarantine_id: Option<String>,
    pub error: Option<String>,
}

/// A failed structured response, stored verbatim under its id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QuarantineRecord {
    pub id: String,
    pub created_at: String,
    pub tool: String,
    pub reason: String,
    pub schema_description: String,
    #[serde(default)]
    pub required_keys: Vec<String>,
    pub mode: ExecutionMode,
    pub strictness: Strictness,
    /// Task body before the envelope was applied; replay re-budgets this.
    pub prompt_text: String,
    /// Exact text sent to the backend.
    pub full_prompt: String,
    pub raw_response_text: String,
    pub prompt_sha256: String,
    pub raw_sha256: String,
}

/// Compact companion row for the schema-failure log. Carries the response
/// hash only, never the body.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SchemaFailureRow {
    pub timestamp: String,
    pub tool: String,
    pub reason: String,
    pub quarantine_id: Option<String>,
    pub raw_sha256: String,
}

#[cfg(test)]
mod tests {
    use super::{LogEntry, Outcome};

    #[test]
    fn outcome_serializes_snake_case() {
        let v = serde_json::to_value(Outcome::InvocationFailed).expect("serialize");
        assert_eq!(v, "invocation_failed");
        assert_eq!(Outcome::CaptureFailed.as_str(), "capture_failed");
    }

    #[test]
    fn log_entry_nulls_are_written_explicitly() {
        let row = LogEntry {
            execution_id: "x".to_string(),
            ..LogEntry::default()
        };
        let v = serde_json::to_value(&row).expect("serialize");
        assert!(v["duration_ms"].is_null());
        assert!(v["effective_input_tokens"].is_null());
        assert_eq!(v["schema_enforced"], false);
    }

    #[test]
    fn sparse_rows_deserialize_with_defaults() {
        let row: LogEntry =
            serde_json::from_str(r#"{"execution_id":"a","tool":"next","outcome":"valid"}"#)
                .expect("parse sparse row");
        assert_eq!(row.outcome, Outcome::Valid);
        assert_eq!(row.duration_ms, None);
        assert!(row.backend.is_empty());
    }
}
