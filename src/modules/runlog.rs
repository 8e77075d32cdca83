use crate::capture::{BudgetPolicy, CapturedOutput, ClippedOutput};
use crate::config::{ExecutionMode, Strictness};
use crate::error::{CxError, CxResult};
use crate::execmeta::{PROMPT_PREVIEW_CHARS, prompt_preview, utc_now_iso};
use crate::logs::{append_jsonl, validate_log_entry};
use crate::paths::LogLayout;
use crate::types::{InvocationResult, LogEntry, Outcome, SchemaFailureRow};
use crate::util::sha256_hex;

/// Prompt text at the two points the log measures: before budgeting and
/// as finally sent to the backend.
#[derive(Debug, Clone, Copy)]
pub struct PromptTexts<'a> {
    pub raw: &'a str,
    pub full: &'a str,
}

pub struct RunLogInput<'a> {
    pub execution_id: &'a str,
    pub tool: &'a str,
    pub command: Option<&'a str>,
    pub layout: &'a LogLayout,
    pub backend: &'a str,
    pub model: Option<String>,
    pub mode: ExecutionMode,
    pub strictness: Strictness,
    pub outcome: Outcome,
    pub invocation: Option<&'a InvocationResult>,
    pub prompt: Option<PromptTexts<'a>>,
    pub capture: Option<&'a CapturedOutput>,
    pub clip: Option<&'a ClippedOutput>,
    pub budget: &'a BudgetPolicy,
    pub schema_enforced: bool,
    pub schema_reason: Option<String>,
    pub quarantine_id: Option<String>,
    pub error: Option<String>,
}

fn as_u64(n: usize) -> Option<u64> {
    Some(n as u64)
}

pub fn build_log_entry(input: RunLogInput<'_>) -> LogEntry {
    let inv = input.invocation;
    let cap = input.capture;
    let clip = input.clip;
    let schema_valid = match input.outcome {
        Outcome::Valid => Some(true),
        Outcome::Invalid => Some(false),
        _ => None,
    };
    LogEntry {
        execution_id: input.execution_id.to_string(),
        timestamp: utc_now_iso(),
        tool: input.tool.to_string(),
        command: input.command.map(ToOwned::to_owned),
        cwd: input.layout.cwd.display().to_string(),
        scope: input.layout.scope.as_str().to_string(),
        repo_root: input
            .layout
            .repo_root
            .as_ref()
            .map(|p| p.display().to_string()),
        backend: input.backend.to_string(),
        model: input.model,
        execution_mode: input.mode.as_str().to_string(),
        strictness: input.strictness.as_str().to_string(),
        outcome: input.outcome,
        duration_ms: inv.map(|r| r.duration_ms),
        input_tokens: inv.and_then(|r| r.input_tokens),
        cached_input_tokens: inv.and_then(|r| r.cached_input_tokens),
        effective_input_tokens: inv.and_then(|r| r.effective_input_tokens),
        output_tokens: inv.and_then(|r| r.output_tokens),
        prompt_len_raw: input.prompt.and_then(|p| as_u64(p.raw.chars().count())),
        prompt_sha256: input.prompt.map(|p| sha256_hex(p.raw)),
        prompt_len_processed: input.prompt.and_then(|p| as_u64(p.full.chars().count())),
        full_prompt_sha256: input.prompt.map(|p| sha256_hex(p.full)),
        prompt_preview: input
            .prompt
            .map(|p| prompt_preview(p.raw, PROMPT_PREVIEW_CHARS)),
        system_output_len_raw: cap.and_then(|c| as_u64(c.raw_len_chars)),
        system_output_len_processed: cap.and_then(|c| as_u64(c.processed_len_chars)),
        system_output_len_clipped: clip.and_then(|c| as_u64(c.kept_chars)),
        system_output_lines_raw: cap.and_then(|c| as_u64(c.raw_len_lines)),
        system_output_lines_processed: cap.and_then(|c| as_u64(c.processed_len_lines)),
        system_output_lines_clipped: clip.and_then(|c| as_u64(c.kept_lines)),
        clipped: clip.map(|c| c.was_clipped),
        budget_chars: as_u64(input.budget.max_chars),
        budget_lines: as_u64(input.budget.max_lines),
        clip_mode: clip.map(|c| c.mode_used.as_str().to_string()),
        clip_footer: Some(input.budget.append_footer),
        reducer_used: cap.map(|c| c.reducer_used),
        capture_provider: cap.map(|c| c.provider.as_str().to_string()),
        system_status: cap.map(|c| c.status),
        schema_enforced: input.schema_enforced,
        schema_valid,
        schema_reason: input.schema_reason,
        quarantine_id: input.quarantine_id,
        error: input.error,
    }
}

pub fn append_run_log(layout: &LogLayout, row: &LogEntry) -> CxResult<()> {
    validate_log_entry(row).map_err(|e| CxError::invalid(format!("run log row rejected: {e}")))?;
    append_jsonl(&layout.run_log(), row)
}

pub fn append_schema_failure(
    layout: &LogLayout,
    tool: &str,
    reason: &str,
    quarantine_id: Option<&str>,
    raw: &str,
) -> CxResult<()> {
    let row = SchemaFailureRow {
        timestamp: utc_now_iso(),
        tool: tool.to_string(),
        reason: reason.to_string(),
        quarantine_id: quarantine_id.map(ToOwned::to_owned),
        raw_sha256: sha256_hex(raw),
    };
    append_jsonl(&layout.schema_fail_log(), &row)
}

#[cfg(test)]
mod tests {
    use super::{PromptTexts, RunLogInput, append_schema_failure, build_log_entry};
    use crate::capture::{BudgetPolicy, ClipMode};
    use crate::config::{ExecutionMode, Strictness};
    use crate::paths::LogLayout;
    use crate::types::{InvocationResult, Outcome, SchemaFailureRow};
    use crate::util::sha256_hex;
    use tempfile::tempdir;

    fn budget() -> BudgetPolicy {
        BudgetPolicy {
            max_chars: 100,
            max_lines: 10,
            mode: ClipMode::Smart,
            append_footer: true,
        }
    }

    #[test]
    fn backend_failure_row_has_null_metrics() {
        let dir = tempdir().expect("tempdir");
        let layout = LogLayout::resolve(dir.path(), Some(dir.path())).expect("layout");
        let b = budget();
        let row = build_log_entry(RunLogInput {
            execution_id: "id",
            tool: "next",
            command: Some("git status"),
            layout: &layout,
            backend: "codex",
            model: None,
            mode: ExecutionMode::Lean,
            strictness: Strictness::Strict,
            outcome: Outcome::InvocationFailed,
            invocation: None,
            prompt: Some(PromptTexts {
                raw: "body",
                full: "full body",
            }),
            capture: None,
            clip: None,
            budget: &b,
            schema_enforced: true,
            schema_reason: None,
            quarantine_id: None,
            error: Some("codex spawn failed".to_string()),
        });
        assert_eq!(row.duration_ms, None);
        assert_eq!(row.input_tokens, None);
        assert_eq!(row.effective_input_tokens, None);
        assert_eq!(row.schema_valid, None);
        assert_eq!(row.prompt_sha256.as_deref(), Some(sha256_hex("body").as_str()));
        assert_eq!(row.prompt_len_processed, Some(9));
        assert_eq!(row.scope, "global");
    }

    #[test]
    fn token_counts_are_copied_without_coercion() {
        let dir = tempdir().expect("tempdir");
        let layout = LogLayout::resolve(dir.path(), Some(dir.path())).expect("layout");
        let b = budget();
        let inv = InvocationResult {
            duration_ms: 42,
            input_tokens: Some(100),
            cached_input_tokens: None,
            output_tokens: Some(5),
            effective_input_tokens: None,
            raw_response_text: "{}".to_string(),
        };
        let row = build_log_entry(RunLogInput {
            execution_id: "id",
            tool: "structured",
            command: None,
            layout: &layout,
            backend: "mock",
            model: None,
            mode: ExecutionMode::Deterministic,
            strictness: Strictness::Strict,
            outcome: Outcome::Valid,
            invocation: Some(&inv),
            prompt: None,
            capture: None,
            clip: None,
            budget: &b,
            schema_enforced: true,
            schema_reason: None,
            quarantine_id: None,
            error: None,
        });
        assert_eq!(row.duration_ms, Some(42));
        assert_eq!(row.input_tokens, Some(100));
        assert_eq!(row.cached_input_tokens, None);
        assert_eq!(row.effective_input_tokens, None);
        assert_eq!(row.schema_valid, Some(true));
        assert_eq!(row.execution_mode, "deterministic");
    }

    #[test]
    fn schema_failure_row_carries_hash_not_body() {
        let dir = tempdir().expect("tempdir");
        let layout = LogLayout::resolve(dir.path(), Some(dir.path())).expect("layout");
        append_schema_failure(&layout, "next", "not_json", Some("q1"), "secret body")
            .expect("append");
        let text = std::fs::read_to_string(layout.schema_fail_log()).expect("read");
        assert!(!text.contains("secret body"));
        let row: SchemaFailureRow = serde_json::from_str(text.trim()).expect("parse");
        assert_eq!(row.raw_sha256, sha256_hex("secret body"));
        assert_eq!(row.quarantine_id.as_deref(), Some("q1"));
    }
}
