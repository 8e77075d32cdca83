use serde_json::Value;
use std::process::Command;

use crate::process::{ProcessError, run_command_with_stdin_output};
use crate::types::UsageStats;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmRunError {
    pub message: String,
}

impl LlmRunError {
    fn from_process(err: ProcessError) -> Self {
        Self {
            message: err.to_string(),
        }
    }

    pub(crate) fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LlmRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Token counters from the last `turn.completed` event, if any.
pub fn usage_from_jsonl(jsonl: &str) -> UsageStats {
    let mut out = UsageStats::default();
    for line in jsonl.lines() {
        let Ok(v) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if v.get("type").and_then(Value::as_str) != Some("turn.completed") {
            continue;
        }
        let usage = v.get("usage").cloned().unwrap_or(Value::Null);
        out.input_tokens = usage.get("input_tokens").and_then(Value::as_u64);
        out.cached_input_tokens = usage.get("cached_input_tokens").and_then(Value::as_u64);
        out.output_tokens = usage.get("output_tokens").and_then(Value::as_u64);
    }
    out
}

/// Input minus cached, only when both counters were reported.
pub fn effective_input_tokens(input: Option<u64>, cached: Option<u64>) -> Option<u64> {
    match (input, cached) {
        (Some(i), Some(c)) => Some(i.saturating_sub(c)),
        _ => None,
    }
}

/// Text of the last completed `agent_message` item in the event stream.
pub fn extract_agent_text(jsonl: &str) -> Option<String> {
    let mut last: Option<String> = None;
    for line in jsonl.lines() {
        let Ok(v) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if v.get("type").and_then(Value::as_str) != Some("item.completed") {
            continue;
        }
        let Some(item) = v.get("item") else {
            continue;
        };
        if item.get("type").and_then(Value::as_str) != Some("agent_message") {
            continue;
        }
        if let Some(text) = item.get("text").and_then(Value::as_str) {
            last = Some(text.to_string());
        }
    }
    last
}

pub fn run_codex_jsonl(prompt: &str, model: Option<&str>) -> Result<String, LlmRunError> {
    let mut cmd = Command::new("codex");
    cmd.args(["exec", "--json"]);
    if let Some(m) = model {
        cmd.args(["--model", m]);
    }
    cmd.arg("-");
    let out = run_command_with_stdin_output(cmd, prompt, "codex exec --json -")
        .map_err(LlmRunError::from_process)?;
    if !out.status.success() {
        return Err(LlmRunError::message(format!(
            "codex exited with status {}",
            out.status
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

pub fn run_ollama_plain(prompt: &str, model: &str) -> Result<String, LlmRunError> {
    let mut cmd = Command::new("ollama");
    cmd.args(["run", model]);
    let out = run_command_with_stdin_output(cmd, prompt, "ollama run")
        .map_err(LlmRunError::from_process)?;
    if !out.status.success() {
        return Err(LlmRunError::message(format!(
            "ollama exited with status {}",
            out.status
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::{effective_input_tokens, extract_agent_text, usage_from_jsonl};

    const STREAM: &str = concat!(
        "{\"type\":\"thread.started\"}\n",
        "{\"type\":\"item.completed\",\"item\":{\"type\":\"reasoning\",\"text\":\"hmm\"}}\n",
        "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"first\"}}\n",
        "not json\n",
        "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"final\"}}\n",
        "{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":1200,\"cached_input_tokens\":200,\"output_tokens\":40}}\n",
    );

    #[test]
    fn last_agent_message_wins() {
        assert_eq!(extract_agent_text(STREAM).as_deref(), Some("final"));
    }

    #[test]
    fn item_without_payload_is_skipped() {
        let s = "{\"type\":\"item.completed\"}\n{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"ok\"}}\n";
        assert_eq!(extract_agent_text(s).as_deref(), Some("ok"));
    }

    #[test]
    fn usage_is_read_from_turn_completed() {
        let usage = usage_from_jsonl(STREAM);
        assert_eq!(usage.input_tokens, Some(1200));
        assert_eq!(usage.cached_input_tokens, Some(200));
        assert_eq!(usage.output_tokens, Some(40));
    }

    #[test]
    fn missing_usage_leaves_counters_null() {
        let usage = usage_from_jsonl("{\"type\":\"turn.completed\"}\n");
        assert_eq!(usage.input_tokens, None);
        assert_eq!(usage.output_tokens, None);
    }

    #[test]
    fn effective_tokens_need_both_counters() {
        assert_eq!(effective_input_tokens(Some(1200), Some(200)), Some(1000));
        assert_eq!(effective_input_tokens(Some(1200), None), None);
        assert_eq!(effective_input_tokens(None, Some(200)), None);
        assert_eq!(effective_input_tokens(None, None), None);
        assert_eq!(effective_input_tokens(Some(10), Some(10)), Some(0));
    }
}
