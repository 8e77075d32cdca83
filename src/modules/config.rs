use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

use crate::alert::AlertThresholds;
use crate::capture::{BudgetPolicy, CaptureProviderMode, ClipMode, ReducerConfig};
use crate::provider_adapter::{BackendConfig, BackendKind, MockSettings};

/// Canonical application identity (used by help/version/diagnostic surfaces).
pub const APP_NAME: &str = "cxharness";
pub const APP_DESC: &str = "Deterministic execution harness for LLM-backed terminal workflows";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonical runtime defaults.
pub const DEFAULT_CONTEXT_BUDGET_CHARS: usize = 12_000;
pub const DEFAULT_CONTEXT_BUDGET_LINES: usize = 300;
pub const DEFAULT_REPLAY_MIN_CHARS: usize = 1_000;
pub const DEFAULT_REPLAY_MIN_LINES: usize = 40;
pub const DEFAULT_ALERT_MAX_MS: u64 = 8_000;
pub const DEFAULT_ALERT_MAX_EFF_IN: u64 = 5_000;
pub const DEFAULT_ALERT_MAX_OUT: u64 = 500;
pub const DEFAULT_REDUCER_BIN: &str = "rtk";
pub const DEFAULT_REDUCER_MIN_VERSION: &str = "0.22.1";
pub const DEFAULT_REDUCER_PROBE_SECS: u64 = 5;
pub const DEFAULT_LOG_TAIL: usize = 10;
pub const DEFAULT_QUARANTINE_LIST: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Lean,
    Deterministic,
    Verbose,
}

impl ExecutionMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Self::Deterministic,
            "verbose" => Self::Verbose,
            _ => Self::Lean,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lean => "lean",
            Self::Deterministic => "deterministic",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Relaxed,
    Strict,
}

impl Strictness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relaxed => "relaxed",
            Self::Strict => "strict",
        }
    }
}

/// Lower bounds applied when replay halves the ambient budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayFloor {
    pub min_chars: usize,
    pub min_lines: usize,
}

/// Process-level configuration snapshot.
///
/// Built once at startup and handed to the harness by reference; no
/// component reads the environment on its own after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: ExecutionMode,
    pub strictness: Strictness,
    pub budget: BudgetPolicy,
    pub replay_floor: ReplayFloor,
    pub alerts: AlertThresholds,
    pub reducer: ReducerConfig,
    pub backend: BackendConfig,
    pub logging_enabled: bool,
}

fn lookup_bool(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    lookup(name)
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(|v| v == 1)
        .unwrap_or(default)
}

fn lookup_usize(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    lookup(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn lookup_u64(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn lookup_nonempty(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_backend_kind(lookup: &dyn Fn(&str) -> Option<String>) -> BackendKind {
    if lookup_nonempty(lookup, "CX_PROVIDER_ADAPTER")
        .is_some_and(|v| v.eq_ignore_ascii_case("mock"))
    {
        return BackendKind::Mock;
    }
    match lookup_nonempty(lookup, "CX_LLM_BACKEND") {
        Some(v) if v.eq_ignore_ascii_case("ollama") => BackendKind::Ollama,
        _ => BackendKind::Codex,
    }
}

fn resolve_reducer_program(lookup: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
    let raw = lookup_nonempty(lookup, "CX_REDUCER_BIN")
        .unwrap_or_else(|| DEFAULT_REDUCER_BIN.to_string());
    match shell_words::split(&raw) {
        Ok(words) if !words.is_empty() => words,
        _ => vec![raw],
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let strictness = if lookup_bool(lookup, "CX_SCHEMA_RELAXED", false) {
            Strictness::Relaxed
        } else {
            Strictness::Strict
        };
        let provider = match lookup_nonempty(lookup, "CX_CAPTURE_PROVIDER").as_deref() {
            Some("reducer") | Some("rtk") => CaptureProviderMode::Reducer,
            Some("raw") | Some("native") => CaptureProviderMode::Raw,
            _ => CaptureProviderMode::Auto,
        };
        Self {
            mode: ExecutionMode::parse(&lookup("CX_MODE").unwrap_or_default()),
            strictness,
            budget: BudgetPolicy {
                max_chars: lookup_usize(
                    lookup,
                    "CX_CONTEXT_BUDGET_CHARS",
                    DEFAULT_CONTEXT_BUDGET_CHARS,
                ),
                max_lines: lookup_usize(
                    lookup,
                    "CX_CONTEXT_BUDGET_LINES",
                    DEFAULT_CONTEXT_BUDGET_LINES,
                ),
                mode: ClipMode::parse(&lookup("CX_CONTEXT_CLIP_MODE").unwrap_or_default()),
                append_footer: lookup_bool(lookup, "CX_CONTEXT_CLIP_FOOTER", true),
            },
            replay_floor: ReplayFloor {
                min_chars: lookup_usize(lookup, "CX_REPLAY_MIN_CHARS", DEFAULT_REPLAY_MIN_CHARS),
                min_lines: lookup_usize(lookup, "CX_REPLAY_MIN_LINES", DEFAULT_REPLAY_MIN_LINES),
            },
            alerts: AlertThresholds {
                enabled: lookup_bool(lookup, "CXALERT_ENABLED", true),
                max_duration_ms: lookup_u64(lookup, "CXALERT_MAX_MS", DEFAULT_ALERT_MAX_MS),
                max_effective_input_tokens: lookup_u64(
                    lookup,
                    "CXALERT_MAX_EFF_IN",
                    DEFAULT_ALERT_MAX_EFF_IN,
                ),
                max_output_tokens: lookup_u64(lookup, "CXALERT_MAX_OUT", DEFAULT_ALERT_MAX_OUT),
            },
            reducer: ReducerConfig {
                enabled: lookup_bool(lookup, "CX_REDUCER_ENABLED", true),
                program: resolve_reducer_program(lookup),
                provider,
                min_version: lookup_nonempty(lookup, "CX_REDUCER_MIN_VERSION")
                    .unwrap_or_else(|| DEFAULT_REDUCER_MIN_VERSION.to_string()),
                max_version: lookup_nonempty(lookup, "CX_REDUCER_MAX_VERSION"),
                probe_timeout_secs: lookup_u64(
                    lookup,
                    "CX_REDUCER_PROBE_SECS",
                    DEFAULT_REDUCER_PROBE_SECS,
                ),
                native_reduce: lookup_bool(lookup, "CX_NATIVE_REDUCE", false),
                capture_stderr: lookup_bool(lookup, "CX_CAPTURE_STDERR", false),
            },
            backend: BackendConfig {
                kind: resolve_backend_kind(lookup),
                codex_model: lookup_nonempty(lookup, "CX_MODEL"),
                ollama_model: lookup_nonempty(lookup, "CX_OLLAMA_MODEL"),
                mock: MockSettings {
                    response: lookup("CX_MOCK_RESPONSE")
                        .unwrap_or_else(|| "{\"commands\":[\"echo mock\"]}".to_string()),
                    jsonl_response: lookup_nonempty(lookup, "CX_MOCK_JSONL_RESPONSE"),
                    error: lookup_nonempty(lookup, "CX_MOCK_ERROR"),
                },
            },
            logging_enabled: lookup_bool(lookup, "CXLOG_ENABLED", true),
        }
    }

    /// Clamps values the pipeline cannot honour and returns one warning per
    /// adjustment. Zero budgets never reach the budgeter.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut clamp = |label: &str, value: &mut usize| {
            if *value == 0 {
                warnings.push(format!("{label}=0 is not allowed; using 1"));
                *value = 1;
            }
        };
        clamp("CX_CONTEXT_BUDGET_CHARS", &mut self.budget.max_chars);
        clamp("CX_CONTEXT_BUDGET_LINES", &mut self.budget.max_lines);
        clamp("CX_REPLAY_MIN_CHARS", &mut self.replay_floor.min_chars);
        clamp("CX_REPLAY_MIN_LINES", &mut self.replay_floor.min_lines);
        if self.reducer.probe_timeout_secs == 0 {
            warnings.push("CX_REDUCER_PROBE_SECS=0 is not allowed; using 1".to_string());
            self.reducer.probe_timeout_secs = 1;
        }
        warnings
    }

    /// Loads, validates and reports clamps on the diagnostic stream.
    pub fn load() -> Self {
        let mut cfg = Self::from_env();
        for warning in cfg.validate() {
            crate::cx_eprintln!("{APP_NAME}: config: {warning}");
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ExecutionMode, Strictness};
    use crate::capture::{CaptureProviderMode, ClipMode};
    use crate::provider_adapter::BackendKind;
    use std::collections::HashMap;

    fn cfg_from(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(&|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = cfg_from(&[]);
        assert_eq!(cfg.mode, ExecutionMode::Lean);
        assert_eq!(cfg.strictness, Strictness::Strict);
        assert_eq!(cfg.budget.max_chars, 12_000);
        assert_eq!(cfg.budget.max_lines, 300);
        assert_eq!(cfg.budget.mode, ClipMode::Smart);
        assert!(cfg.budget.append_footer);
        assert_eq!(cfg.replay_floor.min_chars, 1_000);
        assert_eq!(cfg.replay_floor.min_lines, 40);
        assert!(cfg.alerts.enabled);
        assert_eq!(cfg.alerts.max_duration_ms, 8_000);
        assert_eq!(cfg.reducer.program, vec!["rtk".to_string()]);
        assert_eq!(cfg.reducer.provider, CaptureProviderMode::Auto);
        assert_eq!(cfg.backend.kind, BackendKind::Codex);
        assert!(cfg.logging_enabled);
    }

    #[test]
    fn zero_budgets_are_clamped_with_warnings() {
        let mut cfg = cfg_from(&[
            ("CX_CONTEXT_BUDGET_CHARS", "0"),
            ("CX_CONTEXT_BUDGET_LINES", "0"),
        ]);
        let warnings = cfg.validate();
        assert_eq!(cfg.budget.max_chars, 1);
        assert_eq!(cfg.budget.max_lines, 1);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("CX_CONTEXT_BUDGET_CHARS"));
    }

    #[test]
    fn mode_strictness_and_backend_overrides_are_read() {
        let cfg = cfg_from(&[
            ("CX_MODE", "Deterministic"),
            ("CX_SCHEMA_RELAXED", "1"),
            ("CX_LLM_BACKEND", "OLLAMA"),
            ("CX_OLLAMA_MODEL", "llama3.1"),
            ("CX_REDUCER_BIN", "/opt/rtk/bin/rtk --quiet"),
        ]);
        assert_eq!(cfg.mode, ExecutionMode::Deterministic);
        assert_eq!(cfg.strictness, Strictness::Relaxed);
        assert_eq!(cfg.backend.kind, BackendKind::Ollama);
        assert_eq!(cfg.backend.ollama_model.as_deref(), Some("llama3.1"));
        assert_eq!(
            cfg.reducer.program,
            vec!["/opt/rtk/bin/rtk".to_string(), "--quiet".to_string()]
        );
    }

    #[test]
    fn mock_adapter_wins_over_backend_selection() {
        let cfg = cfg_from(&[("CX_PROVIDER_ADAPTER", "mock"), ("CX_LLM_BACKEND", "ollama")]);
        assert_eq!(cfg.backend.kind, BackendKind::Mock);
    }
}
