use serde_json::Value;
use std::fmt;

use crate::alert::{AlertInput, emit_alert};
use crate::capture::{
    BudgetPolicy, CaptureProviderMode, CapturedOutput, ClippedOutput, ReducerStatus,
    capture_command, clip_text, probe_reducer,
};
use crate::config::{APP_NAME, AppConfig, ExecutionMode, Strictness};
use crate::error::{CxError, CxResult};
use crate::execmeta::make_time_ordered_id;
use crate::paths::LogLayout;
use crate::prompting::PromptEnvelope;
use crate::provider_adapter::{ProviderAdapter, invoke_backend};
use crate::quarantine::{NewQuarantine, QuarantineStore};
use crate::runlog::{
    PromptTexts, RunLogInput, append_run_log, append_schema_failure, build_log_entry,
};
use crate::schema::{SchemaContract, ValidationOutcome};
use crate::types::{InvocationResult, Outcome};

pub const PLAIN_TOOL: &str = "run";

/// Budget and mode in force for the next call. Only replay overrides it,
/// and only for the duration of one replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambient {
    pub budget: BudgetPolicy,
    pub mode: ExecutionMode,
    pub strictness: Strictness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainOutcome {
    pub text: String,
    /// Exit status of the wrapped command.
    pub status: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Capture,
    Backend,
    Validation,
    NotFound,
}

/// Caller-visible failure of a structured call or replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub quarantine_id: Option<String>,
    pub raw_response: Option<String>,
}

impl StructuredFailure {
    pub(crate) fn without_response(kind: FailureKind, reason: String) -> Self {
        Self {
            kind,
            reason,
            quarantine_id: None,
            raw_response: None,
        }
    }
}

impl fmt::Display for StructuredFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quarantine_id {
            Some(id) => write!(f, "{}; quarantine_id={id}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Capture context of a structured call, when it wrapped a command.
pub(crate) struct CaptureContext {
    pub command: String,
    pub captured: CapturedOutput,
}

/// One structured attempt, budgeted and ready to assemble.
pub(crate) struct StructuredRun<'c> {
    pub tool: &'c str,
    pub contract: &'c SchemaContract,
    pub raw_body: String,
    pub body: String,
    pub clip: ClippedOutput,
    pub capture: Option<CaptureContext>,
}

/// Owns the per-process pipeline state. Configuration is borrowed from the
/// snapshot taken at startup.
pub struct Harness<'a> {
    pub(crate) cfg: &'a AppConfig,
    pub(crate) ambient: Ambient,
    pub(crate) adapter: Box<dyn ProviderAdapter>,
    pub(crate) layout: LogLayout,
    pub(crate) quarantine: QuarantineStore,
    reducer_status: Option<ReducerStatus>,
}

impl<'a> Harness<'a> {
    pub fn new(cfg: &'a AppConfig, adapter: Box<dyn ProviderAdapter>, layout: LogLayout) -> Self {
        Self {
            ambient: Ambient {
                budget: cfg.budget.clone(),
                mode: cfg.mode,
                strictness: cfg.strictness,
            },
            cfg,
            adapter,
            quarantine: QuarantineStore::new(layout.quarantine_dir()),
            layout,
            reducer_status: None,
        }
    }

    pub fn ambient(&self) -> &Ambient {
        &self.ambient
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    pub fn quarantine(&self) -> &QuarantineStore {
        &self.quarantine
    }

    /// Probed once per harness; skipped entirely when the reducer cannot be
    /// chosen anyway.
    pub fn reducer_status(&mut self) -> &ReducerStatus {
        let cfg = self.cfg;
        let reducer = &cfg.reducer;
        self.reducer_status.get_or_insert_with(|| {
            if !reducer.enabled || reducer.provider == CaptureProviderMode::Raw {
                ReducerStatus {
                    version_raw: None,
                    usable: false,
                    reason: Some("reducer disabled".to_string()),
                }
            } else {
                probe_reducer(reducer)
            }
        })
    }

    fn capture(&mut self, command: &[String]) -> CxResult<CapturedOutput> {
        let usable = self.reducer_status().usable;
        capture_command(command, &self.cfg.reducer, usable)
    }

    fn log_row(&self, input: RunLogInput<'_>) {
        if !self.cfg.logging_enabled {
            return;
        }
        let row = build_log_entry(input);
        if let Err(e) = append_run_log(&self.layout, &row) {
            crate::cx_eprintln!("{APP_NAME}: warning: failed to write run log: {e}");
        }
    }

    fn alert(&self, tool: &str, inv: Option<&InvocationResult>) {
        let log_path = self.layout.run_log();
        emit_alert(
            &AlertInput {
                tool,
                duration_ms: inv.map(|r| r.duration_ms),
                effective_input_tokens: inv.and_then(|r| r.effective_input_tokens),
                output_tokens: inv.and_then(|r| r.output_tokens),
                log_path: &log_path,
            },
            &self.cfg.alerts,
        );
    }

    fn base_row<'r>(
        &'r self,
        execution_id: &'r str,
        tool: &'r str,
        command: Option<&'r str>,
        outcome: Outcome,
        schema_enforced: bool,
    ) -> RunLogInput<'r> {
        RunLogInput {
            execution_id,
            tool,
            command,
            layout: &self.layout,
            backend: self.adapter.backend_id(),
            model: self.adapter.model(),
            mode: self.ambient.mode,
            strictness: self.ambient.strictness,
            outcome,
            invocation: None,
            prompt: None,
            capture: None,
            clip: None,
            budget: &self.ambient.budget,
            schema_enforced,
            schema_reason: None,
            quarantine_id: None,
            error: None,
        }
    }

    fn log_capture_failure(&self, tool: &str, label: &str, err: &CxError, schema_enforced: bool) {
        let execution_id = make_time_ordered_id(tool);
        self.log_row(RunLogInput {
            error: Some(err.to_string()),
            ..self.base_row(
                &execution_id,
                tool,
                Some(label),
                Outcome::CaptureFailed,
                schema_enforced,
            )
        });
    }

    /// Plain call: capture, budget, assemble, invoke. Returns the generated
    /// text and the wrapped command's status.
    pub fn invoke(&mut self, command: &[String]) -> CxResult<PlainOutcome> {
        let label = shell_words::join(command);
        let captured = match self.capture(command) {
            Ok(c) => c,
            Err(e) => {
                self.log_capture_failure(PLAIN_TOOL, &label, &e, false);
                return Err(e);
            }
        };
        let clip = clip_text(&captured.processed, &self.ambient.budget);
        let body = format!("Command: {label}\nOutput:\n{}", clip.text);
        let full = PromptEnvelope::plain(self.ambient.mode, &body).render();
        let execution_id = make_time_ordered_id(PLAIN_TOOL);
        let prompt = PromptTexts {
            raw: &captured.processed,
            full: &full,
        };
        match invoke_backend(self.adapter.as_ref(), &full) {
            Ok(inv) => {
                self.log_row(RunLogInput {
                    invocation: Some(&inv),
                    prompt: Some(prompt),
                    capture: Some(&captured),
                    clip: Some(&clip),
                    ..self.base_row(
                        &execution_id,
                        PLAIN_TOOL,
                        Some(&label),
                        Outcome::PlainDone,
                        false,
                    )
                });
                self.alert(PLAIN_TOOL, Some(&inv));
                Ok(PlainOutcome {
                    text: inv.raw_response_text,
                    status: captured.status,
                })
            }
            Err(e) => {
                let err = CxError::backend(self.adapter.backend_id(), e.message);
                self.log_row(RunLogInput {
                    prompt: Some(prompt),
                    capture: Some(&captured),
                    clip: Some(&clip),
                    error: Some(err.to_string()),
                    ..self.base_row(
                        &execution_id,
                        PLAIN_TOOL,
                        Some(&label),
                        Outcome::InvocationFailed,
                        false,
                    )
                });
                Err(err)
            }
        }
    }

    /// Structured call over caller-supplied text. The text is budgeted with
    /// the ambient policy before assembly.
    pub fn invoke_structured(
        &mut self,
        tool: &str,
        contract: &SchemaContract,
        prompt_text: &str,
    ) -> Result<Value, StructuredFailure> {
        let clip = clip_text(prompt_text, &self.ambient.budget);
        self.run_structured(StructuredRun {
            tool,
            contract,
            raw_body: prompt_text.to_string(),
            body: clip.text.clone(),
            clip,
            capture: None,
        })
    }

    /// Structured call over a wrapped command's output. Only the captured
    /// output is budgeted; `instruction` is always sent whole.
    pub fn invoke_structured_command(
        &mut self,
        tool: &str,
        contract: &SchemaContract,
        instruction: &str,
        command: &[String],
    ) -> Result<Value, StructuredFailure> {
        let label = shell_words::join(command);
        let captured = match self.capture(command) {
            Ok(c) => c,
            Err(e) => {
                self.log_capture_failure(tool, &label, &e, true);
                return Err(StructuredFailure::without_response(
                    FailureKind::Capture,
                    e.to_string(),
                ));
            }
        };
        let clip = clip_text(&captured.processed, &self.ambient.budget);
        let body = format!("{instruction}\n\n{}", clip.text);
        let raw_body = format!("{instruction}\n\n{}", captured.processed);
        self.run_structured(StructuredRun {
            tool,
            contract,
            raw_body,
            body,
            clip,
            capture: Some(CaptureContext {
                command: label,
                captured,
            }),
        })
    }

    /// Assemble, invoke, validate; quarantine on failure. Writes exactly one
    /// run-log row whatever the branch.
    pub(crate) fn run_structured(
        &mut self,
        run: StructuredRun<'_>,
    ) -> Result<Value, StructuredFailure> {
        let envelope = PromptEnvelope::structured(
            self.ambient.mode,
            self.ambient.strictness,
            &run.contract.description,
            &run.body,
        );
        let full = envelope.render();
        let execution_id = make_time_ordered_id(run.tool);
        let command = run.capture.as_ref().map(|c| c.command.as_str());
        let captured = run.capture.as_ref().map(|c| &c.captured);
        let prompt = PromptTexts {
            raw: &run.raw_body,
            full: &full,
        };

        let inv = match invoke_backend(self.adapter.as_ref(), &full) {
            Ok(v) => v,
            Err(e) => {
                let err = CxError::backend(self.adapter.backend_id(), e.message);
                self.log_row(RunLogInput {
                    prompt: Some(prompt),
                    capture: captured,
                    clip: Some(&run.clip),
                    error: Some(err.to_string()),
                    ..self.base_row(
                        &execution_id,
                        run.tool,
                        command,
                        Outcome::InvocationFailed,
                        true,
                    )
                });
                return Err(StructuredFailure::without_response(
                    FailureKind::Backend,
                    err.to_string(),
                ));
            }
        };

        let reason = match run.contract.validate(&inv.raw_response_text) {
            ValidationOutcome::Valid(value) => {
                self.log_row(RunLogInput {
                    invocation: Some(&inv),
                    prompt: Some(prompt),
                    capture: captured,
                    clip: Some(&run.clip),
                    ..self.base_row(&execution_id, run.tool, command, Outcome::Valid, true)
                });
                self.alert(run.tool, Some(&inv));
                return Ok(value);
            }
            ValidationOutcome::Invalid(reason) => reason.to_string(),
        };

        let required_keys = run.contract.required_keys();
        let quarantine_id = match self.quarantine.store(NewQuarantine {
            tool: run.tool,
            reason: &reason,
            schema_description: &run.contract.description,
            required_keys: &required_keys,
            mode: self.ambient.mode,
            strictness: self.ambient.strictness,
            prompt_text: &run.body,
            full_prompt: &full,
            raw_response_text: &inv.raw_response_text,
        }) {
            Ok(rec) => Some(rec.id),
            Err(e) => {
                crate::cx_eprintln!("{APP_NAME}: warning: quarantine write failed: {e}");
                None
            }
        };
        if let Err(e) = append_schema_failure(
            &self.layout,
            run.tool,
            &reason,
            quarantine_id.as_deref(),
            &inv.raw_response_text,
        ) {
            crate::cx_eprintln!("{APP_NAME}: warning: failed to write schema failure log: {e}");
        }
        self.log_row(RunLogInput {
            invocation: Some(&inv),
            prompt: Some(prompt),
            capture: captured,
            clip: Some(&run.clip),
            schema_reason: Some(reason.clone()),
            quarantine_id: quarantine_id.clone(),
            ..self.base_row(&execution_id, run.tool, command, Outcome::Invalid, true)
        });
        crate::cx_eprintln!(
            "{APP_NAME} {}: schema validation failed: {reason}; quarantine_id={}",
            run.tool,
            quarantine_id.as_deref().unwrap_or("<none>")
        );
        crate::cx_eprintln!("{APP_NAME} {}: raw response follows:", run.tool);
        crate::cx_eprintln!("{}", inv.raw_response_text);
        self.alert(run.tool, Some(&inv));
        Err(StructuredFailure {
            kind: FailureKind::Validation,
            reason,
            quarantine_id,
            raw_response: Some(inv.raw_response_text),
        })
    }
}
