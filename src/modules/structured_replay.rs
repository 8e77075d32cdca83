use serde_json::Value;
use std::ops::{Deref, DerefMut};

use crate::capture::clip_text;
use crate::config::{ExecutionMode, Strictness};
use crate::error::CxError;
use crate::execution::{Ambient, FailureKind, Harness, StructuredFailure, StructuredRun};
use crate::schema::SchemaContract;

/// Holds the harness in replay settings and puts the previous ambient state
/// back when dropped, including during unwinding.
struct ReplayScope<'h, 'a> {
    harness: &'h mut Harness<'a>,
    saved: Option<Ambient>,
}

impl<'h, 'a> ReplayScope<'h, 'a> {
    fn enter(harness: &'h mut Harness<'a>) -> Self {
        let saved = harness.ambient.clone();
        harness.ambient = Ambient {
            budget: saved.budget.halved(&harness.cfg.replay_floor),
            mode: ExecutionMode::Deterministic,
            strictness: Strictness::Strict,
        };
        Self {
            harness,
            saved: Some(saved),
        }
    }
}

impl<'a> Deref for ReplayScope<'_, 'a> {
    type Target = Harness<'a>;

    fn deref(&self) -> &Self::Target {
        self.harness
    }
}

impl DerefMut for ReplayScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.harness
    }
}

impl Drop for ReplayScope<'_, '_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.harness.ambient = saved;
        }
    }
}

impl Harness<'_> {
    /// Re-runs a quarantined structured call once, in deterministic strict
    /// mode with half the ambient budget. The quarantined prompt is reused;
    /// the original command is never re-executed.
    pub fn replay(&mut self, quarantine_id: &str) -> Result<Value, StructuredFailure> {
        let rec = self.quarantine.read(quarantine_id).map_err(|e| {
            let kind = match e {
                CxError::NotFound { .. } => FailureKind::NotFound,
                _ => FailureKind::Validation,
            };
            StructuredFailure::without_response(kind, e.to_string())
        })?;
        if rec.schema_description.trim().is_empty() || rec.prompt_text.trim().is_empty() {
            return Err(StructuredFailure::without_response(
                FailureKind::Validation,
                format!("quarantine entry {quarantine_id} is missing schema/prompt payload"),
            ));
        }
        let contract = SchemaContract::new(rec.schema_description.clone(), &rec.required_keys);
        let tool = format!("{}_replay", rec.tool);

        let mut scope = ReplayScope::enter(self);
        let clip = clip_text(&rec.prompt_text, &scope.ambient.budget);
        scope.run_structured(StructuredRun {
            tool: &tool,
            contract: &contract,
            raw_body: rec.prompt_text.clone(),
            body: clip.text.clone(),
            clip,
            capture: None,
        })
    }
}
