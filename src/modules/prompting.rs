use crate::config::{ExecutionMode, Strictness};

fn mode_directive(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Lean => "Mode: lean. Answer concisely; omit background and restatement.",
        ExecutionMode::Deterministic => {
            "Mode: deterministic. Produce the same answer for the same input; no speculation, no alternatives."
        }
        ExecutionMode::Verbose => {
            "Mode: verbose. Explain reasoning and list assumptions where relevant."
        }
    }
}

/// Everything sent to the backend for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEnvelope {
    pub mode_directive: String,
    pub schema_description: Option<String>,
    pub strictness: Strictness,
    pub body: String,
}

impl PromptEnvelope {
    pub fn plain(mode: ExecutionMode, body: &str) -> Self {
        Self {
            mode_directive: mode_directive(mode).to_string(),
            schema_description: None,
            strictness: Strictness::Relaxed,
            body: body.to_string(),
        }
    }

    pub fn structured(
        mode: ExecutionMode,
        strictness: Strictness,
        schema_description: &str,
        body: &str,
    ) -> Self {
        let mut directive = mode_directive(mode).to_string();
        if mode == ExecutionMode::Deterministic && strictness == Strictness::Strict {
            directive.push_str(" No commentary of any kind.");
        }
        Self {
            mode_directive: directive,
            schema_description: Some(schema_description.to_string()),
            strictness,
            body: body.to_string(),
        }
    }

    pub fn render(&self) -> String {
        let Some(schema) = &self.schema_description else {
            return format!("{}\n\n{}", self.mode_directive, self.body);
        };
        let banner = match self.strictness {
            Strictness::Relaxed => {
                "Return JSON ONLY. No markdown. No prose. No code fences.\nOutput MUST be a single valid JSON object matching the schema."
            }
            Strictness::Strict => {
                "Return STRICT JSON ONLY. No markdown. No prose. No code fences.\nOutput MUST be a single valid JSON object matching the schema.\nSchema-strict mode: deterministic JSON only; reject ambiguity."
            }
        };
        format!(
            "You are a structured output generator.\n{}\n{banner}\nSchema:\n{schema}\n\nTask input:\n{}\n",
            self.mode_directive, self.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::PromptEnvelope;
    use crate::config::{ExecutionMode, Strictness};

    #[test]
    fn plain_prompt_is_directive_then_body() {
        let p = PromptEnvelope::plain(ExecutionMode::Lean, "git status output").render();
        assert!(p.starts_with("Mode: lean."));
        assert!(p.ends_with("\n\ngit status output"));
    }

    #[test]
    fn structured_prompt_carries_schema_and_json_only_banner() {
        let p = PromptEnvelope::structured(
            ExecutionMode::Lean,
            Strictness::Relaxed,
            "{\"commands\": [string]}",
            "body",
        )
        .render();
        assert!(p.contains("single valid JSON object"));
        assert!(p.contains("No prose"));
        assert!(p.contains("Schema:\n{\"commands\": [string]}"));
        assert!(!p.contains("STRICT"));
        assert!(p.ends_with("Task input:\nbody\n"));
    }

    #[test]
    fn deterministic_strict_forbids_commentary() {
        let p = PromptEnvelope::structured(
            ExecutionMode::Deterministic,
            Strictness::Strict,
            "{}",
            "body",
        )
        .render();
        assert!(p.contains("STRICT JSON ONLY"));
        assert!(p.contains("No commentary of any kind."));
        let relaxed =
            PromptEnvelope::structured(ExecutionMode::Deterministic, Strictness::Relaxed, "{}", "b")
                .render();
        assert!(!relaxed.contains("No commentary"));
    }

    #[test]
    fn rendering_is_pure() {
        let env = PromptEnvelope::structured(ExecutionMode::Verbose, Strictness::Strict, "s", "b");
        assert_eq!(env.render(), env.render());
    }
}
