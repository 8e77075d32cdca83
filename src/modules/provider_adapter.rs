use serde_json::json;
use std::time::Instant;

use crate::llm::{
    LlmRunError, effective_input_tokens, extract_agent_text, run_codex_jsonl, run_ollama_plain,
    usage_from_jsonl,
};
use crate::types::InvocationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Codex,
    Ollama,
    Mock,
}

/// Canned replies for offline runs (`CX_PROVIDER_ADAPTER=mock`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSettings {
    pub response: String,
    pub jsonl_response: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub codex_model: Option<String>,
    pub ollama_model: Option<String>,
    pub mock: MockSettings,
}

fn wrap_agent_text_as_jsonl(text: &str) -> Result<String, LlmRunError> {
    let wrapped = json!({
      "type":"item.completed",
      "item":{"type":"agent_message","text":text}
    });
    serde_json::to_string(&wrapped)
        .map_err(|e| LlmRunError::message(format!("failed to serialize JSONL wrapper: {e}")))
}

/// One backend transport. Every adapter speaks the same JSONL event stream
/// so usage extraction stays in one place.
pub trait ProviderAdapter {
    fn backend_id(&self) -> &'static str;
    fn model(&self) -> Option<String>;
    fn run_jsonl(&self, prompt: &str) -> Result<String, LlmRunError>;
}

pub struct CodexCliAdapter {
    model: Option<String>,
}

impl ProviderAdapter for CodexCliAdapter {
    fn backend_id(&self) -> &'static str {
        "codex"
    }

    fn model(&self) -> Option<String> {
        self.model.clone()
    }

    fn run_jsonl(&self, prompt: &str) -> Result<String, LlmRunError> {
        run_codex_jsonl(prompt, self.model.as_deref())
    }
}

pub struct OllamaCliAdapter {
    model: Option<String>,
}

impl ProviderAdapter for OllamaCliAdapter {
    fn backend_id(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> Option<String> {
        self.model.clone()
    }

    fn run_jsonl(&self, prompt: &str) -> Result<String, LlmRunError> {
        let Some(model) = self.model.as_deref() else {
            return Err(LlmRunError::message(
                "ollama model is unset; set CX_OLLAMA_MODEL",
            ));
        };
        let text = run_ollama_plain(prompt, model)?;
        wrap_agent_text_as_jsonl(&text)
    }
}

pub struct MockAdapter {
    settings: MockSettings,
}

impl ProviderAdapter for MockAdapter {
    fn backend_id(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> Option<String> {
        None
    }

    fn run_jsonl(&self, _prompt: &str) -> Result<String, LlmRunError> {
        if let Some(err) = &self.settings.error {
            return Err(LlmRunError::message(err.clone()));
        }
        if let Some(jsonl) = &self.settings.jsonl_response {
            return Ok(jsonl.clone());
        }
        wrap_agent_text_as_jsonl(&self.settings.response)
    }
}

pub fn resolve_provider_adapter(cfg: &BackendConfig) -> Box<dyn ProviderAdapter> {
    match cfg.kind {
        BackendKind::Mock => Box::new(MockAdapter {
            settings: cfg.mock.clone(),
        }),
        BackendKind::Ollama => Box::new(OllamaCliAdapter {
            model: cfg.ollama_model.clone(),
        }),
        BackendKind::Codex => Box::new(CodexCliAdapter {
            model: cfg.codex_model.clone(),
        }),
    }
}

/// Sends one prompt and times the round trip. A stream without an agent
/// message yields an empty response rather than an error.
pub fn invoke_backend(
    adapter: &dyn ProviderAdapter,
    prompt: &str,
) -> Result<InvocationResult, LlmRunError> {
    let started = Instant::now();
    let jsonl = adapter.run_jsonl(prompt)?;
    let duration_ms = started.elapsed().as_millis() as u64;
    let usage = usage_from_jsonl(&jsonl);
    Ok(InvocationResult {
        duration_ms,
        effective_input_tokens: effective_input_tokens(
            usage.input_tokens,
            usage.cached_input_tokens,
        ),
        input_tokens: usage.input_tokens,
        cached_input_tokens: usage.cached_input_tokens,
        output_tokens: usage.output_tokens,
        raw_response_text: extract_agent_text(&jsonl).unwrap_or_default(),
    })
}
