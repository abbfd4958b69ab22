use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, OpenRouterConfig};
use crate::error::SourceError;
use crate::request::SourceId;
use super::common::{join_url, HttpBase};
use super::{SourceOutput, SourceResult, TranslationSource};

const REFERER: &str = "https://medtranslate-pro.app";
const TITLE: &str = "MedTranslate Pro";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatContent>,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

/// Reject a missing or malformed key before touching the network.
fn validate_api_key(key: &str) -> Result<&str, SourceError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SourceError::unauthenticated("OpenRouter API key is not configured"));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SourceError::unauthenticated("OpenRouter API key is malformed"));
    }
    Ok(key)
}

/// Short, mostly-Latin input: at most three words, over 70% ASCII letters.
pub fn looks_like_term(text: &str) -> bool {
    let text = text.trim();
    let total = text.chars().count();
    if total == 0 || text.split_whitespace().count() > 3 {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    letters as f64 / total as f64 > 0.7
}

/// System prompt plus the optional custom instructions.
fn system_prompt(config: &OpenRouterConfig) -> String {
    let mut prompt = config.system_prompt.trim().to_string();
    let custom = config.custom_prompt.trim();
    if !custom.is_empty() {
        prompt.push_str(&format!("\n\nAdditional instructions: {}", custom));
    }
    prompt
}

/// Strip a surrounding markdown code fence some models add.
fn clean_model_output(text: &str) -> String {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) {
        // drop an optional language tag on the opening fence
        let inner = match inner.split_once('\n') {
            Some((tag, rest)) if !tag.trim().contains(' ') => rest,
            _ => inner,
        };
        return inner.trim().to_string();
    }
    text.to_string()
}

/// AI explanations through the OpenRouter chat completions API
pub struct OpenRouterClient {
    base: HttpBase,
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenRouterClient {
    pub fn new() -> Self {
        Self {
            base: HttpBase::new("OpenRouter"),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            base: HttpBase::with_client("OpenRouter", client),
        }
    }

    /// The system prompt travels in the user message; several free models
    /// ignore the system role.
    fn build_request<'a>(&self, text: &str, config: &'a OpenRouterConfig) -> ChatRequest<'a> {
        ChatRequest {
            model: &config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: format!("{}\n\nTerm to explain: {}", system_prompt(config), text.trim()),
            }],
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn parse_response(&self, body: &str) -> Result<String, SourceError> {
        let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
            SourceError::invalid_response(format!("{} sent malformed JSON: {}", self.base.name, e))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| clean_model_output(&content))
            .unwrap_or_default();
        if content.is_empty() {
            return Err(SourceError::invalid_response(format!(
                "{} response contained no content",
                self.base.name
            )));
        }
        Ok(content)
    }
}

#[async_trait]
impl TranslationSource for OpenRouterClient {
    fn id(&self) -> SourceId {
        SourceId::OpenRouterAi
    }

    async fn attempt(&self, text: &str, config: &Config) -> SourceResult {
        let settings = &config.openrouter;
        let api_key = validate_api_key(&settings.api_key)?;

        if settings.terms_only && !looks_like_term(text) {
            return Err(SourceError::not_applicable(
                "input does not look like a medical term",
            ));
        }

        let timeout = Duration::from_millis(settings.timeout_ms);
        let url = join_url(&settings.endpoint, "chat/completions");
        let request = self.build_request(text, settings);

        debug!("Sending AI request for '{}' with model {}", text.trim(), settings.model);

        let response = self
            .base
            .client
            .post(&url)
            .timeout(timeout)
            .bearer_auth(api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.base.request_error(&e, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.base.request_error(&e, timeout))?;

        if !status.is_success() {
            return Err(self.base.status_error(status, &body));
        }

        self.parse_response(&body).map(SourceOutput::new)
    }
}
