use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::SourceError;
use crate::request::SourceId;
use super::common::{join_url, HttpBase};
use super::{SourceOutput, SourceResult, TranslationSource};

#[derive(Debug, Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Online translation through a LibreTranslate server
pub struct LibreTranslator {
    base: HttpBase,
}

impl Default for LibreTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl LibreTranslator {
    pub fn new() -> Self {
        Self {
            base: HttpBase::new("LibreTranslate"),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            base: HttpBase::with_client("LibreTranslate", client),
        }
    }

    fn parse_response(&self, body: &str) -> Result<String, SourceError> {
        let parsed: LibreResponse = serde_json::from_str(body).map_err(|e| {
            SourceError::invalid_response(format!("{} sent malformed JSON: {}", self.base.name, e))
        })?;
        let text = parsed.translated_text.trim();
        if text.is_empty() {
            return Err(SourceError::invalid_response(format!(
                "{} returned an empty translation",
                self.base.name
            )));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl TranslationSource for LibreTranslator {
    fn id(&self) -> SourceId {
        SourceId::LibreTranslate
    }

    async fn attempt(&self, text: &str, config: &Config) -> SourceResult {
        let timeout = Duration::from_millis(config.libre.timeout_ms);
        let url = join_url(&config.libre.endpoint, "translate");
        let request = LibreRequest {
            q: text.trim(),
            source: &config.translation.source_lang,
            target: &config.translation.target_lang,
            format: "text",
            api_key: config.libre.api_key.as_deref().filter(|k| !k.trim().is_empty()),
        };

        debug!("Sending LibreTranslate request to: {}", url);

        let response = self
            .base
            .client
            .post(&url)
            .timeout(timeout)
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
