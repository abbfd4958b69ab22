use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{MedTranslateError, Result};
use crate::request::{RequestedSource, SourceId};

pub const MIN_CACHE_SIZE: usize = 100;
pub const MAX_CACHE_SIZE: usize = 5000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a concise medical terminology assistant. When given a medical term:\n\
1. Provide Arabic translation\n\
2. Brief 1-2 sentence explanation in Arabic\n\
3. ONE simple example\n\
4. Keep under 60 words\n\
\n\
Format your response clearly and concisely.";

fn default_source_priority() -> Vec<SourceId> {
    vec![
        SourceId::KeyboardFixer,
        SourceId::OpenRouterAi,
        SourceId::LibreTranslate,
        SourceId::LocalDictionary,
    ]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub libre: LibreConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub dictionary: DictionaryConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Source used when a trigger carries no override
    pub active_source: RequestedSource,
    /// Chain walked left to right in Auto mode
    pub source_priority: Vec<SourceId>,
    /// When false, the first failure in Auto mode is terminal
    pub fallback_enabled: bool,
    /// Try the local dictionary once more when the chain did not include it
    pub offline_fallback: bool,
    pub cache_enabled: bool,
    /// Result cache capacity, valid range 100-5000
    pub cache_size: usize,
    pub source_lang: String,
    pub target_lang: String,
    /// Longer input is rejected before any source is tried
    pub max_input_chars: usize,
    /// Reject input that looks like a URL
    pub reject_urls: bool,
    /// Triggers on the same stream closer than this coalesce
    pub debounce_ms: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            active_source: RequestedSource::Auto,
            source_priority: default_source_priority(),
            fallback_enabled: true,
            offline_fallback: true,
            cache_enabled: true,
            cache_size: MIN_CACHE_SIZE,
            source_lang: "auto".to_string(),
            target_lang: "ar".to_string(),
            max_input_chars: 200,
            reject_urls: true,
            debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibreConfig {
    /// LibreTranslate base URL
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for LibreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://libretranslate.com".to_string(),
            api_key: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    /// OpenAI-compatible API base URL
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    /// Appended to the system prompt when non-empty
    pub custom_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    /// Only send short term-like input to the model
    pub terms_only: bool,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            model: "meta-llama/llama-3-8b-instruct:free".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            custom_prompt: String::new(),
            max_tokens: 150,
            temperature: 0.7,
            timeout_ms: 20_000,
            terms_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardLayout {
    /// Arabic (101) paired with US QWERTY
    #[default]
    Arabic,
    /// Russian JCUKEN paired with US QWERTY
    Russian,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub layout: KeyboardLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// JSON object mapping term to translation
    pub path: PathBuf,
    /// Minimum similarity for a fuzzy match; 1.0 disables fuzzy matching
    pub fuzzy_cutoff: f64,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dictionary.json"),
            fuzzy_cutoff: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Append-only JSON lines file
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(".medtranslate/history.jsonl"),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MedTranslateError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| MedTranslateError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MedTranslateError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MedTranslateError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Repair values that would otherwise break the engine. Never fails.
    pub fn sanitized(mut self) -> Self {
        let size = self.translation.cache_size;
        if !(MIN_CACHE_SIZE..=MAX_CACHE_SIZE).contains(&size) {
            warn!(
                "cache_size {} outside {}-{}, using {}",
                size, MIN_CACHE_SIZE, MAX_CACHE_SIZE, MIN_CACHE_SIZE
            );
            self.translation.cache_size = MIN_CACHE_SIZE;
        }

        if self.translation.source_priority.is_empty() {
            warn!("Empty source_priority, using the default chain");
            self.translation.source_priority = default_source_priority();
        }

        if !(0.0..=1.0).contains(&self.dictionary.fuzzy_cutoff) {
            warn!(
                "fuzzy_cutoff {} outside 0.0-1.0, using 0.6",
                self.dictionary.fuzzy_cutoff
            );
            self.dictionary.fuzzy_cutoff = 0.6;
        }

        self
    }

    /// Per-call budget for network sources; `None` for inline sources.
    pub fn timeout_for(&self, source: SourceId) -> Option<Duration> {
        if !source.is_network() {
            return None;
        }
        let millis = match source {
            SourceId::OpenRouterAi => self.openrouter.timeout_ms,
            _ => self.libre.timeout_ms,
        };
        Some(Duration::from_millis(millis))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.translation.debounce_ms)
    }
}
