// Translation sources behind one capability trait
//
// - KeyboardFixer: remaps text typed under the wrong keyboard layout
// - LocalDictionary: offline medical term lookup
// - LibreTranslator: LibreTranslate HTTP API
// - OpenRouterClient: LLM explanation through OpenRouter
//
// The router never looks sources up by name: SourceSet holds exactly one
// implementation per SourceId and `get` matches exhaustively.

pub mod common;
pub mod dictionary;
pub mod keyboard;
pub mod libre;
pub mod openrouter;

use std::sync::Arc;

use async_trait::async_trait;

pub use dictionary::LocalDictionary;
pub use keyboard::KeyboardFixer;
pub use libre::LibreTranslator;
pub use openrouter::OpenRouterClient;

use crate::config::Config;
use crate::error::SourceError;
use crate::request::SourceId;

/// Successful output of a single source call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutput {
    pub text: String,
    pub explanation: Option<String>,
}

impl SourceOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            explanation: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

pub type SourceResult = std::result::Result<SourceOutput, SourceError>;

/// Main trait for translation sources
///
/// A source either succeeds or reports exactly one typed failure per call.
/// Retrying and falling back are the router's business.
#[async_trait]
pub trait TranslationSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Translate `text` using the configuration snapshot of the request.
    async fn attempt(&self, text: &str, config: &Config) -> SourceResult;

    /// Number of loaded entries, for sources backed by a term set.
    fn entry_count(&self) -> Option<usize> {
        None
    }
}

/// One implementation per concrete source.
#[derive(Clone)]
pub struct SourceSet {
    keyboard: Arc<dyn TranslationSource>,
    dictionary: Arc<dyn TranslationSource>,
    libre: Arc<dyn TranslationSource>,
    openrouter: Arc<dyn TranslationSource>,
}

impl SourceSet {
    pub fn new(
        keyboard: Arc<dyn TranslationSource>,
        dictionary: Arc<dyn TranslationSource>,
        libre: Arc<dyn TranslationSource>,
        openrouter: Arc<dyn TranslationSource>,
    ) -> Self {
        Self {
            keyboard,
            dictionary,
            libre,
            openrouter,
        }
    }

    /// Build the production sources around an already loaded dictionary.
    pub fn standard(dictionary: Arc<LocalDictionary>) -> Self {
        Self::new(
            Arc::new(KeyboardFixer::new()),
            dictionary,
            Arc::new(LibreTranslator::new()),
            Arc::new(OpenRouterClient::new()),
        )
    }

    pub fn get(&self, id: SourceId) -> &Arc<dyn TranslationSource> {
        match id {
            SourceId::KeyboardFixer => &self.keyboard,
            SourceId::LocalDictionary => &self.dictionary,
            SourceId::LibreTranslate => &self.libre,
            SourceId::OpenRouterAi => &self.openrouter,
        }
    }
}
