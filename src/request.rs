use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, MedTranslateError};

/// The four concrete translation sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "keyboard_fixer", alias = "keyboard")]
    KeyboardFixer,
    #[serde(rename = "local", alias = "dictionary")]
    LocalDictionary,
    #[serde(rename = "libre", alias = "libretranslate")]
    LibreTranslate,
    #[serde(rename = "openrouter_ai", alias = "ai")]
    OpenRouterAi,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::KeyboardFixer,
        SourceId::LocalDictionary,
        SourceId::LibreTranslate,
        SourceId::OpenRouterAi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyboardFixer => "keyboard_fixer",
            Self::LocalDictionary => "local",
            Self::LibreTranslate => "libre",
            Self::OpenRouterAi => "openrouter_ai",
        }
    }

    /// Network-bound sources get a per-call timeout from the router.
    pub fn is_network(self) -> bool {
        matches!(self, Self::LibreTranslate | Self::OpenRouterAi)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = MedTranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyboard_fixer" | "keyboard" | "keyfix" => Ok(Self::KeyboardFixer),
            "local" | "dictionary" | "dict" => Ok(Self::LocalDictionary),
            "libre" | "libretranslate" => Ok(Self::LibreTranslate),
            "openrouter_ai" | "openrouter" | "ai" => Ok(Self::OpenRouterAi),
            other => Err(MedTranslateError::UnknownSource(other.to_string())),
        }
    }
}

/// Request-time directive: walk the chain, or call exactly one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequestedSource {
    #[default]
    Auto,
    Only(SourceId),
}

impl fmt::Display for RequestedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Only(id) => id.fmt(f),
        }
    }
}

impl FromStr for RequestedSource {
    type Err = MedTranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

impl TryFrom<String> for RequestedSource {
    type Error = MedTranslateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestedSource> for String {
    fn from(value: RequestedSource) -> Self {
        value.to_string()
    }
}

impl From<SourceId> for RequestedSource {
    fn from(id: SourceId) -> Self {
        Self::Only(id)
    }
}

/// Independent trigger streams; supersession is tracked per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    ClipboardChange,
    Hotkey,
}

/// Monotonic request sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub id: RequestId,
    pub raw_text: String,
    pub requested_source: RequestedSource,
    /// `None` for direct single-shot calls that never get superseded
    pub trigger: Option<TriggerKind>,
    pub submitted_at: DateTime<Utc>,
}

/// User-visible failure of a whole request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    pub kind: ErrorKind,
    /// For `AllSourcesFailed`: the kind of the last source failure
    pub cause: Option<ErrorKind>,
    pub message: String,
}

impl fmt::Display for ResultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            Some(cause) => write!(f, "{} (last: {}): {}", self.kind, cause, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Outcome of one request. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub explanation: Option<String>,
    /// `None` only when the request was rejected before reaching a source
    pub resolved_source: Option<SourceId>,
    pub cached: bool,
    pub latency_ms: u64,
    pub error: Option<ResultError>,
}

impl TranslationResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failure(
        original_text: &str,
        resolved_source: Option<SourceId>,
        error: ResultError,
        latency_ms: u64,
    ) -> Self {
        Self {
            original_text: original_text.to_string(),
            translated_text: String::new(),
            explanation: None,
            resolved_source,
            cached: false,
            latency_ms,
            error: Some(error),
        }
    }
}

/// Delivered to the UI collaborator exactly once per non-superseded request.
#[derive(Debug, Clone)]
pub struct ResultEvent {
    pub request_id: RequestId,
    pub trigger: TriggerKind,
    pub result: TranslationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requested_source() {
        assert_eq!("auto".parse::<RequestedSource>().unwrap(), RequestedSource::Auto);
        assert_eq!(
            "AI".parse::<RequestedSource>().unwrap(),
            RequestedSource::Only(SourceId::OpenRouterAi)
        );
        assert_eq!(
            "local".parse::<RequestedSource>().unwrap(),
            RequestedSource::Only(SourceId::LocalDictionary)
        );
        assert!("google".parse::<RequestedSource>().is_err());
    }

    #[test]
    fn test_source_names_round_trip_through_display() {
        for id in SourceId::ALL {
            assert_eq!(id.to_string().parse::<SourceId>().unwrap(), id);
        }
    }

    #[test]
    fn test_only_network_sources_are_network() {
        assert!(SourceId::LibreTranslate.is_network());
        assert!(SourceId::OpenRouterAi.is_network());
        assert!(!SourceId::KeyboardFixer.is_network());
        assert!(!SourceId::LocalDictionary.is_network());
    }
}
