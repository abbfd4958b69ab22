use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedTranslateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Unknown translation source: {0}")]
    UnknownSource(String),
}

pub type Result<T> = std::result::Result<T, MedTranslateError>;

/// Typed failure reasons shared by every source and by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Dictionary miss
    NotFound,
    /// Keyboard fixer (or the AI term filter) declined the input
    NotApplicable,
    Timeout,
    /// Connection-level failure
    Unreachable,
    /// Malformed or empty payload
    InvalidResponse,
    Unauthenticated,
    /// Chain exhausted in Auto mode
    AllSourcesFailed,
    /// Rejected before any source was tried (empty, too long, URL)
    InvalidInput,
}

impl ErrorKind {
    /// Soft failures are expected declines rather than faults.
    pub fn is_soft(self) -> bool {
        matches!(self, Self::NotFound | Self::NotApplicable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotApplicable => "not_applicable",
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::InvalidResponse => "invalid_response",
            Self::Unauthenticated => "unauthenticated",
            Self::AllSourcesFailed => "all_sources_failed",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed failure reported by a single source call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn not_applicable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotApplicable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unreachable, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }
}
