//! MedTranslate - translation request orchestrator for medical terms
//!
//! Routes short text fragments (clipboard changes, hotkey input) through a
//! priority chain of sources: keyboard-layout fixer, offline dictionary,
//! LibreTranslate and an OpenRouter AI model, with an LRU result cache,
//! fallback and supersession of stale requests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod request;
pub mod router;
pub mod translate;
pub mod trigger;
