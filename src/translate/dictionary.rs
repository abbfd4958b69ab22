use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MedTranslateError, Result, SourceError};
use crate::request::SourceId;
use super::{SourceOutput, SourceResult, TranslationSource};

/// How a dictionary hit was found
#[derive(Debug, Clone, PartialEq)]
pub enum MatchKind {
    /// Case-insensitive exact match
    Exact,
    /// Match after stripping punctuation and diacritics
    Normalized,
    /// Closest term above the similarity cutoff
    Fuzzy { score: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryMatch {
    pub term: String,
    pub translation: String,
    pub kind: MatchKind,
}

/// Offline term -> translation lookup, read-only after load
#[derive(Debug, Default)]
pub struct LocalDictionary {
    /// (term, translation) in load order
    entries: Vec<(String, String)>,
    /// Normalized key of each entry, same order as `entries`
    normalized_keys: Vec<String>,
    by_lower: HashMap<String, usize>,
    by_normalized: HashMap<String, usize>,
}

fn fold_latin(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'æ' => 'a',
        'œ' => 'o',
        // Arabic hamza carriers and alef variants collapse to bare letters
        'أ' | 'إ' | 'آ' => 'ا',
        'ة' => 'ه',
        'ى' => 'ي',
        _ => c,
    }
}

/// Arabic harakat, superscript alef and tatweel
fn is_arabic_mark(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{0640}')
}

fn lower_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercase, strip punctuation and diacritics, collapse whitespace.
pub fn normalize_term(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !is_arabic_mark(*c))
        .map(fold_latin)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl LocalDictionary {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut dictionary = Self::default();
        for (term, translation) in entries {
            let lower = lower_key(&term);
            let normalized = normalize_term(&term);
            if lower.is_empty() || dictionary.by_lower.contains_key(&lower) {
                continue;
            }
            let index = dictionary.entries.len();
            dictionary.by_lower.insert(lower, index);
            if !normalized.is_empty() {
                dictionary.by_normalized.entry(normalized.clone()).or_insert(index);
            }
            dictionary.normalized_keys.push(normalized);
            dictionary.entries.push((term, translation));
        }
        dictionary
    }

    /// Parse a JSON object of term -> translation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| MedTranslateError::Dictionary(format!("Invalid dictionary JSON: {}", e)))?;
        Ok(Self::from_entries(map))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MedTranslateError::Dictionary(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let dictionary = Self::from_json_str(&content)?;
        info!("Loaded {} dictionary entries from {}", dictionary.len(), path.display());
        Ok(dictionary)
    }

    /// Missing or broken data leaves the dictionary empty rather than failing startup.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(dictionary) => dictionary,
            Err(e) => {
                warn!("{}; continuing with an empty dictionary", e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matched(&self, index: usize, kind: MatchKind) -> DictionaryMatch {
        let (term, translation) = &self.entries[index];
        DictionaryMatch {
            term: term.clone(),
            translation: translation.clone(),
            kind,
        }
    }

    /// Exact, then normalized, then fuzzy. `fuzzy_cutoff >= 1.0` disables fuzzy.
    pub fn lookup(&self, text: &str, fuzzy_cutoff: f64) -> Option<DictionaryMatch> {
        if let Some(&index) = self.by_lower.get(&lower_key(text)) {
            return Some(self.matched(index, MatchKind::Exact));
        }

        let normalized = normalize_term(text);
        if normalized.is_empty() {
            return None;
        }
        if let Some(&index) = self.by_normalized.get(&normalized) {
            return Some(self.matched(index, MatchKind::Normalized));
        }

        if fuzzy_cutoff >= 1.0 {
            return None;
        }

        let query_len = normalized.chars().count();
        let mut best: Option<(usize, f64)> = None;
        for (index, key) in self.normalized_keys.iter().enumerate() {
            let key_len = key.chars().count();
            let longest = query_len.max(key_len);
            // the length gap alone bounds the best achievable score
            let bound = 1.0 - query_len.abs_diff(key_len) as f64 / longest.max(1) as f64;
            if bound < fuzzy_cutoff || best.is_some_and(|(_, score)| bound <= score) {
                continue;
            }
            let score = normalized_levenshtein(&normalized, key);
            if score >= fuzzy_cutoff && best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        best.map(|(index, score)| {
            debug!("Fuzzy dictionary match for '{}' (score {:.2})", text, score);
            self.matched(index, MatchKind::Fuzzy { score })
        })
    }

    /// Terms whose normalized form contains the normalized query.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(&str, &str)> {
        let needle = normalize_term(query);
        if needle.is_empty() {
            return Vec::new();
        }
        self.normalized_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key.contains(&needle))
            .take(limit)
            .map(|(index, _)| {
                let (term, translation) = &self.entries[index];
                (term.as_str(), translation.as_str())
            })
            .collect()
    }
}

#[async_trait]
impl TranslationSource for LocalDictionary {
    fn id(&self) -> SourceId {
        SourceId::LocalDictionary
    }

    async fn attempt(&self, text: &str, config: &Config) -> SourceResult {
        let found = self
            .lookup(text, config.dictionary.fuzzy_cutoff)
            .ok_or_else(|| SourceError::not_found(format!("'{}' is not in the dictionary", text.trim())))?;

        let output = SourceOutput::new(found.translation);
        Ok(match found.kind {
            MatchKind::Exact => output,
            MatchKind::Normalized => output.with_explanation(format!("matched '{}'", found.term)),
            MatchKind::Fuzzy { .. } => output.with_explanation(format!("closest match: {}", found.term)),
        })
    }

    fn entry_count(&self) -> Option<usize> {
        Some(self.len())
    }
}
