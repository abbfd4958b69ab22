use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::config::{Config, KeyboardLayout};
use crate::error::SourceError;
use crate::request::SourceId;
use super::{SourceOutput, SourceResult, TranslationSource};

/// Embedded layout-punctuation keys per word at which Latin input is remapped
const LATIN_TO_FOREIGN_THRESHOLD: f64 = 0.5;
/// Share of foreign letters above which foreign input is remapped
const FOREIGN_TO_LATIN_THRESHOLD: f64 = 0.5;
/// Remapped text must be at least this share of ASCII letters
const ENGLISH_LETTER_RATIO: f64 = 0.7;

/// US QWERTY key -> Arabic (101) letter, unshifted. `b` types the two-letter
/// lam-alef ligature and has no single-letter pair; Latin text containing it
/// is never remapped.
const ARABIC_PAIRS: &[(char, char)] = &[
    ('q', 'ض'), ('w', 'ص'), ('e', 'ث'), ('r', 'ق'), ('t', 'ف'),
    ('y', 'غ'), ('u', 'ع'), ('i', 'ه'), ('o', 'خ'), ('p', 'ح'),
    ('[', 'ج'), (']', 'د'), ('a', 'ش'), ('s', 'س'), ('d', 'ي'),
    ('f', 'ب'), ('g', 'ل'), ('h', 'ا'), ('j', 'ت'), ('k', 'ن'),
    ('l', 'م'), (';', 'ك'), ('\'', 'ط'), ('`', 'ذ'), ('z', 'ئ'),
    ('x', 'ء'), ('c', 'ؤ'), ('v', 'ر'), ('n', 'ى'), ('m', 'ة'),
    (',', 'و'), ('.', 'ز'), ('/', 'ظ'),
];

/// US QWERTY key -> Russian JCUKEN letter, unshifted
const RUSSIAN_PAIRS: &[(char, char)] = &[
    ('q', 'й'), ('w', 'ц'), ('e', 'у'), ('r', 'к'), ('t', 'е'),
    ('y', 'н'), ('u', 'г'), ('i', 'ш'), ('o', 'щ'), ('p', 'з'),
    ('[', 'х'), (']', 'ъ'), ('a', 'ф'), ('s', 'ы'), ('d', 'в'),
    ('f', 'а'), ('g', 'п'), ('h', 'р'), ('j', 'о'), ('k', 'л'),
    ('l', 'д'), (';', 'ж'), ('\'', 'э'), ('`', 'ё'), ('z', 'я'),
    ('x', 'ч'), ('c', 'с'), ('v', 'м'), ('b', 'и'), ('n', 'т'),
    ('m', 'ь'), (',', 'б'), ('.', 'ю'),
];

struct LayoutTable {
    code: &'static str,
    latin_to_foreign: HashMap<char, char>,
    foreign_to_latin: HashMap<char, char>,
}

impl LayoutTable {
    fn new(code: &'static str, pairs: &[(char, char)]) -> Self {
        Self {
            code,
            latin_to_foreign: pairs.iter().copied().collect(),
            foreign_to_latin: pairs.iter().map(|&(latin, foreign)| (foreign, latin)).collect(),
        }
    }

    /// QWERTY punctuation keys that produce letters on the foreign layout
    fn is_letter_punctuation(&self, c: char) -> bool {
        c.is_ascii_punctuation() && self.latin_to_foreign.contains_key(&c)
    }

    fn is_foreign_letter(&self, c: char) -> bool {
        self.foreign_to_latin.contains_key(&lower(c))
    }

    /// Punctuation keys sitting right before a letter, per word. English
    /// never writes ";j" or "[f"; an apostrophe only counts at word start
    /// so contractions like "it's" stay untouched. Abbreviation dots
    /// ("i.v.", "N/A") and a key before a capital ("Dr.Smith") do not count.
    fn embedded_punctuation_per_word(&self, text: &str) -> f64 {
        if !text.is_ascii() {
            return 0.0;
        }
        let words = text.split_whitespace().count();
        if words == 0 {
            return 0.0;
        }
        let chars: Vec<char> = text.chars().collect();
        let embedded = chars
            .iter()
            .enumerate()
            .filter(|&(_, &c)| self.is_letter_punctuation(c))
            .filter(|&(i, _)| chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic()))
            .filter(|&(i, &c)| {
                c != '\'' || i == 0 || !chars[i - 1].is_ascii_alphabetic()
            })
            .filter(|&(i, _)| !chars[i + 1].is_ascii_uppercase())
            .filter(|&(i, &c)| !is_abbreviation_mark(&chars, i, c))
            .count();
        embedded as f64 / words as f64
    }
}

fn letters_before(chars: &[char], i: usize) -> usize {
    chars[..i].iter().rev().take_while(|c| c.is_ascii_alphabetic()).count()
}

fn letters_after(chars: &[char], i: usize) -> usize {
    chars[i + 1..].iter().take_while(|c| c.is_ascii_alphabetic()).count()
}

/// '.' or '/' between single letters, as in "b.i.d." or "N/A".
fn is_abbreviation_mark(chars: &[char], i: usize, c: char) -> bool {
    matches!(c, '.' | '/') && letters_before(chars, i) == 1 && letters_after(chars, i) == 1
}

static ARABIC: Lazy<LayoutTable> = Lazy::new(|| LayoutTable::new("ar", ARABIC_PAIRS));
static RUSSIAN: Lazy<LayoutTable> = Lazy::new(|| LayoutTable::new("ru", RUSSIAN_PAIRS));

fn table(layout: KeyboardLayout) -> &'static LayoutTable {
    match layout {
        KeyboardLayout::Arabic => &ARABIC,
        KeyboardLayout::Russian => &RUSSIAN,
    }
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn upper(c: char) -> char {
    c.to_uppercase().next().unwrap_or(c)
}

/// Remap through `mapping`, keeping the case of cased scripts.
fn remap(text: &str, mapping: &HashMap<char, char>) -> String {
    text.chars()
        .map(|c| match mapping.get(&lower(c)) {
            Some(&mapped) if c.is_uppercase() => upper(mapped),
            Some(&mapped) => mapped,
            None => c,
        })
        .collect()
}

fn ratio(text: &str, predicate: impl Fn(char) -> bool) -> f64 {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let matching = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .filter(|&c| predicate(c))
        .count();
    matching as f64 / total as f64
}

fn looks_like_english(text: &str) -> bool {
    let has_vowel = text
        .chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y'));
    has_vowel && ratio(text, |c| c.is_ascii_alphabetic()) > ENGLISH_LETTER_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Latin keys typed while meaning the foreign layout
    LatinToForeign,
    /// Foreign letters typed while meaning English
    ForeignToLatin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub text: String,
    pub direction: Direction,
    pub layout_code: &'static str,
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::LatinToForeign => write!(f, "keyboard layout fixed: en -> {}", self.layout_code),
            Direction::ForeignToLatin => write!(f, "keyboard layout fixed: {} -> en", self.layout_code),
        }
    }
}

/// Deterministic keyboard-layout corrector
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyboardFixer;

impl KeyboardFixer {
    pub fn new() -> Self {
        Self
    }

    /// Detect text typed under the wrong layout and return the remapped text.
    pub fn correct(&self, text: &str, layout: KeyboardLayout) -> Option<Correction> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let table = table(layout);

        if table.embedded_punctuation_per_word(text) >= LATIN_TO_FOREIGN_THRESHOLD {
            let fixed = remap(text, &table.latin_to_foreign);
            // every Latin letter must have landed on a foreign one
            if !fixed.chars().any(|c| c.is_ascii_alphabetic()) {
                return Some(Correction {
                    text: fixed,
                    direction: Direction::LatinToForeign,
                    layout_code: table.code,
                });
            }
            debug!("Remapped '{}' still contains Latin letters", fixed);
        }

        if ratio(text, |c| table.is_foreign_letter(c)) > FOREIGN_TO_LATIN_THRESHOLD {
            let fixed = remap(text, &table.foreign_to_latin);
            if looks_like_english(&fixed) {
                return Some(Correction {
                    text: fixed,
                    direction: Direction::ForeignToLatin,
                    layout_code: table.code,
                });
            }
            debug!("Remapped '{}' does not look like English", fixed);
        }

        None
    }
}

#[async_trait]
impl TranslationSource for KeyboardFixer {
    fn id(&self) -> SourceId {
        SourceId::KeyboardFixer
    }

    async fn attempt(&self, text: &str, config: &Config) -> SourceResult {
        match self.correct(text, config.keyboard.layout) {
            Some(correction) => {
                let explanation = correction.to_string();
                Ok(SourceOutput::new(correction.text).with_explanation(explanation))
            }
            None => Err(SourceError::not_applicable("no keyboard layout error detected")),
        }
    }
}
