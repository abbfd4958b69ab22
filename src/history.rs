use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MedTranslateError, Result};
use crate::request::{SourceId, TranslationResult};

/// One append-only history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub original: String,
    pub translation: String,
    pub source: SourceId,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    /// Only fresh successes become records.
    pub fn from_result(result: &TranslationResult) -> Option<Self> {
        if result.cached || result.error.is_some() {
            return None;
        }
        let source = result.resolved_source?;
        Some(Self {
            id: Uuid::new_v4(),
            original: result.original_text.clone(),
            translation: result.translated_text.clone(),
            source,
            timestamp: Utc::now(),
        })
    }
}

/// Persistence collaborator for completed translations.
///
/// Called from a blocking worker; failures are logged by the caller and
/// never reach the result event.
pub trait HistorySink: Send + Sync {
    fn append(&self, record: &HistoryRecord) -> Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonlHistorySink {
    path: PathBuf,
    // serializes appends from concurrent workers
    write_lock: Mutex<()>,
}

impl JsonlHistorySink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, skipping lines that fail to parse.
    pub fn read_all(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl HistorySink for JsonlHistorySink {
    fn append(&self, record: &HistoryRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                MedTranslateError::History(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                MedTranslateError::History(format!("Failed to open {}: {}", self.path.display(), e))
            })?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
