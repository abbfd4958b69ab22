//! Source Router
//!
//! Owns the priority chain, dispatches to sources, applies fallback, reads
//! and writes the result cache, and delivers exactly one result event per
//! request that is still current for its trigger stream.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::config::{Config, TranslationConfig};
use crate::error::{ErrorKind, SourceError};
use crate::history::{HistoryRecord, HistorySink};
use crate::request::{
    RequestId, RequestedSource, ResultError, ResultEvent, SourceId, TranslationRequest,
    TranslationResult, TriggerKind,
};
use crate::translate::{SourceOutput, SourceSet};

const URL_MARKERS: &[&str] = &["http://", "https://", "www.", ".com", ".org", ".net"];

/// Reject input no source should see.
pub fn validate_input(text: &str, config: &TranslationConfig) -> Result<(), String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("input is empty".to_string());
    }
    let length = text.chars().count();
    if length > config.max_input_chars {
        return Err(format!(
            "input is {} characters, limit is {}",
            length, config.max_input_chars
        ));
    }
    if config.reject_urls {
        let lower = text.to_lowercase();
        if URL_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Err("input looks like a URL".to_string());
        }
    }
    Ok(())
}

/// Sources to try, in order, for a request.
fn candidates(requested: RequestedSource, config: &TranslationConfig) -> Vec<SourceId> {
    match requested {
        RequestedSource::Only(id) => vec![id],
        RequestedSource::Auto => {
            let mut chain = config.source_priority.clone();
            if config.fallback_enabled
                && config.offline_fallback
                && !chain.contains(&SourceId::LocalDictionary)
            {
                chain.push(SourceId::LocalDictionary);
            }
            chain
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub dictionary_entries: Option<usize>,
    pub active_source: RequestedSource,
    pub chain: Vec<SourceId>,
    pub requests: u64,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<&str> = self.chain.iter().map(|id| id.as_str()).collect();
        writeln!(f, "Active source:  {}", self.active_source)?;
        writeln!(f, "Chain:          {}", chain.join(" -> "))?;
        writeln!(f, "Cache:          {}/{} entries", self.cache.len, self.cache.capacity)?;
        writeln!(f, "Cache hits:     {} (misses: {})", self.cache.hits, self.cache.misses)?;
        match self.dictionary_entries {
            Some(n) => writeln!(f, "Dictionary:     {} terms", n)?,
            None => writeln!(f, "Dictionary:     not loaded")?,
        }
        write!(f, "Requests:       {}", self.requests)
    }
}

enum Outcome {
    Resolved(TranslationResult),
    Superseded,
}

struct Inner {
    config: RwLock<Arc<Config>>,
    sources: SourceSet,
    cache: ResultCache,
    history: Option<Arc<dyn HistorySink>>,
    events: mpsc::UnboundedSender<ResultEvent>,
    next_id: AtomicU64,
    /// Latest request id per trigger stream
    latest: Mutex<HashMap<TriggerKind, u64>>,
}

/// Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

impl Router {
    /// Build a router and the receiving end of its result events.
    pub fn new(
        config: Config,
        sources: SourceSet,
        history: Option<Arc<dyn HistorySink>>,
    ) -> (Self, mpsc::UnboundedReceiver<ResultEvent>) {
        let config = config.sanitized();
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            cache: ResultCache::new(config.translation.cache_size),
            config: RwLock::new(Arc::new(config)),
            sources,
            history,
            events,
            next_id: AtomicU64::new(1),
            latest: Mutex::new(HashMap::new()),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<Config> {
        self.inner.config.read().clone()
    }

    /// Swap in a new configuration. Requests already running keep theirs.
    pub fn reload(&self, config: Config) {
        let config = config.sanitized();
        self.inner.cache.set_capacity(config.translation.cache_size);
        if !config.translation.cache_enabled {
            self.inner.cache.clear();
        }
        info!(
            "Configuration reloaded: source {}, {} chain entries, cache capacity {}",
            config.translation.active_source,
            config.translation.source_priority.len(),
            config.translation.cache_size
        );
        *self.inner.config.write() = Arc::new(config);
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    pub fn stats(&self) -> EngineStats {
        let config = self.config();
        EngineStats {
            cache: self.inner.cache.stats(),
            dictionary_entries: self
                .inner
                .sources
                .get(SourceId::LocalDictionary)
                .entry_count(),
            active_source: config.translation.active_source,
            chain: config.translation.source_priority.clone(),
            requests: self.inner.next_id.load(Ordering::SeqCst) - 1,
        }
    }

    /// Resolve one request directly and return its result.
    ///
    /// Not tied to a trigger stream, so it is never superseded and emits no
    /// result event.
    pub async fn translate(&self, text: &str, requested: RequestedSource) -> TranslationResult {
        let request = self.inner.new_request(text.to_string(), requested, None);
        let config = self.config();
        match self.inner.resolve(&request, &config).await {
            Outcome::Resolved(result) => {
                self.inner.store(&result, &config);
                self.inner.record_history(&result, &config);
                result
            }
            // unreachable without a trigger stream
            Outcome::Superseded => TranslationResult::failure(
                text,
                None,
                ResultError {
                    kind: ErrorKind::AllSourcesFailed,
                    cause: None,
                    message: "request was superseded".to_string(),
                },
                0,
            ),
        }
    }

    /// Submit a request on a trigger stream. The result arrives as a
    /// `ResultEvent` unless a newer request on the same stream supersedes it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        text: impl Into<String>,
        requested: Option<RequestedSource>,
        trigger: TriggerKind,
    ) -> RequestId {
        // one snapshot per request, taken at submission
        let config = self.config();
        let requested = requested.unwrap_or(config.translation.active_source);
        let request = {
            // allocate and mark latest together so ids stay ordered per stream
            let mut latest = self.inner.latest.lock();
            let request = self.inner.new_request(text.into(), requested, Some(trigger));
            latest.insert(trigger, request.id.0);
            request
        };
        let id = request.id;

        debug!("Submitted request {} on {:?} ({})", id, trigger, requested);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            match inner.resolve(&request, &config).await {
                Outcome::Resolved(result) => inner.deliver(&request, trigger, result, &config),
                Outcome::Superseded => {
                    debug!("Request {} superseded during the chain walk", request.id)
                }
            }
        });

        id
    }
}

impl Inner {
    fn new_request(
        &self,
        raw_text: String,
        requested_source: RequestedSource,
        trigger: Option<TriggerKind>,
    ) -> TranslationRequest {
        TranslationRequest {
            id: RequestId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            raw_text,
            requested_source,
            trigger,
            submitted_at: Utc::now(),
        }
    }

    fn is_current(&self, request: &TranslationRequest) -> bool {
        match request.trigger {
            Some(trigger) => self.latest.lock().get(&trigger) == Some(&request.id.0),
            None => true,
        }
    }

    async fn resolve(&self, request: &TranslationRequest, config: &Config) -> Outcome {
        let started = Instant::now();
        let text = request.raw_text.trim();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        if let Err(reason) = validate_input(text, &config.translation) {
            debug!("Request {} rejected: {}", request.id, reason);
            return Outcome::Resolved(TranslationResult::failure(
                text,
                None,
                ResultError {
                    kind: ErrorKind::InvalidInput,
                    cause: None,
                    message: reason,
                },
                elapsed(started),
            ));
        }

        let chain = candidates(request.requested_source, &config.translation);

        if config.translation.cache_enabled {
            if let Some(mut hit) = self.cache.get_any(text, &chain) {
                debug!("Cache hit for request {}", request.id);
                hit.original_text = text.to_string();
                hit.latency_ms = elapsed(started);
                return Outcome::Resolved(hit);
            }
        }

        if let RequestedSource::Only(id) = request.requested_source {
            let result = match self.attempt(id, text, config).await {
                Ok(output) => success(text, id, output, elapsed(started)),
                Err(err) => {
                    info!("Request {}: {} failed: {}", request.id, id, err);
                    TranslationResult::failure(
                        text,
                        Some(id),
                        ResultError {
                            kind: err.kind,
                            cause: None,
                            message: err.message,
                        },
                        elapsed(started),
                    )
                }
            };
            return Outcome::Resolved(result);
        }

        // sources that already failed during this walk
        let mut failed: HashSet<SourceId> = HashSet::new();
        let mut last: Option<(SourceId, SourceError)> = None;

        for id in chain {
            if failed.contains(&id) {
                debug!("Request {}: skipping {}, already failed", request.id, id);
                continue;
            }
            if !self.is_current(request) {
                return Outcome::Superseded;
            }

            match self.attempt(id, text, config).await {
                Ok(output) => {
                    debug!("Request {} resolved by {}", request.id, id);
                    return Outcome::Resolved(success(text, id, output, elapsed(started)));
                }
                Err(err) => {
                    if err.kind.is_soft() {
                        debug!("Request {}: {} declined: {}", request.id, id, err);
                    } else {
                        warn!("Request {}: {} failed: {}", request.id, id, err);
                    }
                    failed.insert(id);
                    last = Some((id, err));
                    if !config.translation.fallback_enabled {
                        debug!("Fallback disabled, stopping after {}", id);
                        break;
                    }
                }
            }
        }

        let (resolved, cause, message) = match last {
            Some((id, err)) => (
                Some(id),
                Some(err.kind),
                format!("all sources failed, last {}: {}", id, err.message),
            ),
            None => (None, None, "no source was attempted".to_string()),
        };
        Outcome::Resolved(TranslationResult::failure(
            text,
            resolved,
            ResultError {
                kind: ErrorKind::AllSourcesFailed,
                cause,
                message,
            },
            elapsed(started),
        ))
    }

    /// One source call, bounded by the source's timeout when it has one.
    async fn attempt(
        &self,
        id: SourceId,
        text: &str,
        config: &Config,
    ) -> Result<SourceOutput, SourceError> {
        let source = self.sources.get(id);
        match config.timeout_for(id) {
            Some(budget) => tokio::time::timeout(budget, source.attempt(text, config))
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::timeout(format!(
                        "{} did not answer within {}ms",
                        id,
                        budget.as_millis()
                    )))
                }),
            None => source.attempt(text, config).await,
        }
    }

    /// Cache fresh successes under the source that produced them.
    fn store(&self, result: &TranslationResult, config: &Config) {
        if !config.translation.cache_enabled || result.cached || !result.is_success() {
            return;
        }
        if let Some(source) = result.resolved_source {
            self.cache
                .put(CacheKey::new(&result.original_text, source), result.clone());
        }
    }

    /// Emit the result if the request is still the latest on its stream.
    fn deliver(
        &self,
        request: &TranslationRequest,
        trigger: TriggerKind,
        result: TranslationResult,
        config: &Config,
    ) {
        {
            // newer submissions wait here, so the check and the send agree
            let latest = self.latest.lock();
            if latest.get(&trigger) != Some(&request.id.0) {
                debug!("Request {} superseded, result discarded", request.id);
                return;
            }
            self.store(&result, config);
            let event = ResultEvent {
                request_id: request.id,
                trigger,
                result: result.clone(),
            };
            if self.events.send(event).is_err() {
                debug!("No listener for result of request {}", request.id);
            }
        }
        self.record_history(&result, config);
    }

    /// Fire-and-forget append on a blocking worker.
    fn record_history(&self, result: &TranslationResult, config: &Config) {
        if !config.history.enabled {
            return;
        }
        let Some(sink) = self.history.clone() else {
            return;
        };
        let Some(record) = HistoryRecord::from_result(result) else {
            return;
        };
        tokio::task::spawn_blocking(move || {
            if let Err(e) = sink.append(&record) {
                warn!("Failed to write history record: {}", e);
            }
        });
    }
}

fn success(text: &str, source: SourceId, output: SourceOutput, latency_ms: u64) -> TranslationResult {
    TranslationResult {
        original_text: text.to_string(),
        translated_text: output.text,
        explanation: output.explanation,
        resolved_source: Some(source),
        cached: false,
        latency_ms,
        error: None,
    }
}
