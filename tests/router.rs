use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use tokio_test::{assert_err, assert_ok};

use medtranslate::cache::CacheKey;
use medtranslate::config::Config;
use medtranslate::error::{ErrorKind, MedTranslateError, SourceError};
use medtranslate::history::{HistoryRecord, HistorySink};
use medtranslate::request::{RequestedSource, SourceId, TriggerKind};
use medtranslate::router::Router;
use medtranslate::translate::{KeyboardFixer, LocalDictionary, SourceOutput, SourceResult, SourceSet, TranslationSource};

/// Scripted source: always succeeds with `<prefix> <text>` or always fails.
struct FakeSource {
    id: SourceId,
    reply: Result<&'static str, ErrorKind>,
    /// Applied to input starting with "slow"
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeSource {
    fn ok(id: SourceId, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            reply: Ok(prefix),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(id: SourceId, kind: ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            id,
            reply: Err(kind),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(id: SourceId, reply: Result<&'static str, ErrorKind>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            reply,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationSource for FakeSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn attempt(&self, text: &str, _config: &Config) -> SourceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.starts_with("slow") && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.reply {
            Ok(prefix) => Ok(SourceOutput::new(format!("{} {}", prefix, text.trim()))),
            Err(kind) => Err(SourceError::new(kind, format!("{} scripted failure", self.id))),
        }
    }
}

mock! {
    pub Source {}

    #[async_trait]
    impl TranslationSource for Source {
        fn id(&self) -> SourceId;
        async fn attempt(&self, text: &str, config: &Config) -> SourceResult;
    }
}

struct Fakes {
    keyboard: Arc<FakeSource>,
    dictionary: Arc<FakeSource>,
    libre: Arc<FakeSource>,
    openrouter: Arc<FakeSource>,
}

impl Fakes {
    /// Every source but the dictionary fails.
    fn mostly_failing() -> Self {
        Self {
            keyboard: FakeSource::failing(SourceId::KeyboardFixer, ErrorKind::NotApplicable),
            dictionary: FakeSource::ok(SourceId::LocalDictionary, "dict"),
            libre: FakeSource::failing(SourceId::LibreTranslate, ErrorKind::Unreachable),
            openrouter: FakeSource::failing(SourceId::OpenRouterAi, ErrorKind::Unauthenticated),
        }
    }

    fn sources(&self) -> SourceSet {
        SourceSet::new(
            self.keyboard.clone(),
            self.dictionary.clone(),
            self.libre.clone(),
            self.openrouter.clone(),
        )
    }
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.history.enabled = false;
    config
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<HistoryRecord>>,
    fail: bool,
}

impl HistorySink for RecordingSink {
    fn append(&self, record: &HistoryRecord) -> medtranslate::error::Result<()> {
        if self.fail {
            return Err(MedTranslateError::History("disk full".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}

async fn wait_for_records(sink: &RecordingSink, count: usize) {
    for _ in 0..100 {
        if sink.records.lock().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_auto_walks_chain_until_dictionary() {
    let fakes = Fakes::mostly_failing();
    let (router, _events) = Router::new(base_config(), fakes.sources(), None);

    let result = router.translate("heart", RequestedSource::Auto).await;

    assert!(result.is_success());
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));
    assert_eq!(result.translated_text, "dict heart");
    assert!(!result.cached);
    assert_eq!(fakes.keyboard.calls(), 1);
    assert_eq!(fakes.openrouter.calls(), 1);
    assert_eq!(fakes.libre.calls(), 1);
    assert_eq!(fakes.dictionary.calls(), 1);
}

#[tokio::test]
async fn test_abbreviations_reach_the_dictionary() {
    let fakes = Fakes::mostly_failing();
    let dictionary = LocalDictionary::from_entries([
        ("i.v. fluids".to_string(), "سوائل وريدية".to_string()),
        ("b.i.d.".to_string(), "مرتين يوميا".to_string()),
    ]);
    let sources = SourceSet::new(
        Arc::new(KeyboardFixer::new()),
        Arc::new(dictionary),
        fakes.libre.clone(),
        fakes.openrouter.clone(),
    );
    let (router, _events) = Router::new(base_config(), sources, None);

    let result = router.translate("i.v. fluids", RequestedSource::Auto).await;
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));
    assert_eq!(result.translated_text, "سوائل وريدية");

    let result = router.translate("b.i.d.", RequestedSource::Auto).await;
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));
    assert_eq!(result.translated_text, "مرتين يوميا");
}

#[tokio::test]
async fn test_exhausted_chain_reports_last_failure() {
    let fakes = Fakes::mostly_failing();
    let fakes = Fakes {
        dictionary: FakeSource::failing(SourceId::LocalDictionary, ErrorKind::NotFound),
        ..fakes
    };
    let (router, _events) = Router::new(base_config(), fakes.sources(), None);

    let result = router.translate("heart", RequestedSource::Auto).await;

    let error = result.error.expect("chain should fail");
    assert_eq!(error.kind, ErrorKind::AllSourcesFailed);
    assert_eq!(error.cause, Some(ErrorKind::NotFound));
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));
    assert!(router.cache().is_empty());
}

#[tokio::test]
async fn test_fallback_disabled_stops_after_first_source() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.translation.fallback_enabled = false;
    let (router, _events) = Router::new(config, fakes.sources(), None);

    let result = router.translate("heart", RequestedSource::Auto).await;

    let error = result.error.expect("first failure is terminal");
    assert_eq!(error.kind, ErrorKind::AllSourcesFailed);
    assert_eq!(error.cause, Some(ErrorKind::NotApplicable));
    assert_eq!(fakes.keyboard.calls(), 1);
    assert_eq!(fakes.openrouter.calls(), 0);
    assert_eq!(fakes.libre.calls(), 0);
    assert_eq!(fakes.dictionary.calls(), 0);
}

#[tokio::test]
async fn test_explicit_source_never_falls_back() {
    let mut libre = MockSource::new();
    libre
        .expect_attempt()
        .times(1)
        .returning(|_, _| Err(SourceError::unreachable("connection refused")));
    let mut dictionary = MockSource::new();
    dictionary.expect_attempt().times(0);

    let sources = SourceSet::new(
        FakeSource::failing(SourceId::KeyboardFixer, ErrorKind::NotApplicable),
        Arc::new(dictionary),
        Arc::new(libre),
        FakeSource::failing(SourceId::OpenRouterAi, ErrorKind::Unauthenticated),
    );
    let (router, _events) = Router::new(base_config(), sources, None);
    assert!(router.config().translation.fallback_enabled);

    let result = router
        .translate("heart", RequestedSource::Only(SourceId::LibreTranslate))
        .await;

    let error = result.error.expect("explicit failure is returned as is");
    assert_eq!(error.kind, ErrorKind::Unreachable);
    assert_eq!(error.cause, None);
    assert_eq!(result.resolved_source, Some(SourceId::LibreTranslate));
}

#[tokio::test]
async fn test_case_different_resubmission_hits_cache() {
    let fakes = Fakes {
        openrouter: FakeSource::ok(SourceId::OpenRouterAi, "<AI output>"),
        ..Fakes::mostly_failing()
    };
    let (router, _events) = Router::new(base_config(), fakes.sources(), None);

    let first = router.translate("cardiology", RequestedSource::Auto).await;
    assert_eq!(first.resolved_source, Some(SourceId::OpenRouterAi));
    assert_eq!(first.translated_text, "<AI output> cardiology");
    assert!(!first.cached);

    let second = router.translate("Cardiology", RequestedSource::Auto).await;
    assert!(second.cached);
    assert_eq!(second.translated_text, first.translated_text);
    assert_eq!(second.resolved_source, Some(SourceId::OpenRouterAi));
    assert_eq!(fakes.openrouter.calls(), 1);
    assert_eq!(fakes.keyboard.calls(), 1);
}

#[tokio::test]
async fn test_repeated_explicit_request_is_cached() {
    let fakes = Fakes {
        libre: FakeSource::ok(SourceId::LibreTranslate, "libre"),
        ..Fakes::mostly_failing()
    };
    let (router, _events) = Router::new(base_config(), fakes.sources(), None);
    let requested = RequestedSource::Only(SourceId::LibreTranslate);

    let first = router.translate("  heart  failure ", requested).await;
    let second = router.translate("heart failure", requested).await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.translated_text, second.translated_text);
    assert_eq!(fakes.libre.calls(), 1);
    assert!(router.cache().contains(&CacheKey::new("Heart Failure", SourceId::LibreTranslate)));
}

#[tokio::test]
async fn test_cache_disabled_always_calls_sources() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.translation.cache_enabled = false;
    let (router, _events) = Router::new(config, fakes.sources(), None);

    router.translate("heart", RequestedSource::Auto).await;
    let second = router.translate("heart", RequestedSource::Auto).await;

    assert!(!second.cached);
    assert_eq!(fakes.dictionary.calls(), 2);
    assert!(router.cache().is_empty());
}

#[tokio::test]
async fn test_invalid_input_reaches_no_source() {
    let fakes = Fakes::mostly_failing();
    let (router, _events) = Router::new(base_config(), fakes.sources(), None);

    let too_long = "x".repeat(201);
    for text in ["   ", "https://example.org/heart", too_long.as_str()] {
        let result = router.translate(text, RequestedSource::Auto).await;
        let error = result.error.expect("input is rejected");
        assert_eq!(error.kind, ErrorKind::InvalidInput);
        assert_eq!(result.resolved_source, None);
    }

    assert_eq!(fakes.keyboard.calls(), 0);
    assert_eq!(fakes.dictionary.calls(), 0);
    assert!(router.cache().is_empty());
}

#[tokio::test]
async fn test_duplicate_chain_entries_are_tried_once() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.translation.source_priority = vec![
        SourceId::LibreTranslate,
        SourceId::LibreTranslate,
        SourceId::LocalDictionary,
    ];
    let (router, _events) = Router::new(config, fakes.sources(), None);

    let result = router.translate("heart", RequestedSource::Auto).await;
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));
    assert_eq!(fakes.libre.calls(), 1);
}

#[tokio::test]
async fn test_offline_fallback_appends_dictionary() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.translation.source_priority = vec![SourceId::OpenRouterAi, SourceId::LibreTranslate];
    let (router, _events) = Router::new(config.clone(), fakes.sources(), None);

    let result = router.translate("heart", RequestedSource::Auto).await;
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));

    config.translation.offline_fallback = false;
    router.reload(config);
    let result = router.translate("lung", RequestedSource::Auto).await;
    assert_eq!(result.error.map(|e| e.cause), Some(Some(ErrorKind::Unreachable)));
    assert_eq!(fakes.dictionary.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_network_source_times_out() {
    let fakes = Fakes {
        libre: FakeSource::slow(SourceId::LibreTranslate, Ok("libre"), Duration::from_secs(30)),
        ..Fakes::mostly_failing()
    };
    let mut config = base_config();
    config.libre.timeout_ms = 100;
    let (router, _events) = Router::new(config, fakes.sources(), None);

    let result = router
        .translate("slow heart", RequestedSource::Only(SourceId::LibreTranslate))
        .await;
    assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::Timeout));

    // in Auto mode the timeout is just another failure
    let result = router.translate("slow heart", RequestedSource::Auto).await;
    assert_eq!(result.resolved_source, Some(SourceId::LocalDictionary));
}

#[tokio::test(start_paused = true)]
async fn test_newer_request_supersedes_older() {
    let fakes = Fakes {
        libre: FakeSource::slow(SourceId::LibreTranslate, Ok("libre"), Duration::from_millis(200)),
        ..Fakes::mostly_failing()
    };
    let mut config = base_config();
    config.translation.source_priority = vec![SourceId::LibreTranslate];
    let (router, mut events) = Router::new(config, fakes.sources(), None);

    let first = router.submit("slow heart", None, TriggerKind::ClipboardChange);
    // let the first request reach the network call
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = router.submit("lung", None, TriggerKind::ClipboardChange);
    assert!(second > first);

    let event = events.recv().await.unwrap();
    assert_eq!(event.request_id, second);
    assert_eq!(event.result.translated_text, "libre lung");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_err!(events.try_recv());

    // the first call ran to completion but left no trace
    assert_eq!(fakes.libre.calls(), 2);
    assert!(!router.cache().contains(&CacheKey::new("slow heart", SourceId::LibreTranslate)));
}

#[tokio::test]
async fn test_superseded_request_writes_no_history() {
    let fakes = Fakes {
        libre: FakeSource::slow(SourceId::LibreTranslate, Ok("libre"), Duration::from_millis(200)),
        ..Fakes::mostly_failing()
    };
    let mut config = base_config();
    config.translation.source_priority = vec![SourceId::LibreTranslate];
    config.history.enabled = true;
    let sink = Arc::new(RecordingSink::default());
    let history: Arc<dyn HistorySink> = sink.clone();
    let (router, mut events) = Router::new(config, fakes.sources(), Some(history));

    router.submit("slow heart", None, TriggerKind::ClipboardChange);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = router.submit("lung", None, TriggerKind::ClipboardChange);

    let event = events.recv().await.unwrap();
    assert_eq!(event.request_id, second);
    wait_for_records(&sink, 1).await;

    // give the superseded call time to finish
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fakes.libre.calls(), 2);

    let records = sink.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].original, "lung");
    assert_eq!(records[0].translation, "libre lung");
}

#[tokio::test(start_paused = true)]
async fn test_streams_do_not_supersede_each_other() {
    let fakes = Fakes {
        libre: FakeSource::slow(SourceId::LibreTranslate, Ok("libre"), Duration::from_millis(200)),
        ..Fakes::mostly_failing()
    };
    let mut config = base_config();
    config.translation.source_priority = vec![SourceId::LibreTranslate];
    let (router, mut events) = Router::new(config, fakes.sources(), None);

    let clipboard = router.submit("slow heart", None, TriggerKind::ClipboardChange);
    let hotkey = router.submit("lung", None, TriggerKind::Hotkey);

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    // resolution order, not submission order
    assert_eq!((first.request_id, first.trigger), (hotkey, TriggerKind::Hotkey));
    assert_eq!((second.request_id, second.trigger), (clipboard, TriggerKind::ClipboardChange));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_request_keeps_its_config_snapshot() {
    let fakes = Fakes {
        libre: FakeSource::slow(
            SourceId::LibreTranslate,
            Err(ErrorKind::Unreachable),
            Duration::from_millis(300),
        ),
        ..Fakes::mostly_failing()
    };
    let mut config = base_config();
    config.translation.source_priority = vec![SourceId::LibreTranslate, SourceId::LocalDictionary];
    let (router, mut events) = Router::new(config.clone(), fakes.sources(), None);

    router.submit("slow heart", None, TriggerKind::Hotkey);
    tokio::time::sleep(Duration::from_millis(50)).await;

    config.translation.fallback_enabled = false;
    router.reload(config);

    let event = events.recv().await.unwrap();
    assert_eq!(event.result.resolved_source, Some(SourceId::LocalDictionary));

    let result = router.translate("slow lung", RequestedSource::Auto).await;
    assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::AllSourcesFailed));
    assert_eq!(fakes.dictionary.calls(), 1);
}

#[tokio::test]
async fn test_submit_uses_active_source_by_default() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.translation.active_source = RequestedSource::Only(SourceId::LibreTranslate);
    let (router, mut events) = Router::new(config, fakes.sources(), None);

    router.submit("heart", None, TriggerKind::Hotkey);
    let event = events.recv().await.unwrap();
    assert_eq!(event.result.error.map(|e| e.kind), Some(ErrorKind::Unreachable));
    assert_eq!(fakes.dictionary.calls(), 0);

    router.submit("heart", Some(RequestedSource::Auto), TriggerKind::Hotkey);
    let event = events.recv().await.unwrap();
    assert_eq!(event.result.resolved_source, Some(SourceId::LocalDictionary));
}

#[tokio::test]
async fn test_history_records_fresh_successes_only() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.history.enabled = true;
    let sink = Arc::new(RecordingSink::default());
    let history: Arc<dyn HistorySink> = sink.clone();
    let (router, _events) = Router::new(config, fakes.sources(), Some(history));

    router.translate("heart", RequestedSource::Auto).await;
    wait_for_records(&sink, 1).await;

    // cached hit and failure are not recorded
    router.translate("Heart", RequestedSource::Auto).await;
    router
        .translate("lung", RequestedSource::Only(SourceId::LibreTranslate))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let records = sink.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].original, "heart");
    assert_eq!(records[0].translation, "dict heart");
    assert_eq!(records[0].source, SourceId::LocalDictionary);
}

#[tokio::test]
async fn test_history_failure_does_not_affect_result() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.history.enabled = true;
    let sink = Arc::new(RecordingSink {
        fail: true,
        ..RecordingSink::default()
    });
    let (router, mut events) = Router::new(config, fakes.sources(), Some(sink as Arc<dyn HistorySink>));

    router.submit("heart", None, TriggerKind::ClipboardChange);
    let event = assert_ok!(tokio::time::timeout(Duration::from_secs(1), events.recv()).await);
    assert!(event.unwrap().result.is_success());
}

#[tokio::test]
async fn test_reload_resizes_cache() {
    let fakes = Fakes::mostly_failing();
    let mut config = base_config();
    config.translation.cache_size = 300;
    let (router, _events) = Router::new(config.clone(), fakes.sources(), None);

    for i in 0..150 {
        let result = router
            .translate(&format!("term {}", i), RequestedSource::Only(SourceId::LocalDictionary))
            .await;
        assert!(result.is_success());
    }
    assert_eq!(router.cache().len(), 150);

    config.translation.cache_size = 100;
    router.reload(config.clone());
    assert_eq!(router.cache().capacity(), 100);
    assert_eq!(router.cache().len(), 100);
    assert!(router.cache().contains(&CacheKey::new("term 149", SourceId::LocalDictionary)));
    assert!(!router.cache().contains(&CacheKey::new("term 0", SourceId::LocalDictionary)));

    // out of range falls back to the minimum instead of failing
    config.translation.cache_size = 1_000_000;
    router.reload(config);
    assert_eq!(router.cache().capacity(), 100);
}

#[tokio::test]
async fn test_stats_report_dictionary_and_cache() {
    let dictionary = LocalDictionary::from_entries([
        ("heart".to_string(), "قلب".to_string()),
        ("lung".to_string(), "رئة".to_string()),
    ]);
    let fakes = Fakes::mostly_failing();
    let sources = SourceSet::new(
        fakes.keyboard.clone(),
        Arc::new(dictionary),
        fakes.libre.clone(),
        fakes.openrouter.clone(),
    );
    let (router, _events) = Router::new(base_config(), sources, None);

    let result = router.translate("Heart", RequestedSource::Auto).await;
    assert_eq!(result.translated_text, "قلب");
    router.translate("heart", RequestedSource::Auto).await;

    let stats = router.stats();
    assert_eq!(stats.dictionary_entries, Some(2));
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.cache.len, 1);
    assert_eq!((stats.cache.hits, stats.cache.misses), (1, 1));
    assert_eq!(stats.active_source, RequestedSource::Auto);
    assert!(stats.to_string().contains("2 terms"));
}
