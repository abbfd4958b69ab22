use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::request::{RequestId, RequestedSource, TriggerKind};
use crate::router::Router;

/// Text captured by the clipboard watcher or the hotkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub text: String,
    pub kind: TriggerKind,
    pub source_override: Option<RequestedSource>,
}

impl Trigger {
    pub fn clipboard(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TriggerKind::ClipboardChange,
            source_override: None,
        }
    }

    pub fn hotkey(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TriggerKind::Hotkey,
            source_override: None,
        }
    }

    pub fn with_source(mut self, source: RequestedSource) -> Self {
        self.source_override = Some(source);
        self
    }
}

/// Trailing-edge debouncer, one pending trigger per stream.
///
/// A new trigger replaces the pending one on its stream and restarts the
/// window; only a trigger that stays unreplaced for a full window comes out.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<TriggerKind, (Trigger, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn push(&mut self, trigger: Trigger, now: Instant) {
        if let Some((discarded, _)) = self
            .pending
            .insert(trigger.kind, (trigger, now + self.window))
        {
            debug!("Debounced {:?} trigger '{}'", discarded.kind, discarded.text);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(_, deadline)| *deadline).min()
    }

    /// Remove and return triggers whose window has elapsed, oldest deadline first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<Trigger> {
        let due: Vec<TriggerKind> = self
            .pending
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(kind, _)| *kind)
            .collect();
        let mut ready: Vec<(Trigger, Instant)> = due
            .into_iter()
            .filter_map(|kind| self.pending.remove(&kind))
            .collect();
        ready.sort_by_key(|(_, deadline)| *deadline);
        ready.into_iter().map(|(trigger, _)| trigger).collect()
    }

    /// Everything still pending, regardless of deadlines.
    pub fn flush(&mut self) -> Vec<Trigger> {
        let mut ready: Vec<(Trigger, Instant)> = self.pending.drain().map(|(_, v)| v).collect();
        ready.sort_by_key(|(_, deadline)| *deadline);
        ready.into_iter().map(|(trigger, _)| trigger).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn submit(router: &Router, trigger: Trigger) -> RequestId {
    router.submit(trigger.text, trigger.source_override, trigger.kind)
}

/// Feed triggers through the debouncer into the router until the sender
/// side closes. Returns the ids of the submitted requests.
pub async fn run_trigger_feed(
    router: Router,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
) -> Vec<RequestId> {
    let mut debouncer = Debouncer::new(router.config().debounce());
    let mut submitted = Vec::new();

    loop {
        tokio::select! {
            received = triggers.recv() => match received {
                Some(trigger) => {
                    // pick up reloads
                    debouncer.set_window(router.config().debounce());
                    debouncer.push(trigger, Instant::now());
                }
                None => {
                    for trigger in debouncer.flush() {
                        submitted.push(submit(&router, trigger));
                    }
                    debug!("Trigger feed closed after {} requests", submitted.len());
                    return submitted;
                }
            },
            _ = sleep_until_deadline(debouncer.next_deadline()) => {
                for trigger in debouncer.drain_due(Instant::now()) {
                    submitted.push(submit(&router, trigger));
                }
            }
        }
    }
}
