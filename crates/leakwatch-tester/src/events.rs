//! Typed, synchronous event bus.
//!
//! Handlers subscribe to one [`EventKind`] and are called in registration
//! order on the publishing thread, before `publish` returns. A panicking
//! handler is contained and logged; the remaining handlers still run.
//! Every published event is also appended to an in-memory log.

use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::error;

/// Event discriminant used for subscriptions and the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Warning,
    Error,
    Snapshot,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Events emitted by the leak tester
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Degraded condition or leak report
    Warning { message: String },
    /// A workload failed; `case` names it when known
    Error { case: Option<String>, message: String },
    /// A snapshot was appended to the store
    Snapshot(Snapshot),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Warning { .. } => EventKind::Warning,
            Self::Error { .. } => EventKind::Error,
            Self::Snapshot(_) => EventKind::Snapshot,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning { message } => write!(f, "{message}"),
            Self::Error { message, .. } => write!(f, "{message}"),
            Self::Snapshot(snapshot) => write!(
                f,
                "Snapshot #{} '{}': heap used {:.2} MB, RSS {:.2} MB",
                snapshot.sequence_index(),
                snapshot.label(),
                snapshot.measurement().heap_used_mb(),
                snapshot.measurement().rss_mb()
            ),
        }
    }
}

/// Entry in the event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub kind: EventKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for each matching event
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Publish/subscribe channel for tester events
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
    log: watch::Sender<Arc<Vec<EventRecord>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (log, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            log,
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Log `event`, then deliver it to every handler for its kind.
    pub fn publish(&self, event: Event) -> EventRecord {
        let kind = event.kind();
        let record = EventRecord {
            kind,
            message: event.to_string(),
            occurred_at: Utc::now(),
        };
        self.log
            .send_modify(|log| Arc::make_mut(log).push(record.clone()));

        // Handlers run without the lock held so they may subscribe or
        // publish themselves.
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        for handler in handlers {
            if let Err(panic_info) = panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                error!(
                    "Event handler for {} panicked: {}",
                    kind,
                    panic_message(panic_info.as_ref())
                );
            }
        }

        record
    }

    /// Immutable view of the event log.
    pub fn records(&self) -> Arc<Vec<EventRecord>> {
        Arc::clone(&self.log.borrow())
    }

    /// Number of logged events of `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.log.borrow().iter().filter(|r| r.kind == kind).count()
    }

    pub(crate) fn clear_log(&self) {
        self.log.send_modify(|log| *log = Arc::new(Vec::new()));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.log.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn warning(message: &str) -> Event {
        Event::Warning {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(EventKind::Warning, move |_| seen.lock().unwrap().push(tag));
        }

        bus.publish(warning("low disk"));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispatch_by_kind() {
        let bus = EventBus::new();
        let errors = Arc::new(AtomicU64::new(0));
        {
            let errors = errors.clone();
            bus.subscribe(EventKind::Error, move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(warning("ignored"));
        bus.publish(Event::Error {
            case: Some("io".to_string()),
            message: "failed".to_string(),
        });

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(bus.count(EventKind::Warning), 1);
        assert_eq!(bus.count(EventKind::Error), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicU64::new(0));

        bus.subscribe(EventKind::Warning, |_| panic!("handler failure"));
        {
            let reached = reached.clone();
            bus.subscribe(EventKind::Warning, move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
            });
        }

        let record = bus.publish(warning("still delivered"));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(record.message, "still delivered");
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::Snapshot, |_| {});
        assert_eq!(bus.subscriber_count(EventKind::Snapshot), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(EventKind::Snapshot), 0);
    }

    #[test]
    fn test_handler_may_publish() {
        let bus = Arc::new(EventBus::new());
        {
            let inner = Arc::downgrade(&bus);
            bus.subscribe(EventKind::Error, move |_| {
                if let Some(bus) = inner.upgrade() {
                    bus.publish(warning("escalated"));
                }
            });
        }

        bus.publish(Event::Error {
            case: None,
            message: "root cause".to_string(),
        });

        let kinds: Vec<EventKind> = bus.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![EventKind::Error, EventKind::Warning]);
    }

    #[test]
    fn test_record_serializes() {
        let bus = EventBus::new();
        let record = bus.publish(warning("heap grew"));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["kind"], "warning");
        assert_eq!(json["message"], "heap grew");
        assert!(json.get("occurredAt").is_some());
    }

    #[test]
    fn test_clear_log() {
        let bus = EventBus::new();
        bus.publish(warning("one"));
        bus.clear_log();
        assert!(bus.records().is_empty());
    }
}
