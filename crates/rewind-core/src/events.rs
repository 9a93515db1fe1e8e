//! In-process publish/subscribe bus for agent lifecycle events.
//!
//! Delivery is synchronous on the publisher's call stack, in registration
//! order. A handler that errors or panics is logged and skipped; it never
//! stops delivery to later handlers and never reaches the publisher.
//! Published events are kept in a capped history.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::config::DEFAULT_EVENT_HISTORY_CAP;
use crate::error::panic_message;
use crate::messages::Payload;
use crate::metrics::METRICS;

/// Lifecycle transitions announced on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    ContextUpdated,
    TaskDelegated,
    ResultReady,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::AgentStarted,
        EventKind::AgentCompleted,
        EventKind::AgentFailed,
        EventKind::ContextUpdated,
        EventKind::TaskDelegated,
        EventKind::ResultReady,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStarted => "agent_started",
            EventKind::AgentCompleted => "agent_completed",
            EventKind::AgentFailed => "agent_failed",
            EventKind::ContextUpdated => "context_updated",
            EventKind::TaskDelegated => "task_delegated",
            EventKind::ResultReady => "result_ready",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    event_id: Uuid,
    kind: EventKind,
    source: String,
    data: Payload,
    timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, source: impl Into<String>, data: Payload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            source: source.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Subscriber callback. Runs on the publisher's thread; keep it short.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &AgentEvent) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &AgentEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = HashMap<EventKind, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>;

pub struct EventBus {
    subscribers: RwLock<Subscribers>,
    history: Mutex<VecDeque<AgentEvent>>,
    history_cap: usize,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("history_cap", &self.history_cap)
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_EVENT_HISTORY_CAP)
    }

    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_cap,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a closure for `kind`. Handlers run in registration order.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_handler(kind, Arc::new(handler))
    }

    pub fn subscribe_handler(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = subscribers.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        before != handlers.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Record the event and deliver it to every current subscriber of its kind.
    pub fn publish(&self, event: AgentEvent) {
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_back(event.clone());
            while history.len() > self.history_cap {
                history.pop_front();
            }
        }
        METRICS.inc_events_published();

        // Snapshot so handlers may (un)subscribe or publish re-entrantly.
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        trace!(kind = %event.kind, source = %event.source, handlers = handlers.len(), "publishing event");

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(kind = %event.kind, subscription = id.0, error = %e, "event handler failed");
                }
                Err(panic) => {
                    warn!(
                        kind = %event.kind,
                        subscription = id.0,
                        error = %panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
    }

    /// Retained events, oldest first.
    pub fn get_history(&self) -> Vec<AgentEvent> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
