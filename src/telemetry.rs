//! Fire-and-forget telemetry around publish attempts.
//!
//! Producers emit one event per publish phase; zero or more attached
//! handlers observe them out of band. Emission is best-effort: a handler
//! that panics is contained and never fails the publish path, and nothing
//! about emission is observable through return values.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::message::Message;

/// Fired once per publish call, before any attempt.
pub const PUBLISH_START: &str = "pubsub.publish.start";
/// Fired exactly once on overall success.
pub const PUBLISH_END: &str = "pubsub.publish.end";
/// Fired on every failed attempt beyond the first, zero-delay one.
pub const PUBLISH_RETRY: &str = "pubsub.publish.retry";
/// Fired exactly once when the retry budget is exhausted.
pub const PUBLISH_FAILURE: &str = "pubsub.publish.failure";

/// All publish event names, in emission order.
pub const PUBLISH_EVENTS: [&str; 4] =
    [PUBLISH_START, PUBLISH_END, PUBLISH_RETRY, PUBLISH_FAILURE];

/// A publish-phase telemetry event.
///
/// Producer emissions always carry the list form of messages, even for a
/// single-message publish, so handlers see one fixed shape.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    PublishStart {
        topic: String,
        messages: Vec<Message>,
        system_time: SystemTime,
    },
    PublishEnd {
        topic: String,
        messages: Vec<Message>,
        duration_ms: u128,
    },
    PublishRetry {
        topic: String,
        messages: Vec<Message>,
        /// Total milliseconds slept across retries so far.
        total_delay_ms: u64,
    },
    PublishFailure {
        topic: String,
        messages: Vec<Message>,
        /// Display form of the adapter's last error.
        error: String,
    },
}

impl TelemetryEvent {
    /// The namespaced event name this event emits under.
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::PublishStart { .. } => PUBLISH_START,
            TelemetryEvent::PublishEnd { .. } => PUBLISH_END,
            TelemetryEvent::PublishRetry { .. } => PUBLISH_RETRY,
            TelemetryEvent::PublishFailure { .. } => PUBLISH_FAILURE,
        }
    }

    /// The messages carried by this event.
    pub fn messages(&self) -> &[Message] {
        match self {
            TelemetryEvent::PublishStart { messages, .. }
            | TelemetryEvent::PublishEnd { messages, .. }
            | TelemetryEvent::PublishRetry { messages, .. }
            | TelemetryEvent::PublishFailure { messages, .. } => messages,
        }
    }
}

type Handler = Box<dyn Fn(&TelemetryEvent) + Send + Sync>;

/// Registry of publish-event handlers.
///
/// Cloning shares the registry; producers hold one through their config.
#[derive(Clone)]
pub struct Telemetry {
    handlers: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Telemetry {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a handler to one event name.
    pub fn attach<F>(&self, event: &str, handler: F)
    where
        F: Fn(&TelemetryEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers
                .entry(event.to_string())
                .or_default()
                .push(Box::new(handler));
        }
    }

    /// Attach one handler to all four publish events.
    pub fn attach_all<F>(&self, handler: F)
    where
        F: Fn(&TelemetryEvent) + Send + Sync + Clone + 'static,
    {
        for event in PUBLISH_EVENTS {
            self.attach(event, handler.clone());
        }
    }

    /// Emit an event to its attached handlers.
    ///
    /// A panicking handler is contained; remaining handlers still run.
    pub fn emit(&self, event: &TelemetryEvent) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(_) => return,
        };
        if let Some(attached) = handlers.get(event.name()) {
            for handler in attached {
                let _ = catch_unwind(AssertUnwindSafe(|| handler(event)));
            }
        }
    }
}
