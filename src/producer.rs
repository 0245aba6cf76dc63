//! Publish orchestration: metadata stamping, exponential-backoff retries,
//! and publish telemetry.
//!
//! A producer is a long-lived, read-only configuration record, not a
//! process. Each `publish` call runs synchronously on the calling thread;
//! the backoff sleep blocks that same thread, and no state is shared
//! between calls, so concurrent publishes need no coordination here.

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::adapter::AdapterError;
use crate::config::PubSubConfig;
use crate::message::Message;
use crate::schema::SchemaSpec;
use crate::telemetry::TelemetryEvent;

/// First non-zero retry delay; later delays double it (0, D, 2D, 4D, ...).
pub const INITIAL_RETRY_DELAY_MS: u64 = 100;

/// A named producer bound to one topic and schema.
///
/// Stamping outgoing messages with the configured schema, service, and
/// topic is the producer's exclusive responsibility — callers never set
/// those fields themselves.
pub struct Producer {
    config: PubSubConfig,
    name: String,
    topic: String,
    schema: SchemaSpec,
    /// Retry budget in milliseconds; 0 means a single attempt.
    max_retry_duration: u64,
}

impl Producer {
    pub fn new(
        config: PubSubConfig,
        name: impl Into<String>,
        topic: impl Into<String>,
        schema: SchemaSpec,
    ) -> Self {
        Producer {
            config,
            name: name.into(),
            topic: topic.into(),
            schema,
            max_retry_duration: 0,
        }
    }

    /// Set the retry budget in milliseconds. Defaults to 0 (no retries).
    pub fn with_max_retry_duration(mut self, ms: u64) -> Self {
        self.max_retry_duration = ms;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn schema(&self) -> &SchemaSpec {
        &self.schema
    }

    /// Publish a single message.
    ///
    /// Delegates to [`Producer::publish_batch`] so telemetry handlers see
    /// one fixed, list-shaped payload regardless of call site.
    pub fn publish(&self, message: Message) -> Result<Message, AdapterError> {
        let mut published = self.publish_batch(vec![message])?;
        published
            .pop()
            .ok_or_else(|| AdapterError::from("adapter returned an empty batch"))
    }

    /// Publish a batch of messages through the configured adapter with
    /// retry and telemetry.
    ///
    /// On success the returned messages carry adapter-assigned event ids
    /// and publish timestamps. On terminal failure the adapter's last error
    /// is returned untouched; `publish-end` is never emitted on that path.
    pub fn publish_batch(&self, messages: Vec<Message>) -> Result<Vec<Message>, AdapterError> {
        let started = Instant::now();
        let stamped: Vec<Message> = messages.into_iter().map(|m| self.stamp(m)).collect();

        self.config.telemetry().emit(&TelemetryEvent::PublishStart {
            topic: self.topic.clone(),
            messages: stamped.clone(),
            system_time: SystemTime::now(),
        });

        let published = self.publish_with_retries(&stamped)?;

        self.config.telemetry().emit(&TelemetryEvent::PublishEnd {
            topic: self.topic.clone(),
            messages: published.clone(),
            duration_ms: started.elapsed().as_millis(),
        });
        Ok(published)
    }

    /// Overwrite producer-owned metadata on an outgoing message.
    fn stamp(&self, message: Message) -> Message {
        message.put_meta(|meta| {
            meta.schema = Some(self.schema.clone());
            meta.service = Some(self.config.service().to_string());
            meta.topic = Some(self.topic.clone());
        })
    }

    /// The retry engine.
    ///
    /// Delay sequence: 0, D, 2D, 4D, ... with D = [`INITIAL_RETRY_DELAY_MS`].
    /// Before each attempt the engine checks whether the accumulated sleep
    /// plus the next delay would exceed the budget, and if so halts without
    /// attempting. The first attempt's delay is 0, so exactly one attempt is
    /// always made — even with a zero budget. That boundary is load-bearing;
    /// downstream tests pin it.
    fn publish_with_retries(&self, messages: &[Message]) -> Result<Vec<Message>, AdapterError> {
        let mut last_error: Option<AdapterError> = None;
        let mut accumulated: u64 = 0;
        let mut next_delay: u64 = 0;

        loop {
            if accumulated + next_delay > self.max_retry_duration {
                let error = match last_error {
                    Some(error) => error,
                    None => AdapterError::from("retry budget exhausted"),
                };
                self.config.telemetry().emit(&TelemetryEvent::PublishFailure {
                    topic: self.topic.clone(),
                    messages: messages.to_vec(),
                    error: error.to_string(),
                });
                return Err(error);
            }

            if next_delay > 0 {
                thread::sleep(Duration::from_millis(next_delay));
            }

            match self.config.adapter().publish(&self.topic, messages.to_vec()) {
                Ok(published) => return Ok(published),
                Err(error) => {
                    accumulated += next_delay;
                    if next_delay >= INITIAL_RETRY_DELAY_MS {
                        self.config.telemetry().emit(&TelemetryEvent::PublishRetry {
                            topic: self.topic.clone(),
                            messages: messages.to_vec(),
                            total_delay_ms: accumulated,
                        });
                    }
                    last_error = Some(error);
                    next_delay = if next_delay == 0 {
                        INITIAL_RETRY_DELAY_MS
                    } else {
                        next_delay * 2
                    };
                }
            }
        }
    }
}
