//! Thin consumption shim over the external batch pipeline.
//!
//! The pipeline framework owns concurrency, batching, and acknowledgement
//! topology. This consumer only composes the configured adapter with a
//! user-supplied handler: transport messages in, core messages to the
//! handler, ack on success, nack on failure.

use std::fmt;
use std::sync::Arc;

use crate::adapter::{Acknowledger, Adapter, AdapterError, BatchMode, TransportMessage};
use crate::config::PubSubConfig;
use crate::message::Message;

/// Error returned by a message handler; opaque to the consumer.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The user-supplied message handler.
pub type MessageHandler = Box<dyn Fn(&Message) -> Result<(), HandlerError> + Send + Sync>;

/// Error from [`ConsumerBuilder::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumerBuildError {
    MissingHandler,
}

impl fmt::Display for ConsumerBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerBuildError::MissingHandler => {
                f.write_str("consumer requires a message handler")
            }
        }
    }
}

impl std::error::Error for ConsumerBuildError {}

/// Per-batch processing outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Messages unpacked and handled successfully (acked).
    pub handled: usize,
    /// Messages that failed unpacking or handling (nacked).
    pub failed: usize,
}

/// Converts transport-native batches into core messages and dispatches them
/// to the handler. Built via [`Consumer::builder`].
pub struct Consumer {
    config: PubSubConfig,
    handler: MessageHandler,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer").finish_non_exhaustive()
    }
}

/// Builder for [`Consumer`].
pub struct ConsumerBuilder {
    config: PubSubConfig,
    handler: Option<MessageHandler>,
}

impl ConsumerBuilder {
    /// Set the message handler invoked for each unpacked message.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<Consumer, ConsumerBuildError> {
        Ok(Consumer {
            config: self.config,
            handler: self.handler.ok_or(ConsumerBuildError::MissingHandler)?,
        })
    }
}

impl Consumer {
    pub fn builder(config: PubSubConfig) -> ConsumerBuilder {
        ConsumerBuilder {
            config,
            handler: None,
        }
    }

    fn adapter(&self) -> &Arc<dyn Adapter> {
        self.config.adapter()
    }

    /// Process one batch from the pipeline.
    ///
    /// Each transport message is unpacked through the adapter and handed to
    /// the handler; successes ack, failures nack with the error's display
    /// form. One bad message never stops the rest of the batch.
    pub fn handle_batch(&self, batch: &[TransportMessage]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for transport in batch {
            match self.adapter().unpack(transport) {
                Ok(message) => match (self.handler)(&message) {
                    Ok(()) => {
                        transport.ack();
                        outcome.handled += 1;
                    }
                    Err(error) => {
                        transport.nack(&error.to_string());
                        outcome.failed += 1;
                    }
                },
                Err(error) => {
                    transport.nack(&error.to_string());
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Test-harness entry point: pack published messages through the
    /// adapter and run them through [`Consumer::handle_batch`].
    pub fn push_test_batch(
        &self,
        acknowledger: Option<Arc<dyn Acknowledger>>,
        batch_mode: BatchMode,
        messages: &[Message],
    ) -> Result<BatchOutcome, AdapterError> {
        let mut batch = Vec::with_capacity(messages.len());
        for message in messages {
            batch.push(
                self.adapter()
                    .pack(acknowledger.clone(), batch_mode, message)?,
            );
        }
        Ok(self.handle_batch(&batch))
    }
}
