//! Explicit, construct-once configuration shared by producers and consumers.
//!
//! Nothing here is ambient or global: the application builds one
//! [`PubSubConfig`] at startup and passes it by reference into every
//! producer and consumer constructor. The record is read-only after
//! construction, so any number of concurrent publish calls may share it.

use std::sync::Arc;

use crate::adapter::Adapter;
use crate::message::{Message, NewMessage};
use crate::metadata::{Metadata, MetadataOverrides};
use crate::telemetry::Telemetry;

/// Hook returning ambient metadata defaults (for example the authenticated
/// user) applied beneath explicit caller overrides.
pub type MetadataDefaultsHook = Arc<dyn Fn() -> MetadataOverrides + Send + Sync>;

/// Shared pub/sub configuration: the service identity, the transport
/// adapter, the telemetry registry, and the optional metadata hook.
#[derive(Clone)]
pub struct PubSubConfig {
    service: String,
    adapter: Arc<dyn Adapter>,
    telemetry: Telemetry,
    metadata_defaults: Option<MetadataDefaultsHook>,
}

impl PubSubConfig {
    pub fn new(service: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        PubSubConfig {
            service: service.into(),
            adapter,
            telemetry: Telemetry::new(),
            metadata_defaults: None,
        }
    }

    /// Use an existing telemetry registry (for sharing handlers across
    /// configs).
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Install the metadata-defaults hook.
    pub fn with_metadata_defaults(mut self, hook: MetadataDefaultsHook) -> Self {
        self.metadata_defaults = Some(hook);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Build a chain-root message with the hook's defaults layered between
    /// the library baseline and the caller's explicit overrides.
    pub fn new_message(&self, opts: NewMessage) -> Message {
        Message {
            data: opts.data.unwrap_or_else(|| serde_json::json!({})),
            metadata: Metadata::new(self.layered_overrides(opts.metadata)),
        }
    }

    fn layered_overrides(&self, explicit: MetadataOverrides) -> MetadataOverrides {
        match &self.metadata_defaults {
            Some(hook) => hook().layered_under(explicit),
            None => explicit,
        }
    }
}
