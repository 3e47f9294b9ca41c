//! The JSOC export client
//!
//! `JsocClient` owns the HTTP client, configuration and event channel. Its
//! operations are split across modules by lifecycle stage:
//! - [`submit`](crate::submit) - export requests and size-limit bisection
//! - [`status`](crate::status) - status lookups and the wait loop
//! - [`retrieve`](crate::retrieve) - file enumeration and download dispatch

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::types::Event;
use std::sync::Arc;

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Client for the JSOC export service (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct JsocClient {
    /// Shared HTTP connection pool
    pub(crate) http: reqwest::Client,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<ClientConfig>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl std::fmt::Debug for JsocClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsocClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JsocClient {
    /// Create a new client
    ///
    /// Validates the configuration and builds the HTTP client. No network
    /// access happens here.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {}", e),
            key: None,
        })?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::debug!(
            export_url = %config.export_url,
            download_dir = %config.download_dir.display(),
            max_connections = config.max_connections,
            "JSOC client created"
        );

        Ok(Self {
            http,
            config: Arc::new(config),
            event_tx,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to lifecycle events
    ///
    /// Slow subscribers lose the oldest events rather than blocking the client.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event; having no subscribers is not an error
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
