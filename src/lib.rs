//! # jsoc-dl
//!
//! Async client for the JSOC data export service.
//!
//! ## Lifecycle
//!
//! An export goes through four stages:
//! - **Submit** - a series and time range become one or more export requests.
//!   Requests the archive rejects as too large are bisected in time and
//!   resubmitted until each piece is accepted.
//! - **Poll** - each request id is checked until the archive has staged it.
//! - **Retrieve** - the files of a staged request are downloaded with a
//!   bounded number of simultaneous connections.
//! - **Track** - a [`ProgressTracker`] counts requested and finished transfers
//!   and lets callers wait for the batch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use jsoc_dl::{ClientConfig, ExportQuery, GetOptions, JsocClient, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JsocClient::new(ClientConfig::default())?;
//!
//!     // Subscribe to events
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let range = TimeRange::parse("2010-01-01T00:00:00", "2010-01-01T01:00:00")?;
//!     let handles = client.query(&[ExportQuery::new(range, "hmi.m_45s")]).await?;
//!
//!     let tracker = client.wait_get(&handles, &GetOptions::default()).await?;
//!     tracker.wait(Some(std::time::Duration::from_secs(5))).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// The export client handle
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Download progress tracking
pub mod progress;
/// Export request construction
pub mod request;
/// File enumeration and download dispatch
pub mod retrieve;
/// Retry logic with exponential backoff
pub mod retry;
mod status;
/// Export submission and size-limit bisection
pub mod submit;
/// Time ranges and the UTC to TAI conversion
pub mod time;
mod transfer;
/// Core types and events
pub mod types;
mod wire;

// Re-export commonly used types
pub use client::JsocClient;
pub use config::{ClientConfig, RetryConfig};
pub use error::{Error, Result};
pub use progress::{ProgressCounts, ProgressSummary, ProgressTracker, TaskReport};
pub use request::{ExportOptions, ExportQuery, Wavelength};
pub use retrieve::GetOptions;
pub use time::{TimeRange, TimeScale};
pub use types::{
    AcceptedExport, DownloadTask, Event, ExportFile, ExportHandle, ExportStatus, StatusCode,
    TaskId, TaskOutcome,
};
