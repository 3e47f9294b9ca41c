//! Export and download example
//!
//! This example walks through a complete JSOC export:
//! - Submitting a request for one hour of HMI magnetograms
//! - Watching lifecycle events as the request is split, staged and fetched
//! - Waiting for every file to land on disk
//!
//! JSOC only stages exports for registered addresses, so set `JSOC_NOTIFY`
//! to your registered email before running:
//!
//! ```bash
//! JSOC_NOTIFY=you@example.com cargo run --example export
//! ```

use jsoc_dl::{
    ClientConfig, Event, ExportOptions, ExportQuery, GetOptions, JsocClient, TimeRange,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let notify = std::env::var("JSOC_NOTIFY").unwrap_or_default();

    let config = ClientConfig {
        download_dir: "downloads".into(),
        max_connections: 4,
        poll_interval: Duration::from_secs(15),
        ..Default::default()
    };
    let client = JsocClient::new(config)?;

    // Subscribe to events
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::RequestSubmitted { handle, window } => {
                    println!("✓ Submitted {} for {}", handle, window);
                }
                Event::RequestSplit { window } => {
                    println!("✂ Too large, splitting {}", window);
                }
                Event::RequestRejected { window, error, .. } => {
                    println!("✗ Dropped {}: {}", window, error);
                }
                Event::FilesFound {
                    handle,
                    count,
                    size_mb,
                } => {
                    println!(
                        "📦 {}: {} files ({:.1} MB)",
                        handle,
                        count,
                        size_mb.unwrap_or(0.0)
                    );
                }
                Event::DownloadComplete { path, bytes, .. } => {
                    println!("⬇ {:?} ({} bytes)", path, bytes);
                }
                Event::DownloadFailed { url, error, .. } => {
                    println!("✗ {}: {}", url, error);
                }
                _ => {}
            }
        }
    });

    let range = TimeRange::parse("2010-01-01T00:00:00", "2010-01-01T01:00:00")?;
    let query = ExportQuery::new(range, "hmi.m_45s")
        .with_options(ExportOptions::default().notify(notify));

    let handles = client.query(&[query]).await?;
    println!("Accepted {} request(s)", handles.len());

    let tracker = client.wait_get(&handles, &GetOptions::default()).await?;
    tracker.wait(Some(Duration::from_secs(10))).await;

    let summary = tracker.summary();
    println!(
        "Done: {} downloaded, {} skipped, {} failed ({} bytes)",
        summary.downloaded.len(),
        summary.skipped,
        summary.failed.len(),
        summary.bytes
    );

    Ok(())
}
