//! Bounded-concurrency file transfers
//!
//! A [`TransferManager`] spawns one task per file. Each task waits for a
//! connection slot, streams the body into `<destination>.part`, renames it
//! into place and reports the outcome to the [`ProgressTracker`].

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::retry::download_with_retry;
use crate::types::{DownloadTask, Event, TaskId, TaskOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;

/// Dispatches file transfers with at most `max_connections` in flight
#[derive(Clone)]
pub(crate) struct TransferManager {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    max_connections: usize,
    retry: Arc<RetryConfig>,
    event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("max_connections", &self.max_connections)
            .field("available", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl TransferManager {
    pub(crate) fn new(
        http: reqwest::Client,
        max_connections: usize,
        retry: RetryConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        // Zero would deadlock every transfer
        let max_connections = max_connections.max(1);
        Self {
            http,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            retry: Arc::new(retry),
            event_tx,
        }
    }

    /// Register `tasks` with `tracker` and spawn a transfer for each
    ///
    /// Tasks whose destination is already being written by a live transfer
    /// are skipped.
    pub(crate) fn dispatch_all(
        &self,
        tasks: Vec<DownloadTask>,
        tracker: &ProgressTracker,
    ) -> Vec<JoinHandle<()>> {
        tracker
            .register_unique(tasks)
            .into_iter()
            .map(|(id, task)| self.dispatch(id, task, tracker.clone()))
            .collect()
    }

    /// Spawn one transfer; the tracker is always told how it ended
    pub(crate) fn dispatch(
        &self,
        id: TaskId,
        task: DownloadTask,
        tracker: ProgressTracker,
    ) -> JoinHandle<()> {
        let manager = self.clone();

        tokio::spawn(async move {
            let _permit = match manager.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracker.mark_done(
                        id,
                        TaskOutcome::Failed {
                            error: "transfer pool closed".to_string(),
                        },
                    );
                    return;
                }
            };

            manager.event_tx.send(Event::DownloadStarted {
                id,
                url: task.url.clone(),
            })
            .ok();
            tracing::debug!(task_id = %id, url = %task.url, "download started");

            let result = download_with_retry(&manager.retry, || {
                fetch_to_file(&manager.http, &task.url, &task.destination)
            })
            .await;

            let outcome = match result {
                Ok(bytes) => {
                    tracing::debug!(
                        task_id = %id,
                        path = %task.destination.display(),
                        bytes,
                        "download complete"
                    );
                    manager.event_tx.send(Event::DownloadComplete {
                        id,
                        path: task.destination.clone(),
                        bytes,
                    })
                    .ok();
                    TaskOutcome::Downloaded {
                        path: task.destination.clone(),
                        bytes,
                    }
                }
                Err(e) => {
                    tracing::warn!(task_id = %id, url = %task.url, error = %e, "download failed");
                    manager.event_tx.send(Event::DownloadFailed {
                        id,
                        url: task.url.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                    TaskOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            tracker.mark_done(id, outcome);
        })
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// GET `url` and stream the body to `destination`, returning bytes written
///
/// The file only appears under its final name once the body was fully
/// received; a failed attempt leaves nothing behind.
async fn fetch_to_file(http: &reqwest::Client, url: &str, destination: &Path) -> Result<u64> {
    let mut response = http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::transport(url, &e))?;

    if !response.status().is_success() {
        return Err(Error::http_status(url, response.status()));
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = partial_path(destination);
    let written = async {
        let mut file = tokio::fs::File::create(&part).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::transport(url, &e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<_, Error>(written)
    }
    .await;

    match written {
        Ok(bytes) => {
            tokio::fs::rename(&part, destination).await?;
            Ok(bytes)
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                tracing::debug!(path = %part.display(), error = %cleanup, "could not remove partial file");
            }
            Err(e)
        }
    }
}
