//! Enumerating staged files and dispatching their downloads

use crate::client::JsocClient;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::status::log_status;
use crate::transfer::TransferManager;
use crate::types::{DownloadTask, Event, ExportHandle, ExportStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options for [`JsocClient::get`] and [`JsocClient::wait_get`]
///
/// Unset fields fall back to the client's [`ClientConfig`](crate::ClientConfig).
#[derive(Clone, Debug)]
pub struct GetOptions {
    /// Directory files are written to
    pub download_dir: Option<PathBuf>,
    /// Download files that already exist locally
    pub overwrite: bool,
    /// Maximum simultaneous file transfers
    pub max_connections: Option<usize>,
    /// Delay between polling passes in `wait_get`
    pub poll_interval: Option<Duration>,
    /// Log per-request status lines and the files-found summary
    pub progress: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            download_dir: None,
            overwrite: false,
            max_connections: None,
            poll_interval: None,
            progress: true,
        }
    }
}

/// Turn the file list of a ready export into download tasks
///
/// Each file maps to `{base_url}{dir}/{filename}` and `{download_dir}/{filename}`.
/// Files whose destination already exists are left out unless `overwrite`.
/// Filenames are reduced to their last path component so nothing is written
/// outside `download_dir`.
pub fn plan_downloads(
    status: &ExportStatus,
    base_url: &str,
    download_dir: &Path,
    overwrite: bool,
) -> Result<Vec<DownloadTask>> {
    let mut tasks = Vec::with_capacity(status.files.len());

    for file in &status.files {
        let Some(name) = Path::new(&file.filename).file_name() else {
            tracing::warn!(
                request_id = %status.handle,
                filename = %file.filename,
                "skipping file with unusable name"
            );
            continue;
        };

        let destination = download_dir.join(name);
        if !overwrite && destination.exists() {
            tracing::debug!(path = %destination.display(), "file exists, skipping");
            continue;
        }

        tasks.push(DownloadTask {
            url: file_url(base_url, &file.remote_dir, &file.filename)?,
            destination,
        });
    }

    Ok(tasks)
}

/// `{base_url}{remote_dir}/{filename}`, percent-encoding as needed
fn file_url(base_url: &str, remote_dir: &str, filename: &str) -> Result<String> {
    let mut url = url::Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(remote_dir.split('/').filter(|s| !s.is_empty()))
        .extend(filename.split('/').filter(|s| !s.is_empty()));
    Ok(url.into())
}

impl JsocClient {
    /// Download every staged request among `handles`
    ///
    /// Requests that are not ready are logged and skipped; a failed status
    /// lookup or retrieval is a warning, not an error. Returns the tracker
    /// the transfers report to (`tracker` if given, otherwise a new one).
    /// When nothing was dispatched the returned tracker is already complete.
    pub async fn get(
        &self,
        handles: &[ExportHandle],
        options: &GetOptions,
        tracker: Option<ProgressTracker>,
    ) -> Result<ProgressTracker> {
        let tracker = tracker.unwrap_or_default();
        let transfers = self.transfer_manager(options)?;
        let download_dir = self.download_dir_for(options);
        let mut dispatched = 0;

        for handle in handles {
            let status = match self.check_status(handle).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(request_id = %handle, error = %e, "status check failed, skipping request");
                    continue;
                }
            };

            if status.is_ready() {
                match self
                    .retrieve_ready(&status, &download_dir, options, &tracker, &transfers)
                    .await
                {
                    Ok(count) => dispatched += count,
                    Err(e) => {
                        tracing::warn!(request_id = %handle, error = %e, "could not retrieve staged files");
                    }
                }
            } else if options.progress {
                log_status(&status);
            }
        }

        if dispatched == 0 {
            tracker.register(Vec::new());
        }
        Ok(tracker)
    }

    /// Wait for every request to be staged, downloading each as it becomes ready
    ///
    /// All transfers share one tracker and one connection pool. Await
    /// [`ProgressTracker::wait`] on the result to block until the files are on
    /// disk.
    pub async fn wait_get(
        &self,
        handles: &[ExportHandle],
        options: &GetOptions,
    ) -> Result<ProgressTracker> {
        let tracker = ProgressTracker::new();
        let transfers = self.transfer_manager(options)?;
        self.wait_for_ready_with(handles, options, &tracker, &transfers)
            .await?;
        Ok(tracker)
    }

    /// Dispatch the files of one ready export, returning how many were queued
    ///
    /// Files already on disk, or already being written by another transfer
    /// on the same tracker, are not queued again.
    pub(crate) async fn retrieve_ready(
        &self,
        status: &ExportStatus,
        download_dir: &Path,
        options: &GetOptions,
        tracker: &ProgressTracker,
        transfers: &TransferManager,
    ) -> Result<usize> {
        tokio::fs::create_dir_all(download_dir).await?;

        let tasks = plan_downloads(
            status,
            &self.config.base_download_url,
            download_dir,
            options.overwrite,
        )?;
        let existing = status.files.len() - tasks.len();
        if existing > 0 {
            tracker.note_skipped(existing);
        }
        let count = if tasks.is_empty() {
            0
        } else {
            transfers.dispatch_all(tasks, tracker).len()
        };

        if options.progress {
            tracing::info!(
                request_id = %status.handle,
                "{} URLs found for download. Totalling {}MB",
                count,
                status.size_mb.unwrap_or(0.0)
            );
        }
        self.emit(Event::FilesFound {
            handle: status.handle.clone(),
            count,
            size_mb: status.size_mb,
        });

        Ok(count)
    }

    pub(crate) fn transfer_manager(&self, options: &GetOptions) -> Result<TransferManager> {
        let max_connections = options
            .max_connections
            .unwrap_or(self.config.max_connections);
        if max_connections == 0 {
            return Err(Error::invalid_option(
                "max_connections",
                "at least one connection is required",
            ));
        }
        Ok(TransferManager::new(
            self.http.clone(),
            max_connections,
            self.config.retry.clone(),
            self.event_tx.clone(),
        ))
    }

    pub(crate) fn poll_interval_for(&self, options: &GetOptions) -> Result<Duration> {
        let interval = options.poll_interval.unwrap_or(self.config.poll_interval);
        if interval.is_zero() {
            return Err(Error::invalid_option(
                "poll_interval",
                "poll interval must be greater than zero",
            ));
        }
        Ok(interval)
    }

    pub(crate) fn download_dir_for(&self, options: &GetOptions) -> PathBuf {
        options
            .download_dir
            .clone()
            .unwrap_or_else(|| self.config.download_dir.clone())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::types::{ExportFile, StatusCode};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FETCH_PATH: &str = "/cgi-bin/ajax/jsoc_fetch";

    fn ready_status(files: &[&str]) -> ExportStatus {
        ExportStatus {
            handle: ExportHandle::new("JSOC_1"),
            code: StatusCode::Ready,
            wait_seconds: None,
            error: None,
            export_time: None,
            dir: Some("/SUM1/D1/S00000".to_string()),
            size_mb: Some(1.0),
            files: files
                .iter()
                .map(|f| ExportFile {
                    filename: f.to_string(),
                    remote_dir: "/SUM1/D1/S00000".to_string(),
                    size_bytes: None,
                })
                .collect(),
        }
    }

    fn client_for(server: &MockServer) -> JsocClient {
        JsocClient::new(ClientConfig {
            export_url: format!("{}{}", server.uri(), FETCH_PATH),
            base_download_url: server.uri(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn urls_join_base_dir_and_filename() {
        let dir = TempDir::new().unwrap();
        let tasks = plan_downloads(
            &ready_status(&["hmi.m_45s.2010.a.fits"]),
            "http://jsoc.stanford.edu",
            dir.path(),
            false,
        )
        .unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].url,
            "http://jsoc.stanford.edu/SUM1/D1/S00000/hmi.m_45s.2010.a.fits"
        );
        assert_eq!(tasks[0].destination, dir.path().join("hmi.m_45s.2010.a.fits"));
    }

    #[test]
    fn base_url_path_is_kept() {
        assert_eq!(
            file_url("http://mirror.example/jsoc/", "/SUM2/D9", "x.fits").unwrap(),
            "http://mirror.example/jsoc/SUM2/D9/x.fits"
        );
        assert!(file_url("not a url", "/SUM2", "x.fits").is_err());
    }

    #[test]
    fn slashes_in_filenames_stay_path_separators() {
        assert_eq!(
            file_url("http://jsoc.stanford.edu", "/SUM1/D1", "S00000/a.fits").unwrap(),
            "http://jsoc.stanford.edu/SUM1/D1/S00000/a.fits"
        );
        assert_eq!(
            file_url("http://jsoc.stanford.edu", "/SUM1/D1/", "a:b.fits").unwrap(),
            "http://jsoc.stanford.edu/SUM1/D1/a:b.fits"
        );
    }

    #[test]
    fn existing_files_are_skipped_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.fits"), b"old").unwrap();
        let status = ready_status(&["a.fits", "b.fits"]);

        let kept = plan_downloads(&status, "http://jsoc.stanford.edu", dir.path(), false).unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].url.ends_with("/b.fits"));

        let all = plan_downloads(&status, "http://jsoc.stanford.edu", dir.path(), true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn path_components_in_filenames_are_stripped() {
        let dir = TempDir::new().unwrap();
        let tasks = plan_downloads(
            &ready_status(&["../../etc/evil.fits"]),
            "http://jsoc.stanford.edu",
            dir.path(),
            false,
        )
        .unwrap();
        assert_eq!(tasks[0].destination, dir.path().join("evil.fits"));
    }

    #[test]
    fn default_options_report_progress() {
        let options = GetOptions::default();
        assert!(options.progress);
        assert!(!options.overwrite);
        assert!(options.download_dir.is_none());
    }

    #[tokio::test]
    async fn get_with_existing_file_dispatches_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FETCH_PATH))
            .and(query_param("requestid", "JSOC_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 0, "dir": "/SUM1/D1/S00000", "size": 0.5,
                "data": [{"filename": "a.fits"}]
            })))
            .mount(&server)
            .await;
        // Any file download would be a failure
        Mock::given(method("GET"))
            .and(path("/SUM1/D1/S00000/a.fits"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.fits"), b"existing").unwrap();

        let client = client_for(&server);
        let tracker = client
            .get(
                &["JSOC_1".into()],
                &GetOptions {
                    download_dir: Some(dir.path().to_path_buf()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(tracker.requested(), 0);
        assert!(tracker.is_complete());
        assert_eq!(tracker.summary().skipped, 1);
        assert_eq!(std::fs::read(dir.path().join("a.fits")).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn get_overwrite_replaces_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FETCH_PATH))
            .and(query_param("requestid", "JSOC_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0", "dir": "/SUM1/D1/S00000",
                "data": [{"filename": "a.fits"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/SUM1/D1/S00000/a.fits"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.fits"), b"stale").unwrap();

        let client = client_for(&server);
        let tracker = client
            .get(
                &["JSOC_1".into()],
                &GetOptions {
                    download_dir: Some(dir.path().to_path_buf()),
                    overwrite: true,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        tracker.wait(None).await;
        assert_eq!(tracker.requested(), 1);
        assert_eq!(std::fs::read(dir.path().join("a.fits")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn get_skips_pending_and_unreachable_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("requestid", "JSOC_PENDING"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "wait": 3})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("requestid", "JSOC_DOWN"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client_for(&server);
        let tracker = client
            .get(
                &["JSOC_PENDING".into(), "JSOC_DOWN".into()],
                &GetOptions {
                    download_dir: Some(dir.path().to_path_buf()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert!(tracker.is_complete());
        assert_eq!(tracker.requested(), 0);
    }

    #[tokio::test]
    async fn get_reuses_given_tracker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FETCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 0, "dir": "/SUM1/D1/S00000",
                "data": [{"filename": "c.fits"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/SUM1/D1/S00000/c.fits"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"c".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client_for(&server);
        let shared = ProgressTracker::new();
        let returned = client
            .get(
                &["JSOC_1".into()],
                &GetOptions {
                    download_dir: Some(dir.path().to_path_buf()),
                    ..Default::default()
                },
                Some(shared.clone()),
            )
            .await
            .unwrap();

        returned.wait(None).await;
        assert_eq!(shared.completed(), 1);
    }

    async fn mount_ready(server: &MockServer, id: &str, dir: &str, files: &[&str]) {
        let data: Vec<_> = files.iter().map(|f| json!({"filename": f})).collect();
        Mock::given(method("GET"))
            .and(path(FETCH_PATH))
            .and(query_param("requestid", id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": 0, "dir": dir, "data": data})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn same_filename_across_exports_is_fetched_once() {
        let server = MockServer::start().await;
        mount_ready(&server, "JSOC_1", "/SUM1/D1", &["a.fits"]).await;
        mount_ready(&server, "JSOC_2", "/SUM1/D2", &["a.fits", "b.fits"]).await;
        Mock::given(method("GET"))
            .and(path("/SUM1/D1/a.fits"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"/SUM1/D1".to_vec())
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        // Still in flight from JSOC_1 when JSOC_2 is retrieved
        Mock::given(method("GET"))
            .and(path("/SUM1/D2/a.fits"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"/SUM1/D2".to_vec()))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/SUM1/D2/b.fits"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"b".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = client_for(&server);
        let tracker = client
            .get(
                &["JSOC_1".into(), "JSOC_2".into()],
                &GetOptions {
                    download_dir: Some(dir.path().to_path_buf()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        tracker.wait(None).await;

        let summary = tracker.summary();
        assert_eq!(summary.requested, 2);
        assert!(summary.failed.is_empty(), "failures: {:?}", summary.failed);
        assert_eq!(summary.skipped, 1);
        assert_eq!(std::fs::read(dir.path().join("a.fits")).unwrap(), b"/SUM1/D1");
    }

    #[tokio::test]
    async fn get_continues_after_retrieval_failure() {
        let server = MockServer::start().await;
        mount_ready(&server, "JSOC_1", "/SUM1/D1", &["a.fits"]).await;
        mount_ready(&server, "JSOC_2", "/SUM1/D2", &["b.fits"]).await;

        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let client = client_for(&server);
        let tracker = client
            .get(
                &["JSOC_1".into(), "JSOC_2".into()],
                &GetOptions {
                    download_dir: Some(blocker.join("out")),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        // Both requests were still looked up; nothing could be queued
        assert!(tracker.is_complete());
        assert_eq!(tracker.requested(), 0);
    }

    #[tokio::test]
    async fn zero_connections_is_rejected() {
        let client = JsocClient::new(ClientConfig::default()).unwrap();
        let err = client
            .get(
                &[],
                &GetOptions {
                    max_connections: Some(0),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }
}
