//! Export status lookups and the wait-for-staging loop

use crate::client::JsocClient;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::retrieve::GetOptions;
use crate::transfer::TransferManager;
use crate::types::{Event, ExportHandle, ExportStatus, StatusCode};
use crate::wire::StatusResponse;

impl JsocClient {
    /// Look up the staging state of one export request
    ///
    /// A single GET with no retry. Connection failures and non-2xx responses
    /// become [`Error::Transport`].
    pub async fn check_status(&self, handle: &ExportHandle) -> Result<ExportStatus> {
        let url = &self.config.export_url;

        let response = self
            .http
            .get(url)
            .query(&[("op", "exp_status"), ("requestid", handle.as_str())])
            .send()
            .await
            .map_err(|e| Error::transport(url, &e))?;

        if !response.status().is_success() {
            return Err(Error::http_status(url, response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(url, &e))?;
        let status = serde_json::from_str::<StatusResponse>(&body)?.into_status(handle);

        tracing::debug!(request_id = %handle, code = ?status.code, "status checked");
        self.emit(Event::StatusChecked {
            handle: handle.clone(),
            code: status.code,
        });

        Ok(status)
    }

    /// Check several requests and log a readable line for each
    ///
    /// Stops at the first transport failure.
    pub async fn check_request(&self, handles: &[ExportHandle]) -> Result<Vec<ExportStatus>> {
        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            let status = self.check_status(handle).await?;
            log_status(&status);
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Poll until every request is staged, downloading each as it becomes ready
    ///
    /// Every handle still in the working set is checked once per pass. Ready
    /// exports are retrieved into `tracker` straight away; failed exports and
    /// failed retrievals are dropped with a warning; pending ones and failed
    /// lookups stay for the next pass. The loop sleeps `poll_interval` only
    /// after a full pass that left something pending.
    ///
    /// Returns once the working set is empty, or with
    /// [`Error::PollLimitExceeded`] after `max_poll_passes` passes. Transfers
    /// may still be running when this returns; use [`ProgressTracker::wait`].
    pub async fn wait_for_ready(
        &self,
        handles: &[ExportHandle],
        options: &GetOptions,
        tracker: &ProgressTracker,
    ) -> Result<()> {
        let transfers = self.transfer_manager(options)?;
        self.wait_for_ready_with(handles, options, tracker, &transfers)
            .await
    }

    pub(crate) async fn wait_for_ready_with(
        &self,
        handles: &[ExportHandle],
        options: &GetOptions,
        tracker: &ProgressTracker,
        transfers: &TransferManager,
    ) -> Result<()> {
        let poll_interval = self.poll_interval_for(options)?;
        let download_dir = self.download_dir_for(options);
        let mut pending: Vec<ExportHandle> = handles.to_vec();
        let mut passes: u32 = 0;

        while !pending.is_empty() {
            let mut still_pending = Vec::with_capacity(pending.len());

            for handle in pending {
                let status = match self.check_status(&handle).await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!(request_id = %handle, error = %e, "status check failed, will retry next pass");
                        still_pending.push(handle);
                        continue;
                    }
                };

                if options.progress {
                    log_status(&status);
                }

                match status.code {
                    StatusCode::Ready => {
                        if let Err(e) = self
                            .retrieve_ready(&status, &download_dir, options, tracker, transfers)
                            .await
                        {
                            tracing::warn!(
                                request_id = %handle,
                                error = %e,
                                "could not retrieve staged files, no longer waiting for it"
                            );
                        }
                    }
                    StatusCode::Pending => still_pending.push(handle),
                    StatusCode::Error(code) => {
                        tracing::warn!(
                            request_id = %handle,
                            status = code,
                            error = status.error.as_deref().unwrap_or(""),
                            "export failed, no longer waiting for it"
                        );
                    }
                }
            }

            pending = still_pending;
            passes += 1;

            if pending.is_empty() {
                break;
            }
            if let Some(limit) = self.config.max_poll_passes
                && passes >= limit
            {
                tracing::warn!(
                    passes,
                    pending = pending.len(),
                    "poll limit reached with requests still pending"
                );
                return Err(Error::PollLimitExceeded { passes, pending });
            }

            tracing::debug!(
                pending = pending.len(),
                sleep_secs = poll_interval.as_secs_f64(),
                "requests not ready, sleeping"
            );
            tokio::time::sleep(poll_interval).await;
        }

        tracing::info!(passes, "all export requests resolved");
        Ok(())
    }
}

/// Log the human-readable status line
pub(crate) fn log_status(status: &ExportStatus) {
    match status.code {
        StatusCode::Error(_) => tracing::warn!(request_id = %status.handle, "{}", status.describe()),
        _ => tracing::info!(request_id = %status.handle, "{}", status.describe()),
    }
}
