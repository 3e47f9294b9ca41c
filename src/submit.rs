//! Export submission with size-limit bisection
//!
//! JSOC refuses requests whose combined size exceeds its byte limit. When
//! that happens the window is split at its midpoint and both halves are
//! submitted independently, until every leaf window is accepted or cannot be
//! halved any further.

use crate::client::JsocClient;
use crate::error::{Error, Result};
use crate::request::{self, ExportOptions, ExportQuery};
use crate::time::TimeRange;
use crate::types::{AcceptedExport, Event, ExportHandle};
use crate::wire::{REQUEST_ACCEPTED, REQUEST_TOO_LARGE, RequestResponse, SIZE_LIMIT_ERROR_PREFIX};
use std::collections::BTreeMap;

/// Windows shorter than this many seconds are not split further
///
/// Dataset strings carry one-second resolution, so halves of a shorter
/// window would name the same records.
pub const MIN_SPLIT_SECONDS: i64 = 2;

/// How the archive answered one export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubmitOutcome {
    /// Request accepted and staged under this handle
    Accepted(ExportHandle),
    /// Request too large; split and resubmit
    SizeLimitExceeded,
    /// Any other archive-level failure
    Rejected {
        /// Raw archive status
        status: i64,
        /// Archive error message
        error: String,
    },
}

impl SubmitOutcome {
    /// Classify an `exp_request` response body
    pub(crate) fn classify(response: RequestResponse) -> Self {
        let error = response.error.unwrap_or_default();
        match response.status {
            REQUEST_ACCEPTED => match response.requestid {
                Some(id) if !id.is_empty() => SubmitOutcome::Accepted(ExportHandle::new(id)),
                _ => SubmitOutcome::Rejected {
                    status: REQUEST_ACCEPTED,
                    error: "request accepted without a request id".to_string(),
                },
            },
            REQUEST_TOO_LARGE if error.starts_with(SIZE_LIMIT_ERROR_PREFIX) => {
                SubmitOutcome::SizeLimitExceeded
            }
            status => SubmitOutcome::Rejected { status, error },
        }
    }
}

impl JsocClient {
    /// Submit an export request, splitting it as needed
    ///
    /// Returns one handle per accepted leaf window, in chronological order.
    /// Sub-requests the archive rejects are dropped with a warning.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOption`] before any network call for unsupported options
    /// - [`Error::Transport`] if the initial, undivided request fails in transit
    ///
    /// # Example
    ///
    /// ```no_run
    /// use jsoc_dl::{ClientConfig, ExportOptions, JsocClient, TimeRange};
    ///
    /// # async fn example() -> jsoc_dl::Result<()> {
    /// let client = JsocClient::new(ClientConfig::default())?;
    /// let range = TimeRange::parse("2010-01-01T00:00", "2010-01-01T01:00")?;
    /// let handles = client
    ///     .submit(&range, "hmi.m_45s", &ExportOptions::default())
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(
        &self,
        range: &TimeRange,
        series: &str,
        options: &ExportOptions,
    ) -> Result<Vec<ExportHandle>> {
        Ok(self
            .submit_windows(range, series, options)
            .await?
            .into_iter()
            .map(|accepted| accepted.handle)
            .collect())
    }

    /// Like [`submit`](Self::submit), but also reports the TAI window each handle covers
    pub async fn submit_windows(
        &self,
        range: &TimeRange,
        series: &str,
        options: &ExportOptions,
    ) -> Result<Vec<AcceptedExport>> {
        let root = range.to_tai();

        // Option errors must surface before anything goes over the wire
        request::build_payload(&root, series, options)?;

        let mut accepted = Vec::new();
        // Second half is pushed first so windows are visited in time order
        let mut stack = vec![root];
        let mut split = false;
        let min_split = chrono::Duration::seconds(MIN_SPLIT_SECONDS);

        while let Some(window) = stack.pop() {
            let interval = window.to_jsoc_interval();
            let payload = request::build_payload(&window, series, options)?;

            let response = match self.post_export_request(&payload).await {
                Ok(response) => response,
                Err(e) if split => {
                    tracing::warn!(window = %interval, error = %e, "sub-request failed, dropping window");
                    self.emit(Event::RequestRejected {
                        window: interval,
                        status: None,
                        error: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            match SubmitOutcome::classify(response) {
                SubmitOutcome::Accepted(handle) => {
                    tracing::info!(request_id = %handle, window = %interval, "export request accepted");
                    self.emit(Event::RequestSubmitted {
                        handle: handle.clone(),
                        window: interval,
                    });
                    accepted.push(AcceptedExport { handle, window });
                }
                SubmitOutcome::SizeLimitExceeded if window.duration() >= min_split => {
                    tracing::info!(window = %interval, "request exceeds size limit, splitting");
                    self.emit(Event::RequestSplit { window: interval });
                    let (first, second) = window.split();
                    stack.push(second);
                    stack.push(first);
                    split = true;
                }
                SubmitOutcome::SizeLimitExceeded => {
                    tracing::warn!(
                        window = %interval,
                        "request exceeds size limit but window cannot be split further"
                    );
                    self.emit(Event::RequestRejected {
                        window: interval,
                        status: Some(REQUEST_TOO_LARGE),
                        error: "size limit exceeded by an unsplittable window".to_string(),
                    });
                }
                SubmitOutcome::Rejected { status, error } => {
                    tracing::warn!(
                        window = %interval,
                        status,
                        error = %error,
                        "export request rejected by archive"
                    );
                    self.emit(Event::RequestRejected {
                        window: interval,
                        status: Some(status),
                        error,
                    });
                }
            }
        }

        tracing::debug!(series, accepted = accepted.len(), "submission finished");
        Ok(accepted)
    }

    /// Submit several independent query blocks and concatenate their handles
    ///
    /// Every block is validated before the first request is sent.
    pub async fn query(&self, queries: &[ExportQuery]) -> Result<Vec<ExportHandle>> {
        for query in queries {
            request::build_payload(&query.range, &query.series, &query.options)?;
        }

        let mut handles = Vec::new();
        for query in queries {
            handles.extend(
                self.submit(&query.range, &query.series, &query.options)
                    .await?,
            );
        }
        Ok(handles)
    }

    /// POST one `exp_request` and decode the body
    async fn post_export_request(
        &self,
        payload: &BTreeMap<String, String>,
    ) -> Result<RequestResponse> {
        let url = &self.config.export_url;
        tracing::debug!(ds = payload.get("ds").map(String::as_str), "POST exp_request");

        let response = self
            .http
            .post(url)
            .form(payload)
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
        Ok(serde_json::from_str(&body)?)
    }
}
