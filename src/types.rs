//! Core types and events for jsoc-dl

use crate::time::TimeRange;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier the archive issues for one accepted export request
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportHandle(String);

impl ExportHandle {
    /// Wrap a request id string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The request id as sent to the archive
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExportHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExportHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ExportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Staging state of an export request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    /// Files are staged and can be downloaded
    Ready,
    /// The archive is still preparing the files
    Pending,
    /// The archive reported a failure (raw code kept for diagnostics)
    Error(i64),
}

impl StatusCode {
    /// Convert the archive's integer status to a StatusCode
    pub fn from_i64(code: i64) -> Self {
        match code {
            0 => StatusCode::Ready,
            1 => StatusCode::Pending,
            other => StatusCode::Error(other),
        }
    }

    /// Convert StatusCode back to the archive's integer status
    pub fn to_i64(&self) -> i64 {
        match self {
            StatusCode::Ready => 0,
            StatusCode::Pending => 1,
            StatusCode::Error(code) => *code,
        }
    }

    /// True once polling this request again cannot change the outcome
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusCode::Pending)
    }
}

/// One file produced by a staged export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    /// File name inside the export directory
    pub filename: String,
    /// Export directory on the archive's web server
    pub remote_dir: String,
    /// File size, when the archive lists it
    pub size_bytes: Option<u64>,
}

/// Result of one status lookup
///
/// Produced fresh on every poll; never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportStatus {
    /// Request the status belongs to
    pub handle: ExportHandle,
    /// Staging state
    pub code: StatusCode,
    /// Seconds since submission, reported while pending
    pub wait_seconds: Option<u64>,
    /// Archive error message, reported on failure
    pub error: Option<String>,
    /// Time the export finished staging
    pub export_time: Option<String>,
    /// Export directory on the archive's web server
    pub dir: Option<String>,
    /// Aggregate export size in megabytes
    pub size_mb: Option<f64>,
    /// Files in the export, in archive order
    pub files: Vec<ExportFile>,
}

impl ExportStatus {
    /// True when the export can be downloaded
    pub fn is_ready(&self) -> bool {
        self.code == StatusCode::Ready
    }

    /// Human-readable one-line description of the status
    pub fn describe(&self) -> String {
        match self.code {
            StatusCode::Ready => format!(
                "Request {} was exported at {} and is ready to download.",
                self.handle,
                self.export_time.as_deref().unwrap_or("an unknown time")
            ),
            StatusCode::Pending => format!(
                "Request {} was submitted {} seconds ago, it is not ready to download.",
                self.handle,
                self.wait_seconds
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "an unknown number of".to_string())
            ),
            StatusCode::Error(code) => format!(
                "Request {} returned status: {} with error: {}",
                self.handle,
                code,
                self.error.as_deref().unwrap_or("none given")
            ),
        }
    }
}

/// A handle together with the time window it was accepted for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedExport {
    /// Request id issued by the archive
    pub handle: ExportHandle,
    /// Leaf window (in TAI) the request covers
    pub window: TimeRange,
}

/// One file transfer: remote URL to local destination
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Source URL
    pub url: String,
    /// Destination file path
    pub destination: PathBuf,
}

/// Identity of a task registered with a [`ProgressTracker`](crate::ProgressTracker)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a registered task finished
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TaskOutcome {
    /// File was written to disk
    Downloaded {
        /// Final file path
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// Transfer gave up
    Failed {
        /// Last error message
        error: String,
    },
}

/// Event emitted during the export lifecycle
///
/// Subscribe with [`JsocClient::subscribe`](crate::JsocClient::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The archive accepted an export request
    RequestSubmitted {
        /// Issued request id
        handle: ExportHandle,
        /// Window the request covers
        window: String,
    },

    /// A request exceeded the size limit and was bisected
    RequestSplit {
        /// Window that was too large
        window: String,
    },

    /// A request was dropped (archive rejection or sub-request transport failure)
    RequestRejected {
        /// Window that was dropped
        window: String,
        /// Archive status code, if the archive answered
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<i64>,
        /// Reason
        error: String,
    },

    /// A status lookup completed
    StatusChecked {
        /// Request id
        handle: ExportHandle,
        /// Observed staging state
        code: StatusCode,
    },

    /// Files of a ready export were enumerated
    FilesFound {
        /// Request id
        handle: ExportHandle,
        /// Number of files that will be downloaded
        count: usize,
        /// Aggregate export size in megabytes
        #[serde(skip_serializing_if = "Option::is_none")]
        size_mb: Option<f64>,
    },

    /// A file transfer acquired a connection slot
    DownloadStarted {
        /// Tracker task id
        id: TaskId,
        /// Source URL
        url: String,
    },

    /// A file transfer finished
    DownloadComplete {
        /// Tracker task id
        id: TaskId,
        /// Final file path
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// A file transfer gave up
    DownloadFailed {
        /// Tracker task id
        id: TaskId,
        /// Source URL
        url: String,
        /// Last error message
        error: String,
    },
}
