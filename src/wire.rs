//! JSON bodies returned by the `jsoc_fetch` endpoint
//!
//! JSOC is inconsistent about number encoding: `status` arrives as either a
//! JSON number or a numeric string, `wait` and `size` sometimes as floats.
//! The deserializers here accept all of those.

use crate::types::{ExportFile, ExportHandle, ExportStatus, StatusCode};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Archive status for an accepted export request
pub(crate) const REQUEST_ACCEPTED: i64 = 2;

/// Archive status used for oversized requests (and other request errors)
pub(crate) const REQUEST_TOO_LARGE: i64 = 3;

/// Prefix of the error JSOC returns when a request exceeds its byte limit
///
/// The full message is "Request exceeds max byte limit of 100000MB".
pub(crate) const SIZE_LIMIT_ERROR_PREFIX: &str = "Request exceeds max byte limit";

/// Body of an `exp_request` response
#[derive(Debug, Deserialize)]
pub(crate) struct RequestResponse {
    #[serde(deserialize_with = "status_code")]
    pub(crate) status: i64,
    #[serde(default)]
    pub(crate) requestid: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

/// Body of an `exp_status` response
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    #[serde(deserialize_with = "status_code")]
    pub(crate) status: i64,
    #[serde(default)]
    pub(crate) requestid: Option<String>,
    #[serde(default, deserialize_with = "optional_u64")]
    pub(crate) wait: Option<u64>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) exptime: Option<String>,
    #[serde(default)]
    pub(crate) dir: Option<String>,
    #[serde(default, deserialize_with = "optional_f64")]
    pub(crate) size: Option<f64>,
    #[serde(default)]
    pub(crate) data: Option<Vec<StatusFile>>,
}

/// One entry of the `data` list in an `exp_status` response
#[derive(Debug, Deserialize)]
pub(crate) struct StatusFile {
    pub(crate) filename: String,
    #[serde(default, deserialize_with = "optional_u64")]
    pub(crate) size: Option<u64>,
}

impl StatusResponse {
    /// Convert into the public status type
    ///
    /// `handle` is the id that was queried; it wins over the echoed
    /// `requestid` so callers always get back what they asked about.
    pub(crate) fn into_status(self, handle: &ExportHandle) -> ExportStatus {
        let remote_dir = self.dir.clone().unwrap_or_default();
        let files = self
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|f| ExportFile {
                filename: f.filename,
                remote_dir: remote_dir.clone(),
                size_bytes: f.size,
            })
            .collect();

        if let Some(echoed) = self.requestid.as_deref()
            && echoed != handle.as_str()
        {
            tracing::debug!(request_id = %handle, echoed, "archive echoed a different request id");
        }

        ExportStatus {
            handle: handle.clone(),
            code: StatusCode::from_i64(self.status),
            wait_seconds: self.wait,
            error: self.error.filter(|e| !e.is_empty()),
            export_time: self.exptime,
            dir: self.dir,
            size_mb: self.size,
            files,
        }
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn status_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_as_i64(&value)
        .ok_or_else(|| D::Error::custom(format!("expected integer status, got {}", value)))
}

fn optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_f64(&value)
        .filter(|v| *v >= 0.0)
        .map(|v| v as u64))
}

fn optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_f64(&value))
}
