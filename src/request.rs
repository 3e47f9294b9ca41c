//! Export request payload construction
//!
//! Turns a time range, a series name and [`ExportOptions`] into the form
//! fields JSOC's `exp_request` operation expects.

use crate::error::{Error, Result};
use crate::time::TimeRange;
use std::collections::BTreeMap;

/// Series prefix of the only instrument whose series carry a wavelength axis
const WAVELENGTH_SERIES_PREFIX: &str = "aia";

/// Protocol string for Rice-compressed FITS
const FITS_RICE_PROTOCOL: &str = "FITS,compress Rice";

/// Protocol string for uncompressed FITS
const FITS_UNCOMPRESSED_PROTOCOL: &str = "FITS, **NONE**";

/// Wavelength selection for a dataset string
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wavelength {
    /// One wavelength, e.g. `[304]`
    Single(u32),
    /// Several wavelengths, e.g. `[171, 304]`
    List(Vec<u32>),
}

impl Wavelength {
    fn to_dataset_filter(&self) -> String {
        match self {
            Wavelength::Single(w) => format!("[{}]", w),
            Wavelength::List(ws) => {
                let joined = ws
                    .iter()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{}]", joined)
            }
        }
    }
}

impl From<u32> for Wavelength {
    fn from(w: u32) -> Self {
        Wavelength::Single(w)
    }
}

impl From<Vec<u32>> for Wavelength {
    fn from(ws: Vec<u32>) -> Self {
        Wavelength::List(ws)
    }
}

/// Options for one export request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    /// Export protocol (default: "FITS")
    pub protocol: String,
    /// Compression, only meaningful for FITS (default: "rice")
    pub compression: Option<String>,
    /// Wavelength filter, only for AIA series
    pub wavelength: Option<Wavelength>,
    /// Segment name (e.g., "image"); empty selects all segments
    pub segment: String,
    /// Address JSOC should notify (default: empty)
    pub notify: String,
    /// Raw form fields merged last; these override computed values
    pub extra: BTreeMap<String, String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            protocol: "FITS".to_string(),
            compression: Some("rice".to_string()),
            wavelength: None,
            segment: String::new(),
            notify: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl ExportOptions {
    /// Set the wavelength filter
    pub fn wavelength(mut self, wavelength: impl Into<Wavelength>) -> Self {
        self.wavelength = Some(wavelength.into());
        self
    }

    /// Set the segment
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = segment.into();
        self
    }

    /// Set the export protocol
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set or clear compression
    pub fn compression(mut self, compression: Option<&str>) -> Self {
        self.compression = compression.map(str::to_string);
        self
    }

    /// Set the notification address
    pub fn notify(mut self, notify: impl Into<String>) -> Self {
        self.notify = notify.into();
        self
    }

    /// Add a raw form field
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// One resolved query block: what to export, over which window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportQuery {
    /// Time window (UTC or TAI)
    pub range: TimeRange,
    /// Series name, e.g. "hmi.m_45s"
    pub series: String,
    /// Request options
    pub options: ExportOptions,
}

impl ExportQuery {
    /// Query with default options
    pub fn new(range: TimeRange, series: impl Into<String>) -> Self {
        Self {
            range,
            series: series.into(),
            options: ExportOptions::default(),
        }
    }

    /// Replace the options
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }
}

/// Compound protocol string for the `protocol` form field
fn export_protocol(protocol: &str, compression: Option<&str>) -> String {
    if protocol.eq_ignore_ascii_case("FITS") {
        match compression {
            Some(c) if c.eq_ignore_ascii_case("rice") => FITS_RICE_PROTOCOL.to_string(),
            _ => FITS_UNCOMPRESSED_PROTOCOL.to_string(),
        }
    } else {
        protocol.to_string()
    }
}

/// Dataset descriptor: `series[start-end]{wavelength}{segment}`
pub fn dataset_string(range: &TimeRange, series: &str, options: &ExportOptions) -> Result<String> {
    let wavelength = match &options.wavelength {
        Some(w) if !series.starts_with(WAVELENGTH_SERIES_PREFIX) => {
            return Err(Error::invalid_option(
                "wavelength",
                format!(
                    "series '{}' does not support the wavelength attribute ({:?})",
                    series, w
                ),
            ));
        }
        Some(w) => w.to_dataset_filter(),
        None => String::new(),
    };

    let segment = if options.segment.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", options.segment)
    };

    Ok(format!(
        "{}[{}]{}{}",
        series,
        range.to_jsoc_interval(),
        wavelength,
        segment
    ))
}

/// Build the `exp_request` form payload
///
/// Fails with [`Error::InvalidOption`] when a wavelength is given for a
/// series that has none. No network access happens here.
pub fn build_payload(
    range: &TimeRange,
    series: &str,
    options: &ExportOptions,
) -> Result<BTreeMap<String, String>> {
    let dataset = dataset_string(range, series, options)?;

    let mut payload = BTreeMap::new();
    payload.insert("ds".to_string(), dataset);
    payload.insert("format".to_string(), "json".to_string());
    payload.insert("method".to_string(), "url".to_string());
    payload.insert("notify".to_string(), options.notify.clone());
    payload.insert("op".to_string(), "exp_request".to_string());
    payload.insert("process".to_string(), "n=0|no_op".to_string());
    payload.insert(
        "protocol".to_string(),
        export_protocol(&options.protocol, options.compression.as_deref()),
    );
    payload.insert("requestor".to_string(), "none".to_string());
    payload.insert(
        "filenamefmt".to_string(),
        format!("{}.{{T_REC:A}}.{{CAMERA}}.{{segment}}", series),
    );

    for (key, value) in &options.extra {
        payload.insert(key.clone(), value.clone());
    }

    Ok(payload)
}
