//! Retry logic with exponential backoff
//!
//! Used for individual file transfers only. Export submission and status
//! lookups surface transport failures immediately.
//!
//! ```no_run
//! use jsoc_dl::RetryConfig;
//! use jsoc_dl::retry::download_with_retry;
//!
//! # async fn example() -> jsoc_dl::Result<()> {
//! let client = reqwest::Client::new();
//! let http = &client;
//! let url = "http://jsoc.stanford.edu/SUM1/D1/S00000/a.fits";
//! let body = download_with_retry(&RetryConfig::default(), || async move {
//!     let response = http.get(url).send().await.map_err(|e| jsoc_dl::Error::Transport {
//!         url: url.to_string(),
//!         status: e.status().map(|s| s.as_u16()),
//!         message: e.to_string(),
//!     })?;
//!     Ok::<_, jsoc_dl::Error>(response.bytes().await.unwrap_or_default())
//! })
//! .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection reset, server busy, gateway errors) should return `true`.
/// Permanent failures (missing file, bad option, disk errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // No response at all: connection refused, reset, timed out
            Error::Transport { status: None, .. } => true,
            // Server-side trouble and throttling are worth another try
            Error::Transport {
                status: Some(code), ..
            } => *code >= 500 || *code == 408 || *code == 429,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::InvalidOption { .. }
            | Error::InvalidTimeRange { .. }
            | Error::InvalidTime(_)
            | Error::PollLimitExceeded { .. }
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::Url(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts
///
/// Up to `max_attempts` retries follow the first try. The delay before each
/// retry starts at `initial_delay`, grows by `backoff_multiplier` and is
/// capped at `max_delay`. The last error is returned unchanged.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut backoff = config.initial_delay;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(retries, "transfer recovered");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() || retries >= config.max_attempts {
            tracing::debug!(
                error = %error,
                retries,
                retryable = error.is_retryable(),
                "giving up"
            );
            return Err(error);
        }

        retries += 1;
        let pause = if config.jitter {
            jittered(backoff)
        } else {
            backoff
        };
        tracing::warn!(
            error = %error,
            retry = retries,
            of = config.max_attempts,
            pause_ms = pause.as_millis() as u64,
            "transient failure"
        );
        tokio::time::sleep(pause).await;

        backoff = backoff
            .mul_f64(config.backoff_multiplier)
            .min(config.max_delay);
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(1.0 + rand::thread_rng().gen_range(0.0..=1.0))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn transport(status: Option<u16>) -> Error {
        Error::Transport {
            url: "http://jsoc.example/file.fits".to_string(),
            status,
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn success_needs_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gateway_errors_are_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(transport(Some(502)))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u64, _>(transport(None))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u64, _>(transport(Some(404)))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classification() {
        assert!(transport(None).is_retryable());
        assert!(transport(Some(503)).is_retryable());
        assert!(transport(Some(429)).is_retryable());
        assert!(!transport(Some(403)).is_retryable());
        assert!(
            !Error::invalid_option("wavelength", "not supported").is_retryable(),
            "caller mistakes never heal on retry"
        );
        assert!(
            Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_retryable()
        );
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).is_retryable());
    }

    #[test]
    fn jitter_stays_within_double() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let pause = jittered(base);
            assert!(pause >= base && pause <= base * 2);
        }
    }
}
