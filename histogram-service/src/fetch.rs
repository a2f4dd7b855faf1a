use crate::config::PlotsConfig;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use thiserror::Error;

/// A histogram read from a stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedHistogram {
    /// Name of the stored object
    pub name: String,

    /// Histogram class, e.g. `TH1F`
    pub class_name: String,

    /// Histogram serialized to JSON
    pub payload: String,
}

/// Failure to read one histogram
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The object path resolved to an unreadable object
    #[error("Zombie object {object_path} in {location}")]
    Zombie {
        location: String,
        object_path: String,
    },

    #[error("Object {object_path} not found in {location}")]
    NotFound {
        location: String,
        object_path: String,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout { .. })
    }
}

/// Reads one histogram out of a stored file.
///
/// Implementations decode the file format; blocking readers should move their
/// work onto `tokio::task::spawn_blocking`.
#[async_trait]
pub trait HistogramFetcher: Send + Sync {
    async fn fetch(
        &self,
        location: &str,
        object_path: &str,
    ) -> Result<FetchedHistogram, FetchError>;
}

/// Timeout and retry budget of a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl FetchPolicy {
    pub fn from_config(config: &PlotsConfig) -> Self {
        Self {
            timeout: config.fetch_timeout(),
            retries: config.fetch_retries,
        }
    }
}

/// Fetch under `policy`: every attempt is bounded by the timeout, and transient
/// failures are retried up to `policy.retries` more times.
pub async fn fetch_with_policy(
    fetcher: &dyn HistogramFetcher,
    location: &str,
    object_path: &str,
    policy: &FetchPolicy,
) -> Result<FetchedHistogram, FetchError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, fetcher.fetch(location, object_path))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                timeout_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match result {
            Err(e) if e.is_transient() && attempt < policy.retries => {
                attempt += 1;
                debug!("Retrying {object_path} in {location} (attempt {attempt}): {e}");
            }
            other => return other,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use static_fetcher::StaticFetcher;

#[cfg(any(test, feature = "test-support"))]
mod static_fetcher {
    use super::{FetchError, FetchedHistogram, HistogramFetcher};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory fetcher keyed by `(location, object_path)`.
    ///
    /// Missing keys answer `NotFound`. Counts calls, and can fail the first
    /// `transient_failures` calls with an I/O error.
    #[derive(Debug, Default)]
    pub struct StaticFetcher {
        entries: HashMap<(String, String), Result<FetchedHistogram, FetchError>>,
        delay: Option<Duration>,
        transient_failures: AtomicU32,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(
            &mut self,
            location: impl Into<String>,
            object_path: impl Into<String>,
            result: Result<FetchedHistogram, FetchError>,
        ) {
            self.entries
                .insert((location.into(), object_path.into()), result);
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn with_transient_failures(self, failures: u32) -> Self {
            self.transient_failures.store(failures, Ordering::SeqCst);
            self
        }

        /// Number of `fetch` calls so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistogramFetcher for StaticFetcher {
        async fn fetch(
            &self,
            location: &str,
            object_path: &str,
        ) -> Result<FetchedHistogram, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let failing = self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(FetchError::Io("transient failure".to_string()));
            }

            self.entries
                .get(&(location.to_string(), object_path.to_string()))
                .cloned()
                .unwrap_or_else(|| {
                    Err(FetchError::NotFound {
                        location: location.to_string(),
                        object_path: object_path.to_string(),
                    })
                })
        }
    }
}
