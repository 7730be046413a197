use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::cancel::CancelToken;
use crate::core::error::{InstallerError, InstallerResult};

pub const APP_USER_AGENT: &str = concat!("loader-installer/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(user_agent)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(15))
        .timeout(timeout)
        .build()
}

/// Upper bound on what a Content-Length header may pre-allocate.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

pub type ChunkStream = Pin<Box<dyn Stream<Item = InstallerResult<Vec<u8>>> + Send>>;

/// A successful response body, delivered in chunks.
pub struct HttpBody {
    pub content_length: Option<u64>,
    pub chunks: ChunkStream,
}

impl HttpBody {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self {
            content_length: Some(len),
            chunks: Box::pin(futures_util::stream::iter(vec![Ok(bytes)])),
        }
    }

    /// Drain the body into memory.
    pub async fn collect(mut self) -> InstallerResult<Vec<u8>> {
        let hint = self.content_length.unwrap_or(0).min(MAX_PREALLOC);
        let mut out = Vec::with_capacity(hint as usize);
        while let Some(chunk) = self.chunks.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

/// GET-only transport used by every network-facing component.
///
/// Non-success statuses must surface as [`InstallerError::DownloadFailed`]
/// so the retry layer can tell throttling from a missing file.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> InstallerResult<HttpBody>;
}

/// Production transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> InstallerResult<HttpBody> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(InstallerError::from));

        Ok(HttpBody {
            content_length,
            chunks: Box::pin(chunks),
        })
    }
}

/// Bounded exponential backoff shared by catalog requests and downloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 250,
        }
    }
}

/// Returned once every attempt has been spent (or a permanent error hit).
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub error: InstallerError,
}

impl RetryPolicy {
    /// No waiting between attempts. Handy for tests.
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Run `op` until it succeeds, fails permanently or the budget runs out.
    ///
    /// Cancellation is observed between attempts and during backoff sleeps;
    /// a cancelled run returns `InstallerError::Cancelled` as the error.
    pub async fn run<T, F, Fut, R>(
        &self,
        cancel: &CancelToken,
        mut on_retry: R,
        mut op: F,
    ) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = InstallerResult<T>>,
        R: FnMut(u32, Duration, &InstallerError),
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryExhausted {
                    attempts: attempt,
                    error: InstallerError::Cancelled,
                });
            }

            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            attempt += 1;

            if error.is_cancelled() || !error.is_transient() || attempt >= attempts {
                return Err(RetryExhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.delay_for(attempt - 1);
            warn!("Attempt {}/{} failed ({}), retrying in {:?}", attempt, attempts, error, delay);
            on_retry(attempt, delay, &error);

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        error: InstallerError::Cancelled,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn flaky(status: u16) -> InstallerError {
        InstallerError::DownloadFailed {
            url: "https://example.com/a".into(),
            status,
        }
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let value = policy
            .run(&CancelToken::new(), |_, _, _| {}, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(flaky(503))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let err = policy
            .run(&CancelToken::new(), |_, _, _| {}, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(flaky(500)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_stop_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let err = policy
            .run(&CancelToken::new(), |_, _, _| {}, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(flaky(404)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_calls_op() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = RetryPolicy::default()
            .run(&cancel, |_, _, _| {}, |_| async { Ok::<_, InstallerError>(()) })
            .await
            .unwrap_err();

        assert!(err.error.is_cancelled());
    }

    #[tokio::test]
    async fn collect_concatenates_chunks() {
        let body = HttpBody {
            content_length: None,
            chunks: Box::pin(futures_util::stream::iter(vec![
                Ok(b"ab".to_vec()),
                Ok(b"cd".to_vec()),
            ])),
        };
        assert_eq!(body.collect().await.unwrap(), b"abcd".to_vec());
    }

    #[tokio::test]
    async fn collect_ignores_absurd_content_length() {
        let body = HttpBody {
            content_length: Some(u64::MAX),
            chunks: Box::pin(futures_util::stream::iter(vec![Ok(b"ab".to_vec())])),
        };
        assert_eq!(body.collect().await.unwrap(), b"ab".to_vec());
    }
}
