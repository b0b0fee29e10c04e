//! Release retrieval over HTTP.
//!
//! Provides a trait-based abstraction for fetching a release asset so tests
//! can inject canned responses. The production [`HttpTransport`] uses `ureq`
//! and retries transient network failures according to an explicit
//! [`RetryPolicy`]. A received response is never retried, whatever its status:
//! classifying status codes belongs to [`crate::status`].

use crate::config::RetryPolicy;
use std::fmt;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

/// A received response: its status code and a live body stream.
///
/// Dropping the value releases the underlying connection.
pub struct Retrieval {
    /// HTTP status code (`0` when the response carried none).
    pub status: u16,
    /// Response body, read incrementally.
    pub body: Box<dyn Read>,
}

impl Retrieval {
    /// Wrap a status code and body stream.
    #[must_use]
    pub fn new(status: u16, body: impl Read + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for Retrieval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrieval")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Errors raised when no usable response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Every attempt failed with a transient network error.
    #[error("no response from {url} after {attempts} attempt(s): {reason}")]
    Exhausted {
        /// The URL that was requested.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        reason: String,
    },

    /// The request could not be issued at all.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },
}

/// Trait for retrieving a release asset.
///
/// # Examples
///
/// ```no_run
/// use cish_installer::config::RetryPolicy;
/// use cish_installer::transport::{HttpTransport, Transport};
/// use std::time::Duration;
///
/// let transport = HttpTransport::new(Duration::from_secs(30), RetryPolicy::default());
/// let retrieval = transport.fetch("https://example.com/cish")?;
/// println!("status {}", retrieval.status);
/// # Ok::<(), cish_installer::transport::TransportError>(())
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Issue a GET request for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained.
    fn fetch(&self, url: &str) -> Result<Retrieval, TransportError>;
}

/// HTTP transport backed by a `ureq` agent.
#[derive(Debug)]
pub struct HttpTransport {
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Create a transport with a global per-request `timeout`.
    ///
    /// Non-2xx responses are returned as ordinary responses rather than
    /// errors so the status stage can classify them.
    #[must_use]
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            retry,
        }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Retrieval, TransportError> {
        let response = with_retry(&self.retry, url, || self.agent.get(url).call())?;
        let status = response.status().as_u16();
        Ok(Retrieval::new(status, response.into_body().into_reader()))
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy is spent.
fn with_retry<T>(
    policy: &RetryPolicy,
    url: &str,
    mut attempt: impl FnMut() -> Result<T, ureq::Error>,
) -> Result<T, TransportError> {
    let max_attempts = policy.max_attempts();
    let mut made = 0;
    loop {
        made += 1;
        log::debug!("Downloading from {url} (attempt {made}/{max_attempts})");
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if !is_transient(&err) => {
                return Err(TransportError::Request {
                    url: url.to_owned(),
                    reason: err.to_string(),
                });
            }
            Err(err) if made >= max_attempts => {
                return Err(TransportError::Exhausted {
                    url: url.to_owned(),
                    attempts: made,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                let delay = policy.delay_after(made);
                log::warn!("attempt {made} for {url} failed: {err}; retrying in {delay:?}");
                std::thread::sleep(delay);
            }
        }
    }
}

/// Network faults that may clear up on a later attempt.
fn is_transient(err: &ureq::Error) -> bool {
    matches!(
        err,
        ureq::Error::Io(_)
            | ureq::Error::Timeout(_)
            | ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed
    )
}
