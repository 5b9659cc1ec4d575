//! Failure taxonomy for usage fetches.

use thiserror::Error;

/// Error type for fetch coordinator and upstream operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No session credential could be resolved
    #[error("no session credential configured")]
    CredentialMissing,

    /// Upstream answered with a non-success HTTP status
    #[error("{endpoint} API returned {status}")]
    UpstreamStatus {
        endpoint: &'static str,
        status: u16,
    },

    /// Upstream did not answer within the configured timeout
    #[error("request timeout - upstream API is slow")]
    UpstreamTimeout,

    /// Upstream body was not the expected JSON
    #[error("failed to parse upstream response: {0}")]
    UpstreamParse(String),

    /// Upstream returned an explicit error envelope
    #[error("upstream API error: {0}")]
    UpstreamApi(String),

    /// Connection-level failure (DNS, TLS, reset)
    #[error("network error: {0}")]
    Transport(String),

    /// The organization list was empty
    #[error("no organization found")]
    NoOrganizationFound,

    /// Another caller's fetch is still running and nothing is cached yet
    #[error("fetch in progress")]
    FetchInProgress,

    /// The fetch task panicked or was aborted
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    /// Whether this failure means the credential is missing or rejected
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            FetchError::CredentialMissing
                | FetchError::UpstreamStatus {
                    status: 401 | 403,
                    ..
                }
        )
    }

    /// Whether this failure is an upstream timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::UpstreamTimeout)
    }

    /// HTTP status reported for this failure: 401 auth, 408 timeout, else 500
    pub fn http_status(&self) -> u16 {
        if self.is_auth_failure() {
            401
        } else if self.is_timeout() {
            408
        } else {
            500
        }
    }
}
