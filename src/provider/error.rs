use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryAction;

/// Flickr error codes that mean the access token is no longer usable.
const AUTH_REJECTION_CODES: &[u32] = &[96, 97, 98, 99];

/// Flickr error codes for temporary service-side unavailability.
const TRANSIENT_CODES: &[u32] = &[0, 105, 106];

/// Errors from provider REST calls, classified for retry and re-auth
/// decisions.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status} calling {method}")]
    HttpStatus {
        status: u16,
        method: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{method} failed with provider code {code}: {message}")]
    Provider {
        method: String,
        code: u32,
        message: String,
    },

    #[error("Transport error calling {method}: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed response from {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl ApiError {
    /// Whether the same request is worth repeating after a pause.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ApiError::Provider { code, .. } => TRANSIENT_CODES.contains(code),
            ApiError::Transport { .. } => true,
            ApiError::Decode { .. } | ApiError::OAuth(_) => false,
        }
    }

    /// Explicit throttle signal from the provider.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::HttpStatus { status: 429, .. })
    }

    /// The provider refused the credential itself.
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            ApiError::HttpStatus { status, .. } => *status == 401,
            ApiError::Provider { code, .. } => AUTH_REJECTION_CODES.contains(code),
            _ => false,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::HttpStatus {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Backoff decision for listing, detail and validation calls. A 429
    /// with `Retry-After` waits as long as the provider asked.
    pub fn retry_action(&self) -> RetryAction {
        if !self.is_transient() {
            return RetryAction::Abort;
        }
        match self.retry_after_secs() {
            Some(secs) if self.is_rate_limited() => {
                RetryAction::RetryAfter(Duration::from_secs(secs))
            }
            _ => RetryAction::Retry,
        }
    }
}
