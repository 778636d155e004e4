use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ClientLifecycleState;

/// Broad error category used for retry decisions and caller handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Credentials rejected by the server.
    Auth,
    /// Transient network or transport failure, including garbled gateway responses.
    Network,
    /// Rate-limited by the server.
    RateLimited,
    /// Application error reported by the server that is not an auth rejection.
    Remote,
    /// Serialization/deserialization failure of a well-formed response.
    Serialization,
    /// Internal client bug or invariant break.
    Internal,
}

/// Stable error payload shared by the core, the adapters and their callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct BackendError {
    /// High-level error category.
    pub category: BackendErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message, usually the one reported by the server.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl BackendError {
    /// Construct a new backend error.
    pub fn new(
        category: BackendErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ClientLifecycleState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            BackendErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while client is in state {current:?}"),
        )
    }

    /// Error returned by operations that need an authenticated session.
    pub fn not_authenticated(action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            BackendErrorCategory::Internal,
            "not_authenticated",
            format!("'{action}' requires a logged-in session"),
        )
    }

    /// Whether a retry loop may try the failed operation again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category,
            BackendErrorCategory::Network | BackendErrorCategory::RateLimited
        )
    }
}

/// Map HTTP status codes to backend error categories.
///
/// Used for responses whose body could not be interpreted; application
/// errors with a JSON body are classified by the adapter instead.
pub fn classify_http_status(status: u16) -> BackendErrorCategory {
    match status {
        401 | 403 => BackendErrorCategory::Auth,
        408 | 429 => BackendErrorCategory::RateLimited,
        400..=499 => BackendErrorCategory::Config,
        500..=599 => BackendErrorCategory::Network,
        _ => BackendErrorCategory::Internal,
    }
}
