use backend_core::{BackendError, BackendErrorCategory, classify_http_status};
use serde::Deserialize;
use tokio_tungstenite::tungstenite;

/// Error body the server attaches to failed API calls.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppError {
    pub id: String,
    pub message: String,
    pub detailed_error: String,
    pub request_id: String,
    pub status_code: u16,
}

/// Interpret the body of a non-success response.
///
/// A JSON app error is classified by status; anything else (a proxy or
/// gateway page, an empty body) is treated as a transient garbled response.
pub(crate) fn map_error_body(status: u16, body: &[u8]) -> BackendError {
    match serde_json::from_slice::<AppError>(body) {
        Ok(app) if !app.message.is_empty() => map_app_error(status, app),
        Ok(_) => unexpected_response(status, "error response without message"),
        Err(err) => unexpected_response(status, err),
    }
}

/// Only the server's message is kept; the detailed error stays in the logs.
pub(crate) fn map_app_error(status: u16, app: AppError) -> BackendError {
    let status = if app.status_code != 0 {
        app.status_code
    } else {
        status
    };
    let category = match status {
        401 | 403 => BackendErrorCategory::Auth,
        429 => BackendErrorCategory::RateLimited,
        _ => BackendErrorCategory::Remote,
    };
    if !app.detailed_error.is_empty() {
        tracing::debug!(
            id = %app.id,
            request_id = %app.request_id,
            detail = %app.detailed_error,
            "server app error"
        );
    }
    let code = if app.id.is_empty() {
        "app_error".to_owned()
    } else {
        app.id
    };
    BackendError::new(category, code, app.message)
}

pub(crate) fn unexpected_response(status: u16, detail: impl std::fmt::Display) -> BackendError {
    let category = match classify_http_status(status) {
        BackendErrorCategory::Auth => BackendErrorCategory::Auth,
        BackendErrorCategory::RateLimited => BackendErrorCategory::RateLimited,
        _ => BackendErrorCategory::Network,
    };
    BackendError::new(
        category,
        "unexpected_response",
        format!("unexpected response (HTTP {status}): {detail}"),
    )
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_builder() {
        return BackendError::new(
            BackendErrorCategory::Config,
            "invalid_request",
            err.to_string(),
        );
    }
    if err.is_decode() {
        let status = err.status().map_or(200, |status| status.as_u16());
        return unexpected_response(status, err);
    }
    let code = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection_failed"
    } else {
        "http_error"
    };
    BackendError::new(BackendErrorCategory::Network, code, err.to_string())
}

pub(crate) fn map_ws_error(err: tungstenite::Error) -> BackendError {
    use tungstenite::Error;

    match err {
        Error::Http(response) => {
            let status = response.status().as_u16();
            let body = response.body().as_deref().unwrap_or_default();
            map_error_body(status, body)
        }
        Error::Url(_) | Error::HttpFormat(_) => BackendError::new(
            BackendErrorCategory::Config,
            "invalid_stream_request",
            err.to_string(),
        ),
        Error::ConnectionClosed | Error::AlreadyClosed => BackendError::new(
            BackendErrorCategory::Network,
            "stream_closed",
            err.to_string(),
        ),
        _ => BackendError::new(
            BackendErrorCategory::Network,
            "stream_error",
            err.to_string(),
        ),
    }
}
