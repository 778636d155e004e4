//! Mattermost adapter for `backend-core`.
//!
//! [`MattermostApi`] speaks the v1 REST API and [`WebSocketTransport`] opens
//! the push stream. [`build_client`] wires both into a [`ChatClient`].

use std::sync::Arc;

use backend_core::{BackendError, ChatClient, ClientOptions, Credentials};

mod error;
mod rest;
mod websocket;

pub use error::AppError;
pub use rest::{API_PATH, MattermostApi, TOKEN_HEADER};
pub use websocket::{WebSocketFrames, WebSocketTransport};

/// Build a client talking to the server named in `credentials`.
pub fn build_client(
    credentials: Credentials,
    options: ClientOptions,
) -> Result<ChatClient, BackendError> {
    let api = Arc::new(MattermostApi::new(&credentials)?);
    ChatClient::new(credentials, api, Arc::new(WebSocketTransport), options)
}
