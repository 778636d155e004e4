//! Core of a resilient chat session client.
//!
//! This crate owns the session caches, login and push-stream retry logic, the
//! receiver loop and message normalization. Server access goes through the
//! [`ChatApi`] and [`StreamTransport`] traits so adapters can live elsewhere.

/// Server-facing traits implemented by backend adapters.
pub mod api;
/// Login with transient-failure retry.
pub mod auth;
/// Bounded normalized message buffer.
pub mod channel;
/// Client facade tying login, streaming and commands together.
pub mod client;
mod commands;
/// Stable backend error types and HTTP classification helpers.
pub mod error;
/// Frame normalization with on-miss cache refresh.
pub mod normalization;
mod receiver;
/// Backoff policy used by retry loops.
pub mod retry;
/// Cached identity, channels and users for one session.
pub mod session;
/// Client lifecycle state machine.
pub mod state_machine;
/// Push-stream address and connect retry.
pub mod stream;
/// Wire and domain types.
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{ChatApi, FrameSource, StreamTransport};
pub use auth::{Authenticator, LoginOutcome};
pub use channel::{BackendChannelError, DEFAULT_MESSAGE_BUFFER, MessageSender, MessageStream};
pub use client::{ChatClient, ClientOptions};
pub use error::{BackendError, BackendErrorCategory, classify_http_status};
pub use normalization::normalize_frame;
pub use retry::{Backoff, BackoffPolicy, RetryConfig, RetryLimit, RetryOn, retry_with_backoff};
pub use session::{ChannelSnapshot, Session};
pub use state_machine::ClientStateMachine;
pub use stream::{STREAM_PATH, StreamConnector, stream_url};
pub use types::{
    AuthSession, Channel, ChannelList, ClientLifecycleState, Credentials, Frame,
    NormalizedMessage, Post, PostList, Team, User, null_as_default,
};
