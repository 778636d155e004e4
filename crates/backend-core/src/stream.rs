use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::{
    api::{FrameSource, StreamTransport},
    error::{BackendError, BackendErrorCategory},
    retry::{Backoff, RetryConfig, RetryOn, retry_with_backoff},
    types::Credentials,
};

/// Path of the push endpoint on the server.
pub const STREAM_PATH: &str = "/api/v1/websocket";

/// `<ws|wss>://<server>/api/v1/websocket`.
pub fn stream_url(credentials: &Credentials) -> Result<Url, BackendError> {
    let raw = format!(
        "{}://{}{STREAM_PATH}",
        credentials.stream_scheme(),
        credentials.server
    );
    Url::parse(&raw).map_err(|err| {
        BackendError::new(
            BackendErrorCategory::Config,
            "invalid_server_address",
            format!("invalid server address '{}': {err}", credentials.server),
        )
    })
}

/// Opens the push stream for an authenticated session, retrying every
/// failure with its own backoff.
#[derive(Clone)]
pub struct StreamConnector {
    transport: Arc<dyn StreamTransport>,
    url: Url,
    retry: RetryConfig,
}

impl StreamConnector {
    pub fn new(
        credentials: &Credentials,
        transport: Arc<dyn StreamTransport>,
        retry: RetryConfig,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            transport,
            url: stream_url(credentials)?,
            retry,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn connect(&self, token: &str) -> Result<Box<dyn FrameSource>, BackendError> {
        let transport = self.transport.as_ref();
        let url = &self.url;
        let mut backoff = Backoff::new(self.retry.policy);

        let stream = retry_with_backoff(
            "stream connect",
            &mut backoff,
            self.retry.limit,
            RetryOn::AllErrors,
            move || transport.connect(url, token),
        )
        .await?;

        info!(url = %self.url, "push stream connected");
        Ok(stream)
    }
}
