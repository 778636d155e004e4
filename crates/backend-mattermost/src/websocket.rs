use std::collections::HashMap;

use async_trait::async_trait;
use backend_core::{
    BackendError, BackendErrorCategory, Frame, FrameSource, StreamTransport, null_as_default,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, trace};
use url::Url;

use crate::error::map_ws_error;

/// Opens authenticated WebSocket push streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn connect(&self, url: &Url, token: &str) -> Result<Box<dyn FrameSource>, BackendError> {
        let mut request = url.as_str().into_client_request().map_err(map_ws_error)?;
        let bearer = HeaderValue::from_str(&format!("BEARER {token}")).map_err(|err| {
            BackendError::new(
                BackendErrorCategory::Config,
                "invalid_token",
                format!("token is not a valid header value: {err}"),
            )
        })?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, response) = connect_async(request).await.map_err(map_ws_error)?;
        debug!(%url, status = response.status().as_u16(), "websocket handshake complete");
        Ok(Box::new(WebSocketFrames { socket }))
    }
}

/// Frames read from one WebSocket connection.
///
/// Pings are answered by the socket itself; binary payloads and pongs are
/// skipped.
pub struct WebSocketFrames {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSource for WebSocketFrames {
    async fn next_frame(&mut self) -> Result<Frame, BackendError> {
        loop {
            let message = match self.socket.next().await {
                Some(message) => message.map_err(map_ws_error)?,
                None => return Err(stream_closed("push stream ended")),
            };
            match message {
                Message::Text(text) => return decode_frame(text.as_str()),
                Message::Close(close) => {
                    let reason = close
                        .map(|frame| format!("push stream closed by server: {}", frame.reason))
                        .unwrap_or_else(|| "push stream closed by server".to_owned());
                    return Err(stream_closed(reason));
                }
                Message::Binary(payload) => {
                    trace!(len = payload.len(), "skipping binary frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

fn stream_closed(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorCategory::Network, "stream_closed", message)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireFrame {
    team_id: String,
    channel_id: String,
    user_id: String,
    action: String,
    #[serde(deserialize_with = "null_as_default")]
    props: HashMap<String, Value>,
}

/// Decode one text frame.
///
/// Non-string property values are kept as their JSON text.
pub(crate) fn decode_frame(text: &str) -> Result<Frame, BackendError> {
    let wire: WireFrame = serde_json::from_str(text).map_err(|err| {
        debug!(error = %err, "undecodable push frame");
        BackendError::new(
            BackendErrorCategory::Network,
            "invalid_frame",
            format!("undecodable push frame: {err}"),
        )
    })?;

    let props = wire
        .props
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect();
    Ok(Frame {
        team_id: wire.team_id,
        channel_id: wire.channel_id,
        user_id: wire.user_id,
        action: wire.action,
        props,
    })
}
