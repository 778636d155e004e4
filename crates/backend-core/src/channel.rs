use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::NormalizedMessage;

/// Default capacity of the normalized message buffer.
pub const DEFAULT_MESSAGE_BUFFER: usize = 100;

/// Receiving end handed to the message consumer.
pub type MessageStream = mpsc::Receiver<NormalizedMessage>;

/// Errors returned by message channel operations.
#[derive(Debug, Error)]
pub enum BackendChannelError {
    /// The consumer dropped its [`MessageStream`].
    #[error("message consumer is closed")]
    ConsumerClosed,
}

/// Producer side of the bounded message buffer.
///
/// A full buffer makes [`MessageSender::send`] wait, so a slow consumer
/// throttles the stream reader instead of losing messages.
#[derive(Clone, Debug)]
pub struct MessageSender {
    tx: mpsc::Sender<NormalizedMessage>,
}

impl MessageSender {
    /// Create a buffer of `capacity` (at least 1) and return both ends.
    pub fn channel(capacity: usize) -> (Self, MessageStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn send(&self, message: NormalizedMessage) -> Result<(), BackendChannelError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BackendChannelError::ConsumerClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
