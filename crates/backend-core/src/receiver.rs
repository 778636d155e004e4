use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    api::{ChatApi, FrameSource},
    auth::Authenticator,
    channel::MessageSender,
    error::BackendError,
    normalization::normalize_frame,
    retry::{Backoff, BackoffPolicy},
    session::Session,
    state_machine::ClientStateMachine,
    stream::StreamConnector,
    types::ClientLifecycleState,
};

/// Reads the push stream for the lifetime of a client.
pub(crate) struct ReceiverLoop {
    pub(crate) session: Arc<Session>,
    pub(crate) api: Arc<dyn ChatApi>,
    pub(crate) authenticator: Authenticator,
    pub(crate) connector: StreamConnector,
    pub(crate) lifecycle: Arc<Mutex<ClientStateMachine>>,
    pub(crate) output: MessageSender,
    pub(crate) stop: CancellationToken,
    /// Spacing between recovery rounds whose login failed permanently.
    pub(crate) recovery_policy: BackoffPolicy,
}

impl ReceiverLoop {
    /// Runs until cancelled or until the consumer drops its stream.
    pub(crate) async fn run(self, mut stream: Box<dyn FrameSource>) {
        let team = self.session.credentials().team.clone();
        loop {
            let read = tokio::select! {
                _ = self.stop.cancelled() => break,
                read = stream.next_frame() => read,
            };

            match read {
                Ok(frame) => {
                    debug!(action = %frame.action, "frame received");
                    // Normalizing may refresh caches over the network.
                    let message = tokio::select! {
                        _ = self.stop.cancelled() => break,
                        message = normalize_frame(frame, &team, &self.session, self.api.as_ref()) => message,
                    };
                    let sent = tokio::select! {
                        _ = self.stop.cancelled() => break,
                        sent = self.output.send(message) => sent,
                    };
                    if sent.is_err() {
                        info!("message consumer went away, stopping receiver");
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "stream read failed, re-establishing session");
                    self.transition(ClientStateMachine::on_stream_lost).await;
                    match self.recover().await {
                        Some(fresh) => stream = fresh,
                        None => break,
                    }
                    self.transition(ClientStateMachine::on_stream_recovered).await;
                }
            }
        }
        debug!("receiver loop finished");
    }

    /// Full re-login plus reconnect. `None` once cancelled.
    async fn recover(&self) -> Option<Box<dyn FrameSource>> {
        let mut backoff = Backoff::new(self.recovery_policy);
        loop {
            let attempt = async {
                let outcome = self.authenticator.login().await?;
                self.connector.connect(&outcome.token).await
            };
            let result = tokio::select! {
                _ = self.stop.cancelled() => return None,
                result = attempt => result,
            };

            match result {
                Ok(stream) => {
                    info!("session re-established");
                    return Some(stream);
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    error!(
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "session recovery failed"
                    );
                    tokio::select! {
                        _ = self.stop.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn transition<F>(&self, step: F)
    where
        F: FnOnce(&mut ClientStateMachine) -> Result<ClientLifecycleState, BackendError>,
    {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Err(err) = step(&mut *lifecycle) {
            debug!(error = %err, "lifecycle transition skipped");
        }
    }
}
