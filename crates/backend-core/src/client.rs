use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    api::{ChatApi, FrameSource, StreamTransport},
    auth::{Authenticator, LoginOutcome},
    channel::{DEFAULT_MESSAGE_BUFFER, MessageSender, MessageStream},
    error::{BackendError, BackendErrorCategory},
    receiver::ReceiverLoop,
    retry::RetryConfig,
    session::Session,
    state_machine::ClientStateMachine,
    stream::StreamConnector,
    types::{ClientLifecycleState, Credentials},
};

/// Tuning for a [`ChatClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Capacity of the normalized message buffer.
    pub message_buffer: usize,
    /// Backoff and attempt limit for logins, including re-logins after a
    /// dropped stream.
    pub login_retry: RetryConfig,
    /// Backoff and attempt limit for push-stream connects.
    pub connect_retry: RetryConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            message_buffer: DEFAULT_MESSAGE_BUFFER,
            login_retry: RetryConfig::default(),
            connect_retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug)]
struct RunningReceiver {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// One chat session: login, push-stream reception and the command surface.
pub struct ChatClient {
    pub(crate) session: Arc<Session>,
    pub(crate) api: Arc<dyn ChatApi>,
    authenticator: Authenticator,
    connector: StreamConnector,
    options: ClientOptions,
    lifecycle: Arc<Mutex<ClientStateMachine>>,
    pending_stream: Mutex<Option<Box<dyn FrameSource>>>,
    receiver: Mutex<Option<RunningReceiver>>,
}

impl ChatClient {
    pub fn new(
        credentials: Credentials,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn StreamTransport>,
        options: ClientOptions,
    ) -> Result<Self, BackendError> {
        let connector = StreamConnector::new(&credentials, transport, options.connect_retry)?;
        let session = Arc::new(Session::new(credentials));
        let authenticator = Authenticator::new(session.clone(), api.clone(), options.login_retry);

        Ok(Self {
            session,
            api,
            authenticator,
            connector,
            options,
            lifecycle: Arc::new(Mutex::new(ClientStateMachine::default())),
            pending_stream: Mutex::new(None),
            receiver: Mutex::new(None),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn state(&self) -> ClientLifecycleState {
        self.lifecycle.lock().await.state()
    }

    /// Authenticate and open the push stream.
    ///
    /// The stream is kept until [`ChatClient::start`] hands it to the
    /// receiver loop. A [`ChatClient::shutdown`] racing the login wins: the
    /// freshly opened stream is dropped and the client stays stopped.
    pub async fn login(&self) -> Result<LoginOutcome, BackendError> {
        self.lifecycle.lock().await.begin_login()?;

        let result = async {
            let outcome = self.authenticator.login().await?;
            let stream = self.connector.connect(&outcome.token).await?;
            Ok::<_, BackendError>((outcome, stream))
        }
        .await;

        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state() == ClientLifecycleState::Stopped {
            info!("client stopped during login, discarding push stream");
            return result.map(|(outcome, _stream)| outcome);
        }
        match result {
            Ok((outcome, stream)) => {
                *self.pending_stream.lock().await = Some(stream);
                lifecycle.on_login_result(true)?;
                Ok(outcome)
            }
            Err(err) => {
                lifecycle.on_login_result(false)?;
                Err(err)
            }
        }
    }

    /// Spawn the receiver loop and return the normalized message stream.
    pub async fn start(&self) -> Result<MessageStream, BackendError> {
        let mut receiver = self.receiver.lock().await;
        if receiver.is_some() {
            return Err(BackendError::new(
                BackendErrorCategory::Internal,
                "receiver_already_running",
                "receiver loop is already running",
            ));
        }

        let mut lifecycle = self.lifecycle.lock().await;
        let stream = {
            let mut pending = self.pending_stream.lock().await;
            match pending.take() {
                Some(stream) => stream,
                None => return Err(BackendError::invalid_state(lifecycle.state(), "start")),
            }
        };
        if let Err(err) = lifecycle.start_streaming() {
            *self.pending_stream.lock().await = Some(stream);
            return Err(err);
        }
        drop(lifecycle);

        let (output, messages) = MessageSender::channel(self.options.message_buffer);
        let stop = CancellationToken::new();
        let receiver_loop = ReceiverLoop {
            session: self.session.clone(),
            api: self.api.clone(),
            authenticator: self.authenticator.clone(),
            connector: self.connector.clone(),
            lifecycle: self.lifecycle.clone(),
            output,
            stop: stop.child_token(),
            recovery_policy: self.options.login_retry.policy,
        };
        let task = tokio::spawn(receiver_loop.run(stream));
        info!(url = %self.connector.url(), "receiver loop started");

        *receiver = Some(RunningReceiver { stop, task });
        Ok(messages)
    }

    /// Stop the receiver loop and drop any unread stream.
    ///
    /// The message stream ends once buffered messages are drained.
    pub async fn shutdown(&self) {
        let running = self.receiver.lock().await.take();
        self.lifecycle.lock().await.stop();
        self.pending_stream.lock().await.take();

        if let Some(running) = running {
            running.stop.cancel();
            if let Err(err) = running.task.await {
                warn!(error = %err, "receiver task ended abnormally");
            }
        }
        info!("client stopped");
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(running) = self.receiver.get_mut().as_ref() {
            running.stop.cancel();
        }
    }
}
