use crate::{error::BackendError, types::ClientLifecycleState};

#[derive(Debug, Clone)]
pub struct ClientStateMachine {
    state: ClientLifecycleState,
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self {
            state: ClientLifecycleState::Cold,
        }
    }
}

impl ClientStateMachine {
    pub fn state(&self) -> ClientLifecycleState {
        self.state
    }

    pub fn begin_login(&mut self) -> Result<ClientLifecycleState, BackendError> {
        self.transition_from_any_of(
            &[
                ClientLifecycleState::Cold,
                ClientLifecycleState::Authenticated,
                ClientLifecycleState::Stopped,
            ],
            ClientLifecycleState::Authenticating,
            "login",
        )
    }

    pub fn on_login_result(&mut self, success: bool) -> Result<ClientLifecycleState, BackendError> {
        let next = if success {
            ClientLifecycleState::Authenticated
        } else {
            ClientLifecycleState::Cold
        };
        self.transition_from_state(ClientLifecycleState::Authenticating, next, "on_login_result")
    }

    pub fn start_streaming(&mut self) -> Result<ClientLifecycleState, BackendError> {
        self.transition_from_state(
            ClientLifecycleState::Authenticated,
            ClientLifecycleState::Streaming,
            "start",
        )
    }

    pub fn on_stream_lost(&mut self) -> Result<ClientLifecycleState, BackendError> {
        self.transition_from_state(
            ClientLifecycleState::Streaming,
            ClientLifecycleState::Reconnecting,
            "on_stream_lost",
        )
    }

    pub fn on_stream_recovered(&mut self) -> Result<ClientLifecycleState, BackendError> {
        self.transition_from_state(
            ClientLifecycleState::Reconnecting,
            ClientLifecycleState::Streaming,
            "on_stream_recovered",
        )
    }

    /// Valid from every state.
    pub fn stop(&mut self) -> ClientLifecycleState {
        self.state = ClientLifecycleState::Stopped;
        self.state
    }

    fn transition_from_state(
        &mut self,
        expected: ClientLifecycleState,
        next: ClientLifecycleState,
        action: &str,
    ) -> Result<ClientLifecycleState, BackendError> {
        if self.state != expected {
            return Err(BackendError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(next)
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[ClientLifecycleState],
        next: ClientLifecycleState,
        action: &str,
    ) -> Result<ClientLifecycleState, BackendError> {
        if !expected.contains(&self.state) {
            return Err(BackendError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(next)
    }
}
