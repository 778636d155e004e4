use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    api::ChatApi,
    error::BackendError,
    retry::{Backoff, RetryConfig, RetryOn, retry_with_backoff},
    session::Session,
    types::{Team, User},
};

/// Identity established by a successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: User,
    pub team: Team,
    pub(crate) token: String,
}

impl std::fmt::Debug for LoginOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOutcome")
            .field("user", &self.user)
            .field("team", &self.team)
            .finish_non_exhaustive()
    }
}

/// Credential exchange with retry on transient failures.
#[derive(Clone)]
pub struct Authenticator {
    session: Arc<Session>,
    api: Arc<dyn ChatApi>,
    retry: RetryConfig,
}

impl Authenticator {
    pub fn new(session: Arc<Session>, api: Arc<dyn ChatApi>, retry: RetryConfig) -> Self {
        Self {
            session,
            api,
            retry,
        }
    }

    /// Log in, record identity and team, then repopulate both caches.
    ///
    /// Connection-level failures are retried; credential rejections and
    /// other application errors are returned at once.
    pub async fn login(&self) -> Result<LoginOutcome, BackendError> {
        let api = self.api.as_ref();
        let credentials = self.session.credentials();
        let mut backoff = Backoff::new(self.retry.policy);

        info!(
            team = %credentials.team,
            login = %credentials.login,
            server = %credentials.server,
            "logging in"
        );
        let auth = retry_with_backoff(
            "login",
            &mut backoff,
            self.retry.limit,
            RetryOn::TransientErrors,
            move || api.login(credentials),
        )
        .await
        .inspect_err(|err| error!(error = %err, "login failed"))?;

        let team = retry_with_backoff(
            "team lookup",
            &mut backoff,
            self.retry.limit,
            RetryOn::TransientErrors,
            move || api.my_team(),
        )
        .await?;

        info!(user = %auth.user.username, team = %team.name, "logged in");
        self.session
            .set_identity(auth.user.clone(), team.clone())
            .await;

        if let Err(err) = self.session.refresh_users(api).await {
            warn!(error = %err, "initial user refresh failed");
        }
        if let Err(err) = self.session.refresh_channels(api).await {
            warn!(error = %err, "initial channel refresh failed");
        }

        Ok(LoginOutcome {
            user: auth.user,
            team,
            token: auth.token,
        })
    }
}
