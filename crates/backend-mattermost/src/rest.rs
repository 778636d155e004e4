use std::{
    collections::HashMap,
    fmt,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use backend_core::{
    AuthSession, BackendError, BackendErrorCategory, ChannelList, ChatApi, Credentials, Post,
    PostList, Team, User,
};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{AUTHORIZATION, RETRY_AFTER},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{map_error_body, map_reqwest_error, unexpected_response};

/// Prefix of every REST endpoint.
pub const API_PATH: &str = "/api/v1/";
/// Response header carrying the session token after login.
pub const TOKEN_HEADER: &str = "Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("backend-mattermost/", env!("CARGO_PKG_VERSION"));

/// REST client for the Mattermost v1 API.
///
/// The token from the last successful login is attached to every request.
pub struct MattermostApi {
    http: Client,
    base: Url,
    token: RwLock<Option<String>>,
}

impl MattermostApi {
    pub fn new(credentials: &Credentials) -> Result<Self, BackendError> {
        let base = api_base(credentials)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(map_reqwest_error)?;

        Ok(Self {
            http,
            base,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: String) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base.join(path).map_err(|err| {
            BackendError::new(
                BackendErrorCategory::Config,
                "invalid_endpoint",
                format!("cannot build endpoint '{path}': {err}"),
            )
        })
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, BackendError> {
        Ok(self.http.get(self.endpoint(path)?))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, BackendError> {
        Ok(self.http.post(self.endpoint(path)?))
    }

    /// Send with the bearer token and turn non-success statuses into errors.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let request = match self.token() {
            Some(token) => request.header(AUTHORIZATION, format!("BEARER {token}")),
            None => request,
        };
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let mut err = map_error_body(status.as_u16(), &body);
        if let Some(delay) = retry_after {
            err = err.with_retry_after(delay);
        }
        debug!(status = status.as_u16(), error = %err, "request failed");
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self.execute(request).await?;
        decode(response).await
    }

    async fn fetch_with<B, T>(&self, request: RequestBuilder, body: &B) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(request.json(body)).await
    }
}

impl fmt::Debug for MattermostApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MattermostApi")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token().is_some())
            .finish_non_exhaustive()
    }
}

fn api_base(credentials: &Credentials) -> Result<Url, BackendError> {
    let raw = format!(
        "{}://{}{}",
        credentials.http_scheme(),
        credentials.server,
        API_PATH
    );
    Url::parse(&raw).map_err(|err| {
        BackendError::new(
            BackendErrorCategory::Config,
            "invalid_server_address",
            format!("invalid server address '{}': {err}", credentials.server),
        )
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&body).map_err(|err| unexpected_response(status, err))
}

#[async_trait]
impl ChatApi for MattermostApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, BackendError> {
        let body = json!({
            "name": credentials.team,
            "email": credentials.login,
            "password": credentials.password,
        });
        let response = self
            .execute(self.post("users/login")?.json(&body))
            .await?;

        let token = response
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .filter(|token| !token.is_empty());
        // A gateway page in place of the user body is transient, so decode first.
        let user: User = decode(response).await?;
        let token = token.ok_or_else(|| {
            BackendError::new(
                BackendErrorCategory::Remote,
                "missing_token",
                "login response carried no session token",
            )
        })?;

        self.set_token(token.clone());
        info!(user = %user.username, "logged in");
        Ok(AuthSession { user, token })
    }

    async fn my_team(&self) -> Result<Team, BackendError> {
        self.fetch(self.get("teams/me")?).await
    }

    async fn team_profiles(&self, team_id: &str) -> Result<HashMap<String, User>, BackendError> {
        self.fetch(self.get(&format!("users/profiles/{team_id}"))?)
            .await
    }

    async fn joined_channels(&self) -> Result<ChannelList, BackendError> {
        self.fetch(self.get("channels/")?).await
    }

    async fn more_channels(&self) -> Result<ChannelList, BackendError> {
        self.fetch(self.get("channels/more")?).await
    }

    async fn create_post(&self, post: &Post) -> Result<Post, BackendError> {
        let path = format!("channels/{}/create", post.channel_id);
        self.fetch_with(self.post(&path)?, post).await
    }

    async fn join_channel(&self, channel_id: &str) -> Result<(), BackendError> {
        self.execute(self.post(&format!("channels/{channel_id}/join"))?)
            .await
            .map(drop)
    }

    async fn posts_since(&self, channel_id: &str, since_ms: i64) -> Result<PostList, BackendError> {
        self.fetch(self.get(&format!("channels/{channel_id}/posts/{since_ms}"))?)
            .await
    }

    async fn search_posts(&self, terms: &str) -> Result<PostList, BackendError> {
        self.fetch_with(self.post("posts/search")?, &json!({ "terms": terms }))
            .await
    }

    async fn posts(
        &self,
        channel_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PostList, BackendError> {
        self.fetch(self.get(&format!("channels/{channel_id}/posts/{offset}/{limit}"))?)
            .await
    }

    async fn update_channel_header(
        &self,
        channel_id: &str,
        header: &str,
    ) -> Result<(), BackendError> {
        let body = json!({ "channel_id": channel_id, "channel_header": header });
        self.execute(self.post("channels/update_header")?.json(&body))
            .await
            .map(drop)
    }

    async fn update_last_viewed_at(&self, channel_id: &str) -> Result<(), BackendError> {
        self.execute(self.post(&format!("channels/{channel_id}/update_last_viewed_at"))?)
            .await
            .map(drop)
    }
}
