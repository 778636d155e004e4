use std::collections::HashMap;

use async_trait::async_trait;
use url::Url;

use crate::{
    error::BackendError,
    types::{AuthSession, ChannelList, Credentials, Frame, Post, PostList, Team, User},
};

/// REST operations the session core consumes.
///
/// A successful [`ChatApi::login`] makes the implementation remember the
/// session token for every later call.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, BackendError>;

    async fn my_team(&self) -> Result<Team, BackendError>;

    /// Profiles of every member of `team_id`, keyed by user id.
    async fn team_profiles(&self, team_id: &str) -> Result<HashMap<String, User>, BackendError>;

    /// Channels the session user belongs to.
    async fn joined_channels(&self) -> Result<ChannelList, BackendError>;

    /// Channels the session user could join but has not.
    async fn more_channels(&self) -> Result<ChannelList, BackendError>;

    async fn create_post(&self, post: &Post) -> Result<Post, BackendError>;

    async fn join_channel(&self, channel_id: &str) -> Result<(), BackendError>;

    async fn posts_since(&self, channel_id: &str, since_ms: i64) -> Result<PostList, BackendError>;

    async fn search_posts(&self, terms: &str) -> Result<PostList, BackendError>;

    async fn posts(
        &self,
        channel_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PostList, BackendError>;

    async fn update_channel_header(&self, channel_id: &str, header: &str)
    -> Result<(), BackendError>;

    async fn update_last_viewed_at(&self, channel_id: &str) -> Result<(), BackendError>;
}

/// Opens push-stream connections.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self, url: &Url, token: &str) -> Result<Box<dyn FrameSource>, BackendError>;
}

/// An open push stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. Any error means the stream is unusable.
    async fn next_frame(&mut self) -> Result<Frame, BackendError>;
}
