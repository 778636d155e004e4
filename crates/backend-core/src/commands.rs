use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::ChatClient,
    error::{BackendError, BackendErrorCategory},
    types::{Post, PostList},
};

impl ChatClient {
    /// Post `text` to the channel named `channel_name`.
    ///
    /// An unknown name is sent as an empty channel id and left for the server
    /// to reject.
    pub async fn post_message(&self, channel_name: &str, text: &str) -> Result<Post, BackendError> {
        let channel_id = self
            .session
            .channel_id(channel_name)
            .await
            .unwrap_or_default();
        let post = Post {
            channel_id,
            message: text.to_owned(),
            pending_post_id: Uuid::new_v4().to_string(),
            ..Post::default()
        };

        self.api.create_post(&post).await.map_err(|err| {
            warn!(channel = channel_name, error = %err, "post failed");
            BackendError::new(err.category, "post_failed", "failed to post message")
        })
    }

    /// Join a channel by name. A leading `#` is ignored.
    pub async fn join_channel(&self, channel_name: &str) -> Result<(), BackendError> {
        let name = channel_name.strip_prefix('#').unwrap_or(channel_name);
        let Some(channel_id) = self.session.channel_id(name).await else {
            debug!(channel = name, "join requested for unknown channel");
            return Err(join_failed(BackendErrorCategory::Remote));
        };

        self.api.join_channel(&channel_id).await.map_err(|err| {
            warn!(channel = name, error = %err, "join failed");
            join_failed(err.category)
        })?;
        info!(channel = name, "joined channel");

        if let Err(err) = self.session.refresh_channels(self.api.as_ref()).await {
            warn!(error = %err, "channel refresh after join failed");
        }
        Ok(())
    }

    /// Posts in a channel created after `since_ms`. `None` on any error.
    pub async fn get_posts_since(&self, channel_id: &str, since_ms: i64) -> Option<PostList> {
        self.api
            .posts_since(channel_id, since_ms)
            .await
            .inspect_err(|err| debug!(channel_id, error = %err, "posts since failed"))
            .ok()
    }

    pub async fn search_posts(&self, terms: &str) -> Option<PostList> {
        self.api
            .search_posts(terms)
            .await
            .inspect_err(|err| debug!(error = %err, "post search failed"))
            .ok()
    }

    /// A page of a channel's history, newest first.
    pub async fn get_posts(&self, channel_id: &str, offset: u32, limit: u32) -> Option<PostList> {
        self.api
            .posts(channel_id, offset, limit)
            .await
            .inspect_err(|err| debug!(channel_id, error = %err, "posts page failed"))
            .ok()
    }

    /// Fire and forget. Failures are logged only.
    pub async fn update_channel_header(&self, channel_id: &str, header: &str) {
        info!(channel_id, header, "updating channel header");
        if let Err(err) = self.api.update_channel_header(channel_id, header).await {
            warn!(channel_id, error = %err, "channel header update failed");
        }
    }

    /// Fire and forget. Failures are logged only.
    pub async fn update_last_viewed(&self, channel_id: &str) {
        debug!(channel_id, "marking channel viewed");
        if let Err(err) = self.api.update_last_viewed_at(channel_id).await {
            warn!(channel_id, error = %err, "last viewed update failed");
        }
    }

    /// Cached header of a channel, empty when unknown.
    pub async fn channel_header(&self, channel_id: &str) -> String {
        self.session
            .channel_header(channel_id)
            .await
            .unwrap_or_default()
    }
}

fn join_failed(category: BackendErrorCategory) -> BackendError {
    BackendError::new(category, "join_failed", "failed to join")
}
