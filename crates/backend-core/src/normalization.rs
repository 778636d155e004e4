use tracing::{debug, warn};

use crate::{
    api::ChatApi,
    session::Session,
    types::{ACTION_POSTED, DIRECT_CHANNEL_SEPARATOR, Frame, NormalizedMessage, Post},
};

/// Turn one received frame into a [`NormalizedMessage`].
///
/// Unknown actions produce an envelope carrying only the raw frame and team.
pub async fn normalize_frame(
    frame: Frame,
    team: &str,
    session: &Session,
    api: &dyn ChatApi,
) -> NormalizedMessage {
    let mut message = NormalizedMessage::envelope(frame, team);
    match message.raw.action.as_str() {
        ACTION_POSTED => normalize_posted(&mut message, session, api).await,
        other => debug!(action = other, "frame passed through without content"),
    }
    message
}

async fn normalize_posted(message: &mut NormalizedMessage, session: &Session, api: &dyn ChatApi) {
    let Some(payload) = message.raw.post_payload() else {
        debug!("posted frame without post payload");
        return;
    };
    let post = match Post::from_json(payload) {
        Ok(post) => post,
        Err(err) => {
            debug!(error = %err, "undecodable post payload");
            return;
        }
    };

    let mut users = UserResolver::new(session, api);
    message.username = users.username(&post.user_id).await;

    let channel = channel_name(session, api, &post.channel_id).await;
    message.channel = match channel.split_once(DIRECT_CHANNEL_SEPARATOR) {
        Some((first, second)) => {
            let own_id = session.user_id().await.unwrap_or_default();
            let counterpart = if first != own_id { first } else { second };
            users.username(counterpart).await
        }
        None => channel,
    };

    message.text = post.message.clone();
    message.post = Some(post);
}

/// Username lookups sharing a single on-miss refresh.
struct UserResolver<'a> {
    session: &'a Session,
    api: &'a dyn ChatApi,
    refreshed: bool,
}

impl<'a> UserResolver<'a> {
    fn new(session: &'a Session, api: &'a dyn ChatApi) -> Self {
        Self {
            session,
            api,
            refreshed: false,
        }
    }

    /// Username for `user_id`, or the id itself when still unknown after the
    /// refresh.
    async fn username(&mut self, user_id: &str) -> String {
        if let Some(username) = self.session.username(user_id).await {
            return username;
        }
        if !self.refreshed {
            self.refreshed = true;
            if let Err(err) = self.session.refresh_users(self.api).await {
                warn!(error = %err, "user refresh after cache miss failed");
            }
            if let Some(username) = self.session.username(user_id).await {
                return username;
            }
        }
        debug!(user_id, "unknown user, falling back to id");
        user_id.to_owned()
    }
}

/// Channel name for `channel_id`, refreshing the channel caches once on a
/// miss. Empty when still unknown.
async fn channel_name(session: &Session, api: &dyn ChatApi, channel_id: &str) -> String {
    if let Some(name) = session.channel_name(channel_id).await {
        return name;
    }
    if let Err(err) = session.refresh_channels(api).await {
        warn!(error = %err, "channel refresh after cache miss failed");
    }
    session.channel_name(channel_id).await.unwrap_or_default()
}
