use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    api::ChatApi,
    error::BackendError,
    types::{Channel, Credentials, Team, User},
};

#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    team: Option<Team>,
    channels: Vec<Channel>,
    more_channels: Vec<Channel>,
    users: HashMap<String, User>,
}

impl SessionState {
    fn all_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().chain(self.more_channels.iter())
    }

    fn channel_by_id(&self, channel_id: &str) -> Option<&Channel> {
        self.all_channels().find(|channel| channel.id == channel_id)
    }
}

/// Point-in-time copy of both channel caches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    pub joined: Vec<Channel>,
    pub more: Vec<Channel>,
}

/// Shared session state: identity, team, channel caches and user map.
///
/// Refreshes fetch outside the lock and swap the new contents in under a
/// single write lock, so readers see either the old or the new cache, never a
/// mix.
#[derive(Debug)]
pub struct Session {
    credentials: Credentials,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn set_identity(&self, user: User, team: Team) {
        let mut state = self.state.write().await;
        state.user = Some(user);
        state.team = Some(team);
    }

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn user_id(&self) -> Option<String> {
        self.state.read().await.user.as_ref().map(|user| user.id.clone())
    }

    pub async fn team(&self) -> Option<Team> {
        self.state.read().await.team.clone()
    }

    pub async fn users(&self) -> HashMap<String, User> {
        self.state.read().await.users.clone()
    }

    pub async fn username(&self, user_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .users
            .get(user_id)
            .map(|user| user.username.clone())
    }

    pub async fn channels(&self) -> ChannelSnapshot {
        let state = self.state.read().await;
        ChannelSnapshot {
            joined: state.channels.clone(),
            more: state.more_channels.clone(),
        }
    }

    /// Channel name for an id, searching joined channels first.
    pub async fn channel_name(&self, channel_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .channel_by_id(channel_id)
            .map(|channel| channel.name.clone())
    }

    /// Channel id for a name. Never refreshes.
    pub async fn channel_id(&self, name: &str) -> Option<String> {
        self.state
            .read()
            .await
            .all_channels()
            .find(|channel| channel.name == name)
            .map(|channel| channel.id.clone())
    }

    pub async fn channel_header(&self, channel_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .channel_by_id(channel_id)
            .map(|channel| channel.header.clone())
    }

    /// Replace the user map with the current team's profiles.
    ///
    /// On failure the previous map is kept.
    pub async fn refresh_users(&self, api: &dyn ChatApi) -> Result<(), BackendError> {
        let team_id = {
            let state = self.state.read().await;
            state
                .team
                .as_ref()
                .map(|team| team.id.clone())
                .or_else(|| state.user.as_ref().map(|user| user.team_id.clone()))
        }
        .ok_or_else(|| BackendError::not_authenticated("refresh_users"))?;

        let users = api.team_profiles(&team_id).await?;
        debug!(team_id, count = users.len(), "user cache refreshed");
        self.state.write().await.users = users;
        Ok(())
    }

    /// Replace both channel caches.
    ///
    /// A channel present in both listings is kept only in the joined cache.
    /// On failure both previous caches are kept.
    pub async fn refresh_channels(&self, api: &dyn ChatApi) -> Result<(), BackendError> {
        let joined = api.joined_channels().await?.channels;
        let joined_ids: HashSet<&str> = joined.iter().map(|channel| channel.id.as_str()).collect();
        let more: Vec<Channel> = api
            .more_channels()
            .await?
            .channels
            .into_iter()
            .filter(|channel| !joined_ids.contains(channel.id.as_str()))
            .collect();
        debug!(
            joined = joined.len(),
            more = more.len(),
            "channel caches refreshed"
        );

        let mut state = self.state.write().await;
        state.channels = joined;
        state.more_channels = more;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, channel, credentials, user};

    async fn logged_in_session(backend: &FakeBackend) -> Session {
        let session = Session::new(credentials());
        session
            .set_identity(backend.me(), backend.team())
            .await;
        session
    }

    #[tokio::test]
    async fn refresh_channels_twice_yields_identical_caches() {
        let backend = FakeBackend::default();
        backend.add_joined(channel("c1", "town-square"));
        backend.add_more(channel("c2", "off-topic"));
        let session = logged_in_session(&backend).await;

        session.refresh_channels(&backend).await.expect("refresh");
        let first = session.channels().await;
        session.refresh_channels(&backend).await.expect("refresh");
        let second = session.channels().await;

        assert_eq!(first, second);
        assert_eq!(first.joined.len(), 1);
        assert_eq!(first.more.len(), 1);
    }

    #[tokio::test]
    async fn channel_listed_twice_lives_only_in_joined_cache() {
        let backend = FakeBackend::default();
        backend.add_joined(channel("c1", "town-square"));
        backend.add_more(channel("c1", "town-square"));
        let session = logged_in_session(&backend).await;

        session.refresh_channels(&backend).await.expect("refresh");
        let snapshot = session.channels().await;

        assert_eq!(snapshot.joined.len(), 1);
        assert!(snapshot.more.is_empty());
    }

    #[tokio::test]
    async fn lookups_scan_both_caches() {
        let backend = FakeBackend::default();
        let mut joined = channel("c1", "town-square");
        joined.header = "welcome".into();
        backend.add_joined(joined);
        backend.add_more(channel("c2", "off-topic"));
        let session = logged_in_session(&backend).await;
        session.refresh_channels(&backend).await.expect("refresh");

        assert_eq!(session.channel_name("c2").await.as_deref(), Some("off-topic"));
        assert_eq!(session.channel_id("town-square").await.as_deref(), Some("c1"));
        assert_eq!(session.channel_header("c1").await.as_deref(), Some("welcome"));
        assert_eq!(session.channel_name("missing").await, None);
    }

    #[tokio::test]
    async fn refresh_users_replaces_map_wholesale() {
        let backend = FakeBackend::default();
        backend.add_user(user("u2", "bob"));
        let session = logged_in_session(&backend).await;
        session.refresh_users(&backend).await.expect("refresh");
        assert_eq!(session.username("u2").await.as_deref(), Some("bob"));

        backend.remove_user("u2");
        backend.add_user(user("u3", "carol"));
        session.refresh_users(&backend).await.expect("refresh");

        assert_eq!(session.username("u2").await, None);
        assert_eq!(session.username("u3").await.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_cache() {
        let backend = FakeBackend::default();
        backend.add_joined(channel("c1", "town-square"));
        let session = logged_in_session(&backend).await;
        session.refresh_channels(&backend).await.expect("refresh");

        backend.fail_channel_listing(true);
        session
            .refresh_channels(&backend)
            .await
            .expect_err("listing failure must surface");

        assert_eq!(session.channel_id("town-square").await.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn refresh_users_requires_identity() {
        let backend = FakeBackend::default();
        let session = Session::new(credentials());

        let err = session
            .refresh_users(&backend)
            .await
            .expect_err("refresh without login must fail");
        assert_eq!(err.code, "not_authenticated");
    }
}
