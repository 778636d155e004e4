//! In-memory server double used by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use url::Url;

use crate::{
    api::{ChatApi, FrameSource, StreamTransport},
    error::{BackendError, BackendErrorCategory},
    types::{
        ACTION_POSTED, AuthSession, Channel, ChannelList, Credentials, Frame, POST_PROP_KEY, Post,
        PostList, Team, User,
    },
};

pub(crate) fn credentials() -> Credentials {
    Credentials::new("alice@example.org", "secret", "core", "chat.example.org")
}

pub(crate) fn user(id: &str, username: &str) -> User {
    User {
        id: id.to_owned(),
        username: username.to_owned(),
        team_id: "t1".to_owned(),
        ..User::default()
    }
}

pub(crate) fn channel(id: &str, name: &str) -> Channel {
    Channel {
        id: id.to_owned(),
        name: name.to_owned(),
        team_id: "t1".to_owned(),
        channel_type: "O".to_owned(),
        ..Channel::default()
    }
}

pub(crate) fn post(user_id: &str, channel_id: &str, message: &str) -> Post {
    Post {
        id: format!("p-{user_id}-{channel_id}"),
        user_id: user_id.to_owned(),
        channel_id: channel_id.to_owned(),
        message: message.to_owned(),
        ..Post::default()
    }
}

pub(crate) fn posted_frame(post: &Post) -> Frame {
    let encoded = serde_json::to_string(post).expect("post should encode");
    Frame {
        team_id: "t1".to_owned(),
        channel_id: post.channel_id.clone(),
        user_id: post.user_id.clone(),
        action: ACTION_POSTED.to_owned(),
        props: HashMap::from([(POST_PROP_KEY.to_owned(), encoded)]),
    }
}

pub(crate) fn refused() -> BackendError {
    BackendError::new(
        BackendErrorCategory::Network,
        "connection_failed",
        "connection refused",
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallCounts {
    pub login: u32,
    pub team_profiles: u32,
    pub joined_channels: u32,
    pub create_post: u32,
    pub join_channel: u32,
    pub update_channel_header: u32,
    pub update_last_viewed_at: u32,
}

#[derive(Debug)]
struct BackendState {
    me: User,
    team: Team,
    users: HashMap<String, User>,
    joined: Vec<Channel>,
    more: Vec<Channel>,
    posts: Vec<Post>,
    login_failures: VecDeque<BackendError>,
    fail_channel_listing: bool,
    fail_commands: bool,
    stall_user_refresh: bool,
    calls: CallCounts,
}

#[derive(Debug)]
pub(crate) struct FakeBackend {
    state: Mutex<BackendState>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        let me = user("u1", "alice");
        Self {
            state: Mutex::new(BackendState {
                users: HashMap::from([(me.id.clone(), me.clone())]),
                me,
                team: Team {
                    id: "t1".to_owned(),
                    name: "core".to_owned(),
                    display_name: "Core".to_owned(),
                },
                joined: Vec::new(),
                more: Vec::new(),
                posts: Vec::new(),
                login_failures: VecDeque::new(),
                fail_channel_listing: false,
                fail_commands: false,
                stall_user_refresh: false,
                calls: CallCounts::default(),
            }),
        }
    }
}

impl FakeBackend {
    fn with_state<R>(&self, f: impl FnOnce(&mut BackendState) -> R) -> R {
        let mut state = self.state.lock().expect("fake backend lock");
        f(&mut state)
    }

    pub(crate) fn me(&self) -> User {
        self.with_state(|state| state.me.clone())
    }

    pub(crate) fn team(&self) -> Team {
        self.with_state(|state| state.team.clone())
    }

    pub(crate) fn set_me(&self, me: User) {
        self.with_state(|state| {
            state.users.insert(me.id.clone(), me.clone());
            state.me = me;
        });
    }

    pub(crate) fn add_user(&self, user: User) {
        self.with_state(|state| {
            state.users.insert(user.id.clone(), user);
        });
    }

    pub(crate) fn remove_user(&self, user_id: &str) {
        self.with_state(|state| {
            state.users.remove(user_id);
        });
    }

    pub(crate) fn add_joined(&self, channel: Channel) {
        self.with_state(|state| state.joined.push(channel));
    }

    pub(crate) fn add_more(&self, channel: Channel) {
        self.with_state(|state| state.more.push(channel));
    }

    pub(crate) fn push_login_failure(&self, err: BackendError) {
        self.with_state(|state| state.login_failures.push_back(err));
    }

    pub(crate) fn fail_channel_listing(&self, fail: bool) {
        self.with_state(|state| state.fail_channel_listing = fail);
    }

    pub(crate) fn fail_commands(&self, fail: bool) {
        self.with_state(|state| state.fail_commands = fail);
    }

    /// Make user refreshes hang forever after being counted.
    pub(crate) fn stall_user_refresh(&self, stall: bool) {
        self.with_state(|state| state.stall_user_refresh = stall);
    }

    pub(crate) fn calls(&self) -> CallCounts {
        self.with_state(|state| state.calls)
    }

    pub(crate) fn header_of(&self, channel_id: &str) -> Option<String> {
        self.with_state(|state| {
            state
                .joined
                .iter()
                .chain(state.more.iter())
                .find(|channel| channel.id == channel_id)
                .map(|channel| channel.header.clone())
        })
    }
}

fn remote_error(message: &str) -> BackendError {
    BackendError::new(BackendErrorCategory::Remote, "app_error", message)
}

fn post_list<'a>(posts: impl Iterator<Item = &'a Post>) -> PostList {
    let mut selected: Vec<&Post> = posts.collect();
    selected.sort_by(|a, b| b.create_at.cmp(&a.create_at));
    PostList {
        order: selected.iter().map(|post| post.id.clone()).collect(),
        posts: selected
            .into_iter()
            .map(|post| (post.id.clone(), post.clone()))
            .collect(),
    }
}

#[async_trait]
impl ChatApi for FakeBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<AuthSession, BackendError> {
        self.with_state(|state| {
            state.calls.login += 1;
            if let Some(err) = state.login_failures.pop_front() {
                return Err(err);
            }
            Ok(AuthSession {
                user: state.me.clone(),
                token: format!("token-{}", state.calls.login),
            })
        })
    }

    async fn my_team(&self) -> Result<Team, BackendError> {
        Ok(self.team())
    }

    async fn team_profiles(&self, _team_id: &str) -> Result<HashMap<String, User>, BackendError> {
        let (users, stall) = self.with_state(|state| {
            state.calls.team_profiles += 1;
            (state.users.clone(), state.stall_user_refresh)
        });
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(users)
    }

    async fn joined_channels(&self) -> Result<ChannelList, BackendError> {
        self.with_state(|state| {
            state.calls.joined_channels += 1;
            if state.fail_channel_listing {
                return Err(refused());
            }
            Ok(ChannelList {
                channels: state.joined.clone(),
            })
        })
    }

    async fn more_channels(&self) -> Result<ChannelList, BackendError> {
        self.with_state(|state| {
            if state.fail_channel_listing {
                return Err(refused());
            }
            Ok(ChannelList {
                channels: state.more.clone(),
            })
        })
    }

    async fn create_post(&self, post: &Post) -> Result<Post, BackendError> {
        self.with_state(|state| {
            state.calls.create_post += 1;
            if state.fail_commands {
                return Err(remote_error("create failed"));
            }
            if !state.joined.iter().any(|channel| channel.id == post.channel_id) {
                return Err(remote_error("invalid channel_id"));
            }
            let mut created = post.clone();
            created.id = format!("post-{}", state.posts.len() + 1);
            created.create_at = state.posts.len() as i64 + 1;
            created.user_id = state.me.id.clone();
            state.posts.push(created.clone());
            Ok(created)
        })
    }

    async fn join_channel(&self, channel_id: &str) -> Result<(), BackendError> {
        self.with_state(|state| {
            state.calls.join_channel += 1;
            if state.fail_commands {
                return Err(remote_error("join failed"));
            }
            let Some(index) = state.more.iter().position(|channel| channel.id == channel_id) else {
                return Ok(());
            };
            let channel = state.more.remove(index);
            state.joined.push(channel);
            Ok(())
        })
    }

    async fn posts_since(&self, channel_id: &str, since_ms: i64) -> Result<PostList, BackendError> {
        self.with_state(|state| {
            if state.fail_commands {
                return Err(remote_error("history failed"));
            }
            Ok(post_list(state.posts.iter().filter(|post| {
                post.channel_id == channel_id && post.create_at > since_ms
            })))
        })
    }

    async fn search_posts(&self, terms: &str) -> Result<PostList, BackendError> {
        self.with_state(|state| {
            if state.fail_commands {
                return Err(remote_error("search failed"));
            }
            Ok(post_list(
                state.posts.iter().filter(|post| post.message.contains(terms)),
            ))
        })
    }

    async fn posts(
        &self,
        channel_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PostList, BackendError> {
        self.with_state(|state| {
            if state.fail_commands {
                return Err(remote_error("history failed"));
            }
            let mut in_channel: Vec<&Post> = state
                .posts
                .iter()
                .filter(|post| post.channel_id == channel_id)
                .collect();
            in_channel.sort_by(|a, b| b.create_at.cmp(&a.create_at));
            Ok(post_list(
                in_channel
                    .into_iter()
                    .skip(offset as usize)
                    .take(limit as usize),
            ))
        })
    }

    async fn update_channel_header(
        &self,
        channel_id: &str,
        header: &str,
    ) -> Result<(), BackendError> {
        self.with_state(|state| {
            state.calls.update_channel_header += 1;
            if state.fail_commands {
                return Err(remote_error("update failed"));
            }
            if let Some(channel) = state
                .joined
                .iter_mut()
                .chain(state.more.iter_mut())
                .find(|channel| channel.id == channel_id)
            {
                channel.header = header.to_owned();
            }
            Ok(())
        })
    }

    async fn update_last_viewed_at(&self, _channel_id: &str) -> Result<(), BackendError> {
        self.with_state(|state| {
            state.calls.update_last_viewed_at += 1;
            if state.fail_commands {
                return Err(remote_error("update failed"));
            }
            Ok(())
        })
    }
}

type ScriptedRead = Result<Frame, BackendError>;

#[derive(Debug, Default)]
struct TransportState {
    connects: u32,
    connect_failures: VecDeque<BackendError>,
    streams: VecDeque<Vec<ScriptedRead>>,
    last_url: Option<Url>,
    last_token: Option<String>,
}

/// Stream transport handing out scripted streams, one per connect.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    fn with_state<R>(&self, f: impl FnOnce(&mut TransportState) -> R) -> R {
        let mut state = self.state.lock().expect("fake transport lock");
        f(&mut state)
    }

    /// Queue the reads of the next connected stream. Once they run out the
    /// stream stays silent.
    pub(crate) fn push_stream(&self, reads: Vec<ScriptedRead>) {
        self.with_state(|state| state.streams.push_back(reads));
    }

    pub(crate) fn push_connect_failure(&self, err: BackendError) {
        self.with_state(|state| state.connect_failures.push_back(err));
    }

    pub(crate) fn connects(&self) -> u32 {
        self.with_state(|state| state.connects)
    }

    pub(crate) fn last_url(&self) -> Option<Url> {
        self.with_state(|state| state.last_url.clone())
    }

    pub(crate) fn last_token(&self) -> Option<String> {
        self.with_state(|state| state.last_token.clone())
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn connect(&self, url: &Url, token: &str) -> Result<Box<dyn FrameSource>, BackendError> {
        self.with_state(|state| {
            state.connects += 1;
            state.last_url = Some(url.clone());
            state.last_token = Some(token.to_owned());
            if let Some(err) = state.connect_failures.pop_front() {
                return Err(err);
            }
            let reads = state.streams.pop_front().unwrap_or_default();
            Ok(Box::new(ScriptedStream {
                reads: reads.into(),
            }) as Box<dyn FrameSource>)
        })
    }
}

struct ScriptedStream {
    reads: VecDeque<ScriptedRead>,
}

#[async_trait]
impl FrameSource for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Frame, BackendError> {
        match self.reads.pop_front() {
            Some(read) => read,
            None => std::future::pending().await,
        }
    }
}
