use std::{collections::HashMap, fmt};

use serde::{Deserialize, Deserializer, Serialize};

/// Frame action carrying a newly created post.
pub const ACTION_POSTED: &str = "posted";
/// Frame property holding the JSON-encoded post.
pub const POST_PROP_KEY: &str = "post";
/// Separator between the two participant ids in a direct channel name.
pub const DIRECT_CHANNEL_SEPARATOR: &str = "__";
/// Channel type code for direct-message channels.
pub const DIRECT_CHANNEL_TYPE: &str = "D";

/// Deserialize a field that the server may send as `null`, using the default
/// value in that case.
///
/// `#[serde(default)]` only covers absent fields.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// High-level client lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientLifecycleState {
    /// Not logged in yet, or the last login failed.
    Cold,
    /// A login (credential exchange plus stream connect) is running.
    Authenticating,
    /// Logged in with an open stream that nobody reads yet.
    Authenticated,
    /// The receiver loop is reading the stream.
    Streaming,
    /// The stream broke and the receiver loop is re-establishing the session.
    Reconnecting,
    /// The receiver loop was shut down.
    Stopped,
}

/// Login material for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login email.
    pub login: String,
    pub password: String,
    /// Team name used for login and stamped on every normalized message.
    pub team: String,
    /// Server address as `host[:port]`, without scheme.
    pub server: String,
    /// Use `http`/`ws` instead of `https`/`wss`.
    pub no_tls: bool,
}

impl Credentials {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        team: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            team: team.into(),
            server: server.into(),
            no_tls: false,
        }
    }

    pub fn with_no_tls(mut self, no_tls: bool) -> Self {
        self.no_tls = no_tls;
        self
    }

    /// Scheme for REST requests.
    pub fn http_scheme(&self) -> &'static str {
        if self.no_tls { "http" } else { "https" }
    }

    /// Scheme for the push stream.
    pub fn stream_scheme(&self) -> &'static str {
        if self.no_tls { "ws" } else { "wss" }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("team", &self.team)
            .field("server", &self.server)
            .field("no_tls", &self.no_tls)
            .finish()
    }
}

/// User profile as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub team_id: String,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// Channel metadata.
///
/// Direct-message channels are named `<user_id>__<user_id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Channel {
    pub id: String,
    pub team_id: String,
    /// `O` open, `P` private, `D` direct.
    #[serde(rename = "type")]
    pub channel_type: String,
    pub display_name: String,
    pub name: String,
    pub header: String,
    pub purpose: String,
}

impl Channel {
    pub fn is_direct(&self) -> bool {
        self.channel_type == DIRECT_CHANNEL_TYPE || self.name.contains(DIRECT_CHANNEL_SEPARATOR)
    }
}

/// Channel listing response. Membership details are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ChannelList {
    #[serde(deserialize_with = "null_as_default")]
    pub channels: Vec<Channel>,
}

/// Chat message entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Post {
    pub id: String,
    pub create_at: i64,
    pub update_at: i64,
    pub delete_at: i64,
    pub user_id: String,
    pub channel_id: String,
    pub root_id: String,
    pub parent_id: String,
    pub original_id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub post_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub props: HashMap<String, serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub hashtags: String,
    #[serde(deserialize_with = "null_as_default")]
    pub filenames: Vec<String>,
    pub pending_post_id: String,
}

impl Post {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Page of posts: ids newest first plus the posts keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PostList {
    #[serde(deserialize_with = "null_as_default")]
    pub order: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub posts: HashMap<String, Post>,
}

impl PostList {
    /// Posts in `order`, skipping ids without a body.
    pub fn ordered(&self) -> impl Iterator<Item = &Post> {
        self.order.iter().filter_map(|id| self.posts.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// One record received over the push stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Frame {
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub action: String,
    #[serde(deserialize_with = "null_as_default")]
    pub props: HashMap<String, String>,
}

impl Frame {
    /// Raw JSON of the embedded post, if any.
    pub fn post_payload(&self) -> Option<&str> {
        self.props.get(POST_PROP_KEY).map(String::as_str)
    }
}

/// Uniform representation of one received frame.
///
/// Frames other than [`ACTION_POSTED`] keep `post` as `None` and the string
/// fields empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedMessage {
    pub raw: Frame,
    pub post: Option<Post>,
    /// Team name from the session credentials.
    pub team: String,
    /// Channel name; for direct channels, the other participant's username.
    pub channel: String,
    pub username: String,
    pub text: String,
}

impl NormalizedMessage {
    /// Envelope with only the raw frame and team populated.
    pub fn envelope(raw: Frame, team: impl Into<String>) -> Self {
        Self {
            raw,
            team: team.into(),
            ..Self::default()
        }
    }
}

/// Result of a successful credential exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user: User,
    /// Bearer token for REST calls and the push stream.
    pub token: String,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}
