//! Client configuration.

use serde::Deserialize;
use uuid::Uuid;

use mcje_crypto::offline_uuid;
use mcje_proto::version;

/// Connection settings. Deserializable so callers can keep them in a config
/// file; every field has a sensible default except the username.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Explicit profile UUID; defaults to the offline-mode UUID.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default = "default_version")]
    pub protocol_version: i32,
    /// Session-server join on encryption. Requires `access_token` and
    /// `selected_profile`.
    #[serde(default)]
    pub online_mode: bool,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Profile id (undashed UUID) for the session join payload.
    #[serde(default)]
    pub selected_profile: Option<String>,
    #[serde(default = "default_true")]
    pub auto_keep_alive: bool,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_session_server")]
    pub session_server: String,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    version::DEFAULT_PORT
}

fn default_version() -> i32 {
    version::LATEST_VERSION
}

fn default_true() -> bool {
    true
}

fn default_ping_timeout_ms() -> u64 {
    10_000
}

fn default_session_server() -> String {
    "https://sessionserver.mojang.com/session/minecraft/join".into()
}

impl ClientOptions {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: username.into(),
            uuid: None,
            protocol_version: default_version(),
            online_mode: false,
            access_token: None,
            selected_profile: None,
            auto_keep_alive: true,
            ping_timeout_ms: default_ping_timeout_ms(),
            session_server: default_session_server(),
        }
    }

    /// The UUID sent in `login_start`.
    pub fn player_uuid(&self) -> Uuid {
        self.uuid.unwrap_or_else(|| offline_uuid(&self.username))
    }
}
