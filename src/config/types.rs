//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// One entry per administered guild.
    pub guilds: Vec<GuildLinkConfig>,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

/// Association between one in-game guild and one relay channel.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildLinkConfig {
    /// Stable identifier used for persistence and logging.
    pub guild_id: String,
    pub account: AccountConfig,
    pub server: ServerConfig,
    pub relay: RelayChannelConfig,
    /// Command prefix overrides per channel kind.
    #[serde(default)]
    pub prefixes: PrefixConfig,
}

/// Account credentials for the bridging character.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    /// Session token presented at login. Optional for offline-auth servers.
    pub token: Option<String>,
}

/// Game server connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// "legacy" or "modern"; decides packet ids and the chat length cap.
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// The linked relay channel.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayChannelConfig {
    pub channel_id: u64,
    pub webhook_url: String,
}

/// Per-channel-kind command prefixes.
#[derive(Debug, Clone, Deserialize)]
pub struct PrefixConfig {
    #[serde(default = "default_guild_prefix")]
    pub guild: String,
    #[serde(default = "default_officer_prefix")]
    pub officer: String,
    #[serde(default = "default_party_prefix")]
    pub party: String,
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            guild: default_guild_prefix(),
            officer: default_officer_prefix(),
            party: default_party_prefix(),
        }
    }
}

/// Outbound chat shaping settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    /// Overrides the protocol-version-derived chat length cap.
    pub max_chat_len: Option<usize>,
    #[serde(default = "default_min_send_delay_ms")]
    pub min_send_delay_ms: u64,
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// Filler tokens appended to near-duplicate sends.
    #[serde(default = "default_padding_tokens")]
    pub padding_tokens: Vec<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_chat_len: None,
            min_send_delay_ms: default_min_send_delay_ms(),
            max_queue_depth: default_max_queue_depth(),
            padding_tokens: default_padding_tokens(),
        }
    }
}

/// TTL cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Max age for single-use interaction entries (5 minutes).
    #[serde(default = "default_interaction_max_age_secs")]
    pub interaction_max_age_secs: u64,
    /// Max age for command abort handles (15 minutes).
    #[serde(default = "default_abort_max_age_secs")]
    pub abort_max_age_secs: u64,
    /// Hard entry cap for the size-bounded caches.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            interaction_max_age_secs: default_interaction_max_age_secs(),
            abort_max_age_secs: default_abort_max_age_secs(),
            max_entries: default_max_entries(),
        }
    }
}

/// Reconnection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Refused logins tolerated before the session is declared dead.
    #[serde(default = "default_auth_retry_limit")]
    pub auth_retry_limit: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            auth_retry_limit: default_auth_retry_limit(),
        }
    }
}

fn default_protocol() -> String {
    "modern".to_string()
}

fn default_guild_prefix() -> String {
    "/gc".to_string()
}

fn default_officer_prefix() -> String {
    "/oc".to_string()
}

fn default_party_prefix() -> String {
    "/pc".to_string()
}

fn default_min_send_delay_ms() -> u64 {
    600
}

fn default_max_queue_depth() -> usize {
    50
}

fn default_padding_tokens() -> Vec<String> {
    ["<>", "<->", "~", "-", "|"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_interaction_max_age_secs() -> u64 {
    300
}

fn default_abort_max_age_secs() -> u64 {
    900
}

fn default_max_entries() -> usize {
    200
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    300
}

fn default_auth_retry_limit() -> u32 {
    3
}
