//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod reconnect;
pub mod types;

pub use messages::{RelayInbound, SessionStatus};
pub use types::{ChannelKind, ChatEvent, GuildFields, GuildRank, RankRoster, SessionState};
