//! Shared types used across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which in-game channel a chat line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Guild,
    Officer,
    Party,
    Whisper,
    System,
}

/// Lifecycle of the game connection for one guild link.
///
/// At most one live session exists per link; `Connecting` and `LoggingIn`
/// never overlap across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    LoggingIn,
    /// Logged in and placed in the world; chat not yet confirmed flowing.
    Spawned,
    /// Keep-alives observed; the session accepts outbound sends.
    Ready,
    Disconnected,
}

/// A classified inbound chat line.
///
/// Produced purely by the classifier from a flattened chat packet; carries
/// both the raw text (formatting codes intact) and the stripped plain text
/// the pattern layer matches against.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub kind: ChannelKind,
    /// Author name, None for system lines.
    pub author: Option<String>,
    /// Original line including legacy formatting codes.
    pub raw_content: String,
    /// Line with formatting codes stripped.
    pub plain_content: String,
    /// True when the author is the bridging account itself.
    pub self_authored: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    /// A system event wrapping the given line. Used for degraded input.
    pub fn system(raw: String, plain: String) -> Self {
        Self {
            kind: ChannelKind::System,
            author: None,
            raw_content: raw,
            plain_content: plain,
            self_authored: false,
            timestamp: Utc::now(),
        }
    }
}

/// Permissions attached to a guild rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankPermissions {
    #[serde(default)]
    pub can_invite: bool,
    #[serde(default)]
    pub can_kick: bool,
    #[serde(default)]
    pub can_mute: bool,
    #[serde(default)]
    pub can_promote: bool,
}

/// One rank in the guild's rank ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRank {
    pub name: String,
    /// Lower number = higher rank.
    pub priority: u8,
    #[serde(default)]
    pub permissions: RankPermissions,
}

/// The guild's rank ladder, ordered by priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRoster {
    ranks: Vec<GuildRank>,
}

impl RankRoster {
    pub fn new(mut ranks: Vec<GuildRank>) -> Self {
        ranks.sort_by_key(|r| r.priority);
        Self { ranks }
    }

    /// Look a rank up by name, case-insensitively.
    pub fn find(&self, name: &str) -> Option<&GuildRank> {
        self.ranks
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn ranks(&self) -> &[GuildRank] {
        &self.ranks
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Persisted per-guild fields. In-memory state is authoritative until
/// restart; writes are fire-and-forget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildFields {
    pub mute_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub roster: RankRoster,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_lookup_is_case_insensitive() {
        let roster = RankRoster::new(vec![
            GuildRank {
                name: "Officer".to_string(),
                priority: 1,
                permissions: RankPermissions::default(),
            },
            GuildRank {
                name: "Member".to_string(),
                priority: 2,
                permissions: RankPermissions::default(),
            },
        ]);

        assert!(roster.find("officer").is_some());
        assert!(roster.find("OFFICER").is_some());
        assert!(roster.find("guest").is_none());
    }

    #[test]
    fn test_roster_orders_by_priority() {
        let roster = RankRoster::new(vec![
            GuildRank {
                name: "Member".to_string(),
                priority: 3,
                permissions: RankPermissions::default(),
            },
            GuildRank {
                name: "Guild Master".to_string(),
                priority: 0,
                permissions: RankPermissions::default(),
            },
        ]);

        assert_eq!(roster.ranks()[0].name, "Guild Master");
    }
}
