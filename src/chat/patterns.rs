//! Response patterns for moderation command families and system
//! announcements.
//!
//! The literal wordings here are a compatibility contract with the guild
//! server's exact response strings, punctuation included. They are pure
//! data: building a matcher does no I/O and is deterministic for given
//! parameters.

use chrono::Duration;
use fancy_regex::Regex;

/// A moderation command family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    Promote,
    Demote,
    SetRank,
    Mute,
    Unmute,
    Invite,
    Kick,
}

/// Parameters a command is built from.
#[derive(Debug, Clone, Default)]
pub struct CommandParams {
    pub player: String,
    /// Target rank, for SetRank.
    pub rank: Option<String>,
    /// Mute duration in server shorthand ("7d", "2h", "30m").
    pub duration: Option<String>,
    /// Kick reason.
    pub reason: Option<String>,
}

impl CommandParams {
    pub fn player(name: impl Into<String>) -> Self {
        Self {
            player: name.into(),
            ..Default::default()
        }
    }
}

/// Compiled success/abort patterns for one issued command.
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    pub success: Regex,
    pub abort: Regex,
}

/// Render the in-game command text for a family and parameters
/// (without the leading slash).
pub fn command_text(family: CommandFamily, params: &CommandParams) -> String {
    match family {
        CommandFamily::Promote => format!("g promote {}", params.player),
        CommandFamily::Demote => format!("g demote {}", params.player),
        CommandFamily::SetRank => format!(
            "g setrank {} {}",
            params.player,
            params.rank.as_deref().unwrap_or_default()
        ),
        CommandFamily::Mute => format!(
            "g mute {} {}",
            params.player,
            params.duration.as_deref().unwrap_or("1h")
        ),
        CommandFamily::Unmute => format!("g unmute {}", params.player),
        CommandFamily::Invite => format!("g invite {}", params.player),
        CommandFamily::Kick => format!(
            "g kick {} {}",
            params.player,
            params.reason.as_deref().unwrap_or("Removed by moderation")
        ),
    }
}

/// Build the success/abort matcher for a family and parameters.
pub fn response_matcher(family: CommandFamily, params: &CommandParams) -> ResponseMatcher {
    let player = escape_literal(&params.player);

    let success = match family {
        CommandFamily::Promote => format!(
            r"(?P<target>{player}) was promoted from (?P<old_rank>[\w ]+) to (?P<new_rank>[\w ]+)"
        ),
        CommandFamily::Demote => format!(
            r"(?P<target>{player}) was demoted from (?P<old_rank>[\w ]+) to (?P<new_rank>[\w ]+)"
        ),
        CommandFamily::SetRank => format!(
            r"(?P<target>{player}) was (?:promoted|demoted) from (?P<old_rank>[\w ]+) to (?P<new_rank>[\w ]+)"
        ),
        CommandFamily::Mute => {
            if params.player.eq_ignore_ascii_case("everyone") {
                r"(?P<executor>\w+) has muted the guild chat for (?P<duration>\S+)".to_string()
            } else {
                format!(r"(?P<executor>\w+) has muted (?P<target>{player}) for (?P<duration>\S+)")
            }
        }
        CommandFamily::Unmute => {
            if params.player.eq_ignore_ascii_case("everyone") {
                r"(?P<executor>\w+) has unmuted the guild chat!".to_string()
            } else {
                format!(r"(?P<executor>\w+) has unmuted (?P<target>{player})")
            }
        }
        CommandFamily::Invite => format!(
            r"You (?:invited|sent an offline invite to) (?P<target>{player})\b"
        ),
        CommandFamily::Kick => format!(
            r"(?P<target>{player}) was kicked from the guild by (?P<executor>\w+)!"
        ),
    };

    let mut aborts = generic_abort_lines(&player);
    aborts.extend(family_abort_lines(family, params));
    let abort = aborts
        .into_iter()
        .map(|line| format!("(?:{})", line))
        .collect::<Vec<_>>()
        .join("|");

    ResponseMatcher {
        success: compile(&success),
        abort: compile(&abort),
    }
}

/// Error wordings shared by every family.
fn generic_abort_lines(player: &str) -> Vec<String> {
    vec![
        escape_literal("You must be the Guild Master to use that command!"),
        escape_literal("You do not have permission to use this command!"),
        format!(
            r"Can't find a player by the name of '{}'",
            player
        ),
        format!(r"{} is not in your guild!", player),
    ]
}

/// Error wordings specific to one family.
fn family_abort_lines(family: CommandFamily, params: &CommandParams) -> Vec<String> {
    let player = escape_literal(&params.player);
    match family {
        CommandFamily::Promote => vec![
            format!(r"{} is already the highest rank you've created!", player),
            escape_literal("You can only promote up to your own rank!"),
        ],
        CommandFamily::Demote => vec![
            format!(r"{} is already the lowest rank you've created!", player),
            format!(r"{} is the guild master so can't be demoted!", player),
            escape_literal("You can only demote up to your own rank!"),
        ],
        CommandFamily::SetRank => {
            let rank = escape_literal(params.rank.as_deref().unwrap_or_default());
            vec![
                format!(r"I couldn't find a rank by the name of '{}'!", rank),
                escape_literal("You can only promote up to your own rank!"),
                escape_literal("You can only demote up to your own rank!"),
            ]
        }
        CommandFamily::Mute => vec![
            escape_literal("This player is already muted!"),
            escape_literal("You cannot mute a guild member with a higher guild rank!"),
            escape_literal("You cannot mute someone for more than one month"),
            escape_literal("You cannot mute someone for less than a minute"),
        ],
        CommandFamily::Unmute => vec![escape_literal("This player is not muted!")],
        CommandFamily::Invite => vec![
            format!(r"{} is already in your guild!", player),
            format!(r"{} is already in another guild!", player),
            format!(
                r"You've already invited {} to your guild! Wait for them to accept!",
                player
            ),
            format!(r"{} has guild invites disabled!", player),
        ],
        CommandFamily::Kick => vec![escape_literal(
            "You cannot kick yourself from the guild!",
        )],
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).unwrap()
}

/// Escape a literal for embedding into a pattern.
fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == ' ' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// A recognized system announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    Joined {
        player: String,
    },
    Left {
        player: String,
    },
    Kicked {
        player: String,
        by: String,
    },
    Promoted {
        player: String,
        old_rank: String,
        new_rank: String,
    },
    Demoted {
        player: String,
        old_rank: String,
        new_rank: String,
    },
    GuildMuted {
        by: String,
        duration: String,
    },
    GuildUnmuted {
        by: String,
    },
    MemberMuted {
        by: String,
        target: String,
        duration: String,
    },
    MemberUnmuted {
        by: String,
        target: String,
    },
}

#[derive(Debug, Clone, Copy)]
enum AnnouncementKind {
    Joined,
    Left,
    Kicked,
    Promoted,
    Demoted,
    GuildMuted,
    GuildUnmuted,
    MemberMuted,
    MemberUnmuted,
}

/// Rule table for system announcements.
///
/// Rules are checked in order; the guild-wide mute wordings come before
/// the per-member ones.
#[derive(Debug)]
pub struct AnnouncementRules {
    rules: Vec<(AnnouncementKind, Regex)>,
}

impl Default for AnnouncementRules {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnouncementRules {
    pub fn new() -> Self {
        let rule = |kind, pattern: &str| (kind, compile(pattern));
        Self {
            rules: vec![
                rule(AnnouncementKind::Joined, r"^(?P<player>\w+) joined the guild!$"),
                rule(AnnouncementKind::Left, r"^(?P<player>\w+) left the guild!$"),
                rule(
                    AnnouncementKind::Kicked,
                    r"^(?P<player>\w+) was kicked from the guild by (?P<by>\w+)!$",
                ),
                rule(
                    AnnouncementKind::Promoted,
                    r"^(?P<player>\w+) was promoted from (?P<old_rank>[\w ]+) to (?P<new_rank>[\w ]+)$",
                ),
                rule(
                    AnnouncementKind::Demoted,
                    r"^(?P<player>\w+) was demoted from (?P<old_rank>[\w ]+) to (?P<new_rank>[\w ]+)$",
                ),
                rule(
                    AnnouncementKind::GuildMuted,
                    r"^(?P<by>\w+) has muted the guild chat for (?P<duration>\S+)!?$",
                ),
                rule(
                    AnnouncementKind::GuildUnmuted,
                    r"^(?P<by>\w+) has unmuted the guild chat!$",
                ),
                rule(
                    AnnouncementKind::MemberMuted,
                    r"^(?P<by>\w+) has muted (?P<target>\w+) for (?P<duration>\S+)$",
                ),
                rule(
                    AnnouncementKind::MemberUnmuted,
                    r"^(?P<by>\w+) has unmuted (?P<target>\w+)$",
                ),
            ],
        }
    }

    /// Parse a plain system line into an announcement, if recognized.
    pub fn parse(&self, plain: &str) -> Option<Announcement> {
        for (kind, regex) in &self.rules {
            let caps = match regex.captures(plain) {
                Ok(Some(caps)) => caps,
                _ => continue,
            };
            let get = |name: &str| {
                caps.name(name)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            };
            return Some(match kind {
                AnnouncementKind::Joined => Announcement::Joined { player: get("player") },
                AnnouncementKind::Left => Announcement::Left { player: get("player") },
                AnnouncementKind::Kicked => Announcement::Kicked {
                    player: get("player"),
                    by: get("by"),
                },
                AnnouncementKind::Promoted => Announcement::Promoted {
                    player: get("player"),
                    old_rank: get("old_rank"),
                    new_rank: get("new_rank"),
                },
                AnnouncementKind::Demoted => Announcement::Demoted {
                    player: get("player"),
                    old_rank: get("old_rank"),
                    new_rank: get("new_rank"),
                },
                AnnouncementKind::GuildMuted => Announcement::GuildMuted {
                    by: get("by"),
                    duration: get("duration"),
                },
                AnnouncementKind::GuildUnmuted => Announcement::GuildUnmuted { by: get("by") },
                AnnouncementKind::MemberMuted => Announcement::MemberMuted {
                    by: get("by"),
                    target: get("target"),
                    duration: get("duration"),
                },
                AnnouncementKind::MemberUnmuted => Announcement::MemberUnmuted {
                    by: get("by"),
                    target: get("target"),
                },
            });
        }
        None
    }
}

/// Parse a server mute-duration shorthand ("7d", "2h", "30m", "45s").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let mut chars = s.chars();
    let unit = chars.next_back()?;
    let value: i64 = chars.as_str().parse().ok()?;
    match unit {
        'd' => Some(Duration::days(value)),
        'h' => Some(Duration::hours(value)),
        'm' => Some(Duration::minutes(value)),
        's' => Some(Duration::seconds(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(regex: &Regex, text: &str) -> bool {
        regex.is_match(text).unwrap()
    }

    #[test]
    fn test_promote_success_with_groups() {
        let matcher = response_matcher(CommandFamily::Promote, &CommandParams::player("Foo"));
        let line = "Foo was promoted from Member to Officer";

        let caps = matcher.success.captures(line).unwrap().unwrap();
        assert_eq!(caps.name("target").unwrap().as_str(), "Foo");
        assert_eq!(caps.name("old_rank").unwrap().as_str(), "Member");
        assert_eq!(caps.name("new_rank").unwrap().as_str(), "Officer");
    }

    #[test]
    fn test_promote_matching_is_case_insensitive() {
        let matcher = response_matcher(CommandFamily::Promote, &CommandParams::player("Foo"));
        assert!(matches(&matcher.success, "foo WAS PROMOTED from Member to Officer"));
    }

    #[test]
    fn test_promote_ignores_other_players() {
        let matcher = response_matcher(CommandFamily::Promote, &CommandParams::player("Foo"));
        assert!(!matches(&matcher.success, "Bar was promoted from Member to Officer"));
    }

    #[test]
    fn test_demote_success() {
        let matcher = response_matcher(CommandFamily::Demote, &CommandParams::player("Foo"));
        let line = "Foo was demoted from Officer to Member";

        let caps = matcher.success.captures(line).unwrap().unwrap();
        assert_eq!(caps.name("old_rank").unwrap().as_str(), "Officer");
        assert_eq!(caps.name("new_rank").unwrap().as_str(), "Member");
    }

    #[test]
    fn test_setrank_matches_either_direction() {
        let matcher = response_matcher(CommandFamily::SetRank, &CommandParams {
            player: "Foo".to_string(),
            rank: Some("Veteran".to_string()),
            ..Default::default()
        });

        assert!(matches(&matcher.success, "Foo was promoted from Member to Veteran"));
        assert!(matches(&matcher.success, "Foo was demoted from Officer to Veteran"));
    }

    #[test]
    fn test_mute_success_captures_duration() {
        let matcher = response_matcher(CommandFamily::Mute, &CommandParams {
            player: "Foo".to_string(),
            duration: Some("7d".to_string()),
            ..Default::default()
        });

        let caps = matcher
            .success
            .captures("Mod has muted Foo for 7d")
            .unwrap()
            .unwrap();
        assert_eq!(caps.name("executor").unwrap().as_str(), "Mod");
        assert_eq!(caps.name("duration").unwrap().as_str(), "7d");
    }

    #[test]
    fn test_guild_wide_mute_success() {
        let matcher = response_matcher(CommandFamily::Mute, &CommandParams {
            player: "everyone".to_string(),
            duration: Some("1h".to_string()),
            ..Default::default()
        });

        assert!(matches(&matcher.success, "Mod has muted the guild chat for 1h"));
    }

    #[test]
    fn test_invite_success_both_wordings() {
        let matcher = response_matcher(CommandFamily::Invite, &CommandParams::player("Foo"));

        assert!(matches(
            &matcher.success,
            "You invited Foo to your guild. They have 5 minutes to accept."
        ));
        assert!(matches(
            &matcher.success,
            "You sent an offline invite to Foo! They will have 5 minutes to accept once they come online!"
        ));
    }

    #[test]
    fn test_kick_success_captures_executor() {
        let matcher = response_matcher(CommandFamily::Kick, &CommandParams::player("Foo"));

        let caps = matcher
            .success
            .captures("Foo was kicked from the guild by Mod!")
            .unwrap()
            .unwrap();
        assert_eq!(caps.name("executor").unwrap().as_str(), "Mod");
    }

    #[test]
    fn test_generic_errors_abort_every_family() {
        for family in [
            CommandFamily::Promote,
            CommandFamily::Demote,
            CommandFamily::SetRank,
            CommandFamily::Mute,
            CommandFamily::Unmute,
            CommandFamily::Invite,
            CommandFamily::Kick,
        ] {
            let matcher = response_matcher(family, &CommandParams::player("Foo"));
            assert!(
                matches(&matcher.abort, "You do not have permission to use this command!"),
                "{:?} should abort on the generic permission error",
                family
            );
            assert!(
                matches(&matcher.abort, "Can't find a player by the name of 'Foo'"),
                "{:?} should abort on player-not-found",
                family
            );
        }
    }

    #[test]
    fn test_family_specific_aborts() {
        let promote = response_matcher(CommandFamily::Promote, &CommandParams::player("Foo"));
        assert!(matches(
            &promote.abort,
            "Foo is already the highest rank you've created!"
        ));

        let invite = response_matcher(CommandFamily::Invite, &CommandParams::player("Foo"));
        assert!(matches(&invite.abort, "Foo is already in another guild!"));

        let setrank = response_matcher(CommandFamily::SetRank, &CommandParams {
            player: "Foo".to_string(),
            rank: Some("Veteran".to_string()),
            ..Default::default()
        });
        assert!(matches(
            &setrank.abort,
            "I couldn't find a rank by the name of 'Veteran'!"
        ));
    }

    #[test]
    fn test_player_names_are_escaped() {
        // A hostile name must not inject pattern syntax.
        let matcher = response_matcher(
            CommandFamily::Promote,
            &CommandParams::player("Fo.o(+)"),
        );
        assert!(!matches(&matcher.success, "FoXo was promoted from A to B"));
    }

    #[test]
    fn test_command_text_rendering() {
        assert_eq!(
            command_text(CommandFamily::Promote, &CommandParams::player("Foo")),
            "g promote Foo"
        );
        assert_eq!(
            command_text(CommandFamily::SetRank, &CommandParams {
                player: "Foo".to_string(),
                rank: Some("Veteran".to_string()),
                ..Default::default()
            }),
            "g setrank Foo Veteran"
        );
        assert_eq!(
            command_text(CommandFamily::Mute, &CommandParams {
                player: "Foo".to_string(),
                duration: Some("7d".to_string()),
                ..Default::default()
            }),
            "g mute Foo 7d"
        );
    }

    #[test]
    fn test_announcement_join_leave_kick() {
        let rules = AnnouncementRules::new();

        assert_eq!(
            rules.parse("Foo joined the guild!"),
            Some(Announcement::Joined { player: "Foo".to_string() })
        );
        assert_eq!(
            rules.parse("Foo left the guild!"),
            Some(Announcement::Left { player: "Foo".to_string() })
        );
        assert_eq!(
            rules.parse("Foo was kicked from the guild by Mod!"),
            Some(Announcement::Kicked {
                player: "Foo".to_string(),
                by: "Mod".to_string()
            })
        );
    }

    #[test]
    fn test_announcement_guild_mute_not_shadowed_by_member_mute() {
        let rules = AnnouncementRules::new();

        assert_eq!(
            rules.parse("Mod has muted the guild chat for 1d"),
            Some(Announcement::GuildMuted {
                by: "Mod".to_string(),
                duration: "1d".to_string()
            })
        );
        assert_eq!(
            rules.parse("Mod has muted Foo for 1d"),
            Some(Announcement::MemberMuted {
                by: "Mod".to_string(),
                target: "Foo".to_string(),
                duration: "1d".to_string()
            })
        );
    }

    #[test]
    fn test_announcement_promotion() {
        let rules = AnnouncementRules::new();

        assert_eq!(
            rules.parse("Foo was promoted from Member to Guild Master"),
            Some(Announcement::Promoted {
                player: "Foo".to_string(),
                old_rank: "Member".to_string(),
                new_rank: "Guild Master".to_string()
            })
        );
    }

    #[test]
    fn test_unrecognized_line_is_none() {
        let rules = AnnouncementRules::new();
        assert_eq!(rules.parse("Welcome to the server!"), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_duration("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("forever"), None);
        assert_eq!(parse_duration(""), None);
    }
}
