//! Chat line classification.
//!
//! Turns a flattened chat packet body into a structured [`ChatEvent`].
//! Classification is derived purely from the line's content; anything the
//! channel-marker patterns don't recognize degrades to a System event.

use chrono::Utc;
use fancy_regex::Regex;
use tracing::debug;

use crate::common::types::{ChannelKind, ChatEvent};
use crate::protocol::text::strip_legacy_codes;

/// Classifier for inbound chat lines.
///
/// Owns its compiled patterns; one instance per bridge so guilds stay
/// independent. Knows the bridging account's own name so self-authored
/// lines can be tagged for the relay to skip.
#[derive(Debug)]
pub struct Classifier {
    own_name: String,
    /// "Guild > [MVP+] Foo [Staff]: msg" and the Officer/Party variants.
    channel_line: Regex,
    /// "From [VIP] Foo: msg" / "To Foo: msg".
    whisper_line: Regex,
}

impl Classifier {
    pub fn new(own_name: impl Into<String>) -> Self {
        Self {
            own_name: own_name.into(),
            channel_line: Regex::new(
                r"^(?P<chan>Guild|Officer|Party) > (?:\[[^\]]+\] )?(?P<name>\w+)(?: \[[^\]]+\])?: (?P<msg>.*)$",
            )
            .unwrap(),
            whisper_line: Regex::new(
                r"^(?P<dir>From|To) (?:\[[^\]]+\] )?(?P<name>\w+): (?P<msg>.*)$",
            )
            .unwrap(),
        }
    }

    /// Classify one raw chat line.
    ///
    /// Never fails: unparseable input produces a System event carrying the
    /// whole line.
    pub fn classify(&self, raw: &str) -> ChatEvent {
        let plain = strip_legacy_codes(raw);

        if let Ok(Some(caps)) = self.channel_line.captures(&plain) {
            let kind = match caps.name("chan").map(|m| m.as_str()) {
                Some("Guild") => ChannelKind::Guild,
                Some("Officer") => ChannelKind::Officer,
                _ => ChannelKind::Party,
            };
            let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
            let msg = caps.name("msg").map(|m| m.as_str()).unwrap_or_default();

            return ChatEvent {
                kind,
                author: Some(name.to_string()),
                raw_content: raw.to_string(),
                plain_content: msg.to_string(),
                self_authored: name.eq_ignore_ascii_case(&self.own_name),
                timestamp: Utc::now(),
            };
        }

        if let Ok(Some(caps)) = self.whisper_line.captures(&plain) {
            let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
            let msg = caps.name("msg").map(|m| m.as_str()).unwrap_or_default();
            // "To X: ..." lines are our own outgoing whispers echoed back.
            let outgoing = caps.name("dir").map(|m| m.as_str()) == Some("To");

            return ChatEvent {
                kind: ChannelKind::Whisper,
                author: Some(name.to_string()),
                raw_content: raw.to_string(),
                plain_content: msg.to_string(),
                self_authored: outgoing || name.eq_ignore_ascii_case(&self.own_name),
                timestamp: Utc::now(),
            };
        }

        debug!(line = %plain, "No channel marker, classifying as system");
        ChatEvent::system(raw.to_string(), plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new("Bridgekeeper")
    }

    #[test]
    fn test_guild_line_with_rank_prefix() {
        let event = classifier().classify("Guild > [MVP+] Foo: hello there");

        assert_eq!(event.kind, ChannelKind::Guild);
        assert_eq!(event.author.as_deref(), Some("Foo"));
        assert_eq!(event.plain_content, "hello there");
        assert!(!event.self_authored);
    }

    #[test]
    fn test_guild_line_with_guild_rank_tag() {
        let event = classifier().classify("Guild > [VIP] Foo [Officer]: promoted anyone?");

        assert_eq!(event.kind, ChannelKind::Guild);
        assert_eq!(event.author.as_deref(), Some("Foo"));
        assert_eq!(event.plain_content, "promoted anyone?");
    }

    #[test]
    fn test_guild_line_without_rank() {
        let event = classifier().classify("Guild > Foo: plain member here");

        assert_eq!(event.kind, ChannelKind::Guild);
        assert_eq!(event.author.as_deref(), Some("Foo"));
    }

    #[test]
    fn test_officer_line() {
        let event = classifier().classify("Officer > [Staff] Mod: secret stuff");

        assert_eq!(event.kind, ChannelKind::Officer);
        assert_eq!(event.author.as_deref(), Some("Mod"));
        assert_eq!(event.plain_content, "secret stuff");
    }

    #[test]
    fn test_party_line() {
        let event = classifier().classify("Party > Foo: ready?");

        assert_eq!(event.kind, ChannelKind::Party);
        assert_eq!(event.author.as_deref(), Some("Foo"));
    }

    #[test]
    fn test_whisper_from() {
        let event = classifier().classify("From [VIP] Foo: psst");

        assert_eq!(event.kind, ChannelKind::Whisper);
        assert_eq!(event.author.as_deref(), Some("Foo"));
        assert_eq!(event.plain_content, "psst");
        assert!(!event.self_authored);
    }

    #[test]
    fn test_whisper_to_is_self_authored() {
        let event = classifier().classify("To Foo: reply");

        assert_eq!(event.kind, ChannelKind::Whisper);
        assert!(event.self_authored);
    }

    #[test]
    fn test_formatting_codes_stripped_from_plain() {
        let event = classifier().classify("\u{a7}2Guild > \u{a7}6[MVP+] Foo\u{a7}f: \u{a7}chi");

        assert_eq!(event.kind, ChannelKind::Guild);
        assert_eq!(event.plain_content, "hi");
        // Raw keeps the codes.
        assert!(event.raw_content.contains('\u{a7}'));
    }

    #[test]
    fn test_self_authored_guild_line() {
        let event = classifier().classify("Guild > Bridgekeeper: relayed text");

        assert!(event.self_authored);
        assert_eq!(event.kind, ChannelKind::Guild);
    }

    #[test]
    fn test_unrecognized_line_becomes_system() {
        let event = classifier().classify("Foo was promoted from Member to Officer");

        assert_eq!(event.kind, ChannelKind::System);
        assert!(event.author.is_none());
        assert_eq!(
            event.plain_content,
            "Foo was promoted from Member to Officer"
        );
    }

    #[test]
    fn test_garbage_never_panics() {
        for line in ["", "   ", "::::", "> >", "\u{a7}", "Guild >", "From :"] {
            let event = classifier().classify(line);
            assert_eq!(event.kind, ChannelKind::System);
        }
    }
}
