//! Bridge orchestrator tying one guild's session to its relay channel.
//!
//! Owns the per-guild mutable state (mute expiry, rank roster, pending
//! caches) and runs the event loop: inbound game chat is relayed outward
//! and fed to the correlator, system announcements update guild state,
//! inbound relay messages are shaped into the outbound queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::bridge::cache::BoundedCache;
use crate::bridge::channels::BridgeSideChannels;
use crate::bridge::correlator::{CommandCorrelator, CommandHandle, CommandSpec};
use crate::bridge::outbound::OutboundQueue;
use crate::chat::patterns::{
    command_text, parse_duration, response_matcher, Announcement, AnnouncementRules,
    CommandFamily, CommandParams, ResponseMatcher,
};
use crate::common::error::CommandResult;
use crate::common::messages::RelayInbound;
use crate::common::types::{ChannelKind, ChatEvent, GuildFields, RankRoster};
use crate::config::types::{CacheSettings, PrefixConfig};
use crate::relay::{Relay, RelayPost};
use crate::store::GuildStore;

/// Default deadline for correlated moderation commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Display author used when relaying system announcements.
const ANNOUNCEMENT_AUTHOR: &str = "Guild";

type AbortHandles = Arc<Mutex<BoundedCache<u64, CommandHandle>>>;

/// The per-guild orchestrator.
pub struct Bridge {
    guild_id: String,
    prefixes: PrefixConfig,
    correlator: CommandCorrelator,
    outbound: OutboundQueue,
    relay: Arc<dyn Relay>,
    store: Arc<dyn GuildStore>,
    announcements: AnnouncementRules,
    sweep_interval: Duration,

    /// Guild chat mute expiry; gates relay -> game traffic.
    mute_until: Option<DateTime<Utc>>,
    roster: RankRoster,

    /// Abort handles for in-flight commands, keyed by relay message id.
    abort_handles: AbortHandles,
    /// Recently handled relay message ids, for double-delivery suppression.
    seen_relay_messages: BoundedCache<u64, ()>,
}

impl Bridge {
    pub fn new(
        guild_id: impl Into<String>,
        prefixes: PrefixConfig,
        cache_settings: &CacheSettings,
        correlator: CommandCorrelator,
        outbound: OutboundQueue,
        relay: Arc<dyn Relay>,
        store: Arc<dyn GuildStore>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            prefixes,
            correlator,
            outbound,
            relay,
            store,
            announcements: AnnouncementRules::new(),
            sweep_interval: Duration::from_secs(cache_settings.sweep_interval_secs.max(1)),
            mute_until: None,
            roster: RankRoster::default(),
            abort_handles: Arc::new(Mutex::new(BoundedCache::new(Duration::from_secs(
                cache_settings.abort_max_age_secs,
            )))),
            seen_relay_messages: BoundedCache::with_max_size(
                Duration::from_secs(cache_settings.interaction_max_age_secs),
                cache_settings.max_entries,
            ),
        }
    }

    /// Load persisted guild fields. Called once before the event loop.
    pub async fn load_persisted(&mut self) {
        match self.store.get(&self.guild_id).await {
            Ok(Some(fields)) => {
                self.mute_until = fields.mute_until;
                self.roster = fields.roster;
                info!(
                    guild = %self.guild_id,
                    ranks = self.roster.ranks().len(),
                    "Loaded persisted guild fields"
                );
            }
            Ok(None) => debug!(guild = %self.guild_id, "No persisted guild fields yet"),
            Err(e) => warn!(guild = %self.guild_id, error = %e, "Failed to load guild fields"),
        }
    }

    /// Handle for the moderation layer to run and cancel commands.
    pub fn commander(&self) -> BridgeCommander {
        BridgeCommander {
            correlator: self.correlator.clone(),
            outbound: self.outbound.clone(),
            abort_handles: Arc::clone(&self.abort_handles),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Run the bridge event loop until shutdown or channel closure.
    pub async fn run(mut self, mut channels: BridgeSideChannels) {
        info!(guild = %self.guild_id, "Bridge started");
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = channels.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                msg = channels.relay_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_relay_message(msg),
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_caches();
                }
                changed = channels.shutdown_rx.changed() => {
                    if changed.is_err() || *channels.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!(guild = %self.guild_id, "Bridge stopped");
    }

    /// Process one classified inbound event.
    async fn handle_event(&mut self, event: ChatEvent) {
        // Every event is visible to pending commands, self-authored or not.
        self.correlator.observe(&event);

        match event.kind {
            ChannelKind::Guild | ChannelKind::Officer | ChannelKind::Party => {
                if event.self_authored {
                    debug!(guild = %self.guild_id, "Skipping relay of self-authored line");
                    return;
                }
                let author = event
                    .author
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string());
                self.post_to_relay(RelayPost {
                    author,
                    avatar_url: None,
                    text: event.plain_content.clone(),
                })
                .await;
            }
            ChannelKind::System => {
                if let Some(announcement) = self.announcements.parse(&event.plain_content) {
                    self.apply_announcement(announcement, &event).await;
                } else {
                    debug!(guild = %self.guild_id, line = %event.plain_content, "Unrecognized system line");
                }
            }
            ChannelKind::Whisper => {
                debug!(
                    guild = %self.guild_id,
                    from = ?event.author,
                    "Whisper observed, not relayed"
                );
            }
        }
    }

    /// React to a recognized system announcement.
    async fn apply_announcement(&mut self, announcement: Announcement, event: &ChatEvent) {
        info!(guild = %self.guild_id, ?announcement, "Guild announcement");

        match &announcement {
            Announcement::GuildMuted { duration, .. } => {
                self.mute_until = parse_duration(duration).map(|d| Utc::now() + d);
                if self.mute_until.is_none() {
                    warn!(guild = %self.guild_id, duration = %duration, "Unparseable mute duration");
                }
                self.persist();
            }
            Announcement::GuildUnmuted { .. } => {
                self.mute_until = None;
                self.persist();
            }
            Announcement::Joined { .. }
            | Announcement::Left { .. }
            | Announcement::Kicked { .. }
            | Announcement::Promoted { .. }
            | Announcement::Demoted { .. } => {
                self.refresh_roster().await;
            }
            Announcement::MemberMuted { .. } | Announcement::MemberUnmuted { .. } => {}
        }

        // All announcements are relayed as-is.
        self.post_to_relay(RelayPost {
            author: ANNOUNCEMENT_AUTHOR.to_string(),
            avatar_url: None,
            text: event.plain_content.clone(),
        })
        .await;
    }

    /// Process one message from the linked relay channel.
    fn handle_relay_message(&mut self, msg: RelayInbound) {
        if self.seen_relay_messages.get(&msg.message_id).is_some() {
            debug!(
                guild = %self.guild_id,
                message_id = msg.message_id,
                author_id = msg.author_id,
                "Duplicate relay delivery, skipping"
            );
            return;
        }
        self.seen_relay_messages.insert(msg.message_id, ());

        if let Some(until) = self.mute_until {
            if until > Utc::now() {
                info!(
                    guild = %self.guild_id,
                    author = %msg.author_name,
                    until = %until,
                    "Guild chat is muted, dropping relay message"
                );
                return;
            }
        }

        self.outbound.enqueue(
            self.prefix_for(ChannelKind::Guild),
            &format!("{}: {}", msg.author_name, msg.text),
        );
    }

    fn prefix_for(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::Guild => &self.prefixes.guild,
            ChannelKind::Officer => &self.prefixes.officer,
            ChannelKind::Party => &self.prefixes.party,
            _ => "",
        }
    }

    async fn post_to_relay(&self, post: RelayPost) {
        if let Err(e) = self.relay.post(post).await {
            error!(guild = %self.guild_id, error = %e, "Failed to post to relay channel");
        }
    }

    /// Re-read persisted roster fields after membership changes.
    async fn refresh_roster(&mut self) {
        match self.store.get(&self.guild_id).await {
            Ok(Some(fields)) => {
                self.roster = fields.roster;
                debug!(guild = %self.guild_id, "Roster refreshed");
            }
            Ok(None) => {}
            Err(e) => warn!(guild = %self.guild_id, error = %e, "Roster refresh failed"),
        }
    }

    /// Persist current guild fields, fire-and-forget.
    fn persist(&self) {
        let store = Arc::clone(&self.store);
        let guild_id = self.guild_id.clone();
        let fields = GuildFields {
            mute_until: self.mute_until,
            roster: self.roster.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = store.save(&guild_id, fields).await {
                warn!(guild = %guild_id, error = %e, "Failed to persist guild fields");
            }
        });
    }

    fn sweep_caches(&mut self) {
        let swept = self.seen_relay_messages.sweep()
            + self.abort_handles.lock().unwrap().sweep();
        if swept > 0 {
            debug!(guild = %self.guild_id, swept, "Swept expired cache entries");
        }
    }
}

/// Cheap handle the moderation layer uses to execute commands against one
/// bridge's session.
#[derive(Clone)]
pub struct BridgeCommander {
    correlator: CommandCorrelator,
    outbound: OutboundQueue,
    abort_handles: AbortHandles,
    timeout: Duration,
}

impl BridgeCommander {
    /// Run a moderation command family and await the correlated response.
    pub async fn run_command(
        &self,
        family: CommandFamily,
        params: &CommandParams,
    ) -> CommandResult<ChatEvent> {
        let matcher = response_matcher(family, params);
        self.run_raw(command_text(family, params), matcher, self.timeout, None)
            .await
    }

    /// Like [`run_command`](Self::run_command), registering an abort handle
    /// under the relay message id that triggered it.
    pub async fn run_command_tagged(
        &self,
        family: CommandFamily,
        params: &CommandParams,
        message_id: u64,
    ) -> CommandResult<ChatEvent> {
        let matcher = response_matcher(family, params);
        self.run_raw(
            command_text(family, params),
            matcher,
            self.timeout,
            Some(message_id),
        )
        .await
    }

    /// Run an arbitrary command against explicit patterns and deadline.
    pub async fn run_raw(
        &self,
        command: String,
        matcher: ResponseMatcher,
        timeout: Duration,
        message_id: Option<u64>,
    ) -> CommandResult<ChatEvent> {
        let registered = self.correlator.register(CommandSpec {
            command: command.clone(),
            success: matcher.success,
            abort: Some(matcher.abort),
            timeout,
        });

        if let Some(id) = message_id {
            self.abort_handles
                .lock()
                .unwrap()
                .insert(id, registered.handle());
        }

        self.outbound.enqueue_command(&command);
        let result = registered.wait().await;

        if let Some(id) = message_id {
            self.abort_handles.lock().unwrap().take(&id);
        }
        result
    }

    /// Cancel the in-flight command registered under a relay message id.
    pub fn cancel(&self, message_id: u64) -> bool {
        match self.abort_handles.lock().unwrap().take(&message_id) {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }
}
