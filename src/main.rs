//! Warden - clientless guild chat bridge
//!
//! Connects a persistent account to the game server for each administered
//! guild and relays messages between in-game guild chat and the linked
//! relay channel, with moderation commands correlated against chat output.

mod bridge;
mod chat;
mod common;
mod config;
mod game;
mod protocol;
mod relay;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use bridge::{Bridge, BridgeCommander, ChannelBundle, CommandCorrelator, OutboundQueue, OutboundSettings};
use common::messages::{RelayInbound, SessionStatus};
use config::{env::get_config_path, load_and_validate, Config, GuildLinkConfig};
use game::{Session, SessionRunner, SessionSettings};
use protocol::ProtocolVersion;
use relay::WebhookRelay;
use store::{GuildStore, MemoryStore};

/// Live handles for one administered guild.
///
/// `relay_tx` and `commander` are the seams where the relay transport and
/// the moderation command layer plug in.
struct GuildHandle {
    guild_id: String,
    shutdown_tx: watch::Sender<bool>,
    #[allow(dead_code)]
    relay_tx: mpsc::UnboundedSender<RelayInbound>,
    #[allow(dead_code)]
    commander: BridgeCommander,
    #[allow(dead_code)]
    session: Arc<Session>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Warden v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!(
            "Please ensure {} exists and is properly formatted.",
            config_path
        );
        e
    })?;

    info!(
        "Configuration loaded successfully: {} guild link(s)",
        config.guilds.len()
    );

    let store: Arc<dyn GuildStore> = Arc::new(MemoryStore::new());

    // One independent bridge/session pair per administered guild.
    let mut guilds = Vec::new();
    for link in &config.guilds {
        let handle = spawn_guild_link(link, &config, Arc::clone(&store)).await?;
        info!(guild = %handle.guild_id, "Guild link started");
        guilds.push(handle);
    }

    shutdown_signal().await;
    info!("Shutdown signal received - stopping guild bridges...");

    for guild in &guilds {
        // Fire-and-forget: a closed channel means the tasks already exited.
        let _ = guild.shutdown_tx.send(true);
    }

    let deadline = Duration::from_secs(5);
    for guild in guilds {
        for task in guild.tasks {
            if tokio::time::timeout(deadline, task).await.is_err() {
                warn!(guild = %guild.guild_id, "Task did not stop in time");
            }
        }
    }

    info!("Exiting...");
    Ok(())
}

/// Wire up and start every task one guild link needs.
async fn spawn_guild_link(
    link: &GuildLinkConfig,
    config: &Config,
    store: Arc<dyn GuildStore>,
) -> Result<GuildHandle> {
    let protocol = ProtocolVersion::parse(&link.server.protocol)
        .ok_or_else(|| anyhow!("unknown protocol '{}'", link.server.protocol))?;

    let bundle = ChannelBundle::new();
    let bridge::ControlChannels {
        shutdown_tx,
        relay_tx,
        mut status_rx,
        state_rx,
        line_tx,
    } = bundle.control;

    let correlator = CommandCorrelator::new();

    let outbound_settings = OutboundSettings {
        max_chat_len: config
            .chat
            .max_chat_len
            .unwrap_or_else(|| protocol.max_chat_len()),
        min_send_delay: Duration::from_millis(config.chat.min_send_delay_ms),
        max_queue_depth: config.chat.max_queue_depth,
        padding_tokens: config.chat.padding_tokens.clone(),
    };
    let (outbound, pump) = OutboundQueue::new(outbound_settings, state_rx.clone(), line_tx);

    let relay = Arc::new(WebhookRelay::new(link.relay.webhook_url.clone()));
    let mut bridge = Bridge::new(
        link.guild_id.clone(),
        link.prefixes.clone(),
        &config.cache,
        correlator.clone(),
        outbound,
        relay,
        store,
    );
    bridge.load_persisted().await;
    let commander = bridge.commander();

    let runner = SessionRunner::new(
        SessionSettings {
            username: link.account.username.clone(),
            token: link.account.token.clone(),
            host: link.server.host.clone(),
            port: link.server.port,
            protocol,
        },
        config.reconnect.clone(),
        correlator,
        bundle.session,
    );
    let session = Arc::new(Session::new(runner, state_rx));

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(pump.run()));
    tasks.push(tokio::spawn(bridge.run(bundle.bridge)));

    // Status consumer: operator-facing logging and auth alerting.
    let guild_id = link.guild_id.clone();
    tasks.push(tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            match status {
                SessionStatus::Connecting => {
                    info!(guild = %guild_id, "Session connecting");
                }
                SessionStatus::Ready => {
                    info!(guild = %guild_id, "Session ready");
                }
                SessionStatus::Disconnected { reason } => {
                    warn!(guild = %guild_id, reason = %reason, "Session disconnected");
                }
                SessionStatus::AuthFailure { attempts, fatal } => {
                    if fatal {
                        error!(
                            guild = %guild_id,
                            attempts,
                            "Authentication failed permanently - check the account credentials"
                        );
                    } else {
                        warn!(guild = %guild_id, attempts, "Authentication failed, retrying");
                    }
                }
            }
        }
    }));

    session.start();

    Ok(GuildHandle {
        guild_id: link.guild_id.clone(),
        shutdown_tx,
        relay_tx,
        commander,
        session,
        tasks,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
