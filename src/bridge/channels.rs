//! Per-guild channel wiring.
//!
//! Groups the channels one guild link needs, split by which component
//! holds which end. Every guild gets its own bundle; nothing is shared
//! across bridges.

use tokio::sync::{mpsc, watch};

use crate::common::messages::{RelayInbound, SessionStatus};
use crate::common::types::{ChatEvent, SessionState};

/// Channel ends owned by the session runner.
pub struct SessionChannels {
    /// Classified inbound events, session -> bridge.
    pub event_tx: mpsc::UnboundedSender<ChatEvent>,
    /// Shaped wire lines, outbound pump -> session.
    pub line_rx: mpsc::UnboundedReceiver<String>,
    /// Session state, published to the pump and the controller.
    pub state_tx: watch::Sender<SessionState>,
    /// Status events for the supervision loop.
    pub status_tx: mpsc::UnboundedSender<SessionStatus>,
    /// Shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Channel ends owned by the bridge orchestrator.
pub struct BridgeSideChannels {
    /// Classified inbound events from the session.
    pub event_rx: mpsc::UnboundedReceiver<ChatEvent>,
    /// Messages arriving from the linked relay channel.
    pub relay_rx: mpsc::UnboundedReceiver<RelayInbound>,
    /// Shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Ends kept by whoever wires the guild up (the binary).
pub struct ControlChannels {
    /// Trigger shutdown for this guild's tasks.
    pub shutdown_tx: watch::Sender<bool>,
    /// Feed inbound relay messages to the bridge.
    pub relay_tx: mpsc::UnboundedSender<RelayInbound>,
    /// Session status stream for logging and alerting.
    pub status_rx: mpsc::UnboundedReceiver<SessionStatus>,
    /// Observe the session state; also handed to the outbound pump.
    pub state_rx: watch::Receiver<SessionState>,
    /// Wire-line sender handed to the outbound pump.
    pub line_tx: mpsc::UnboundedSender<String>,
}

/// Bundle of all channels created for one guild link.
pub struct ChannelBundle {
    pub session: SessionChannels,
    pub bridge: BridgeSideChannels,
    pub control: ControlChannels,
}

impl ChannelBundle {
    /// Create a fresh set of channels for one guild link.
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            session: SessionChannels {
                event_tx,
                line_rx,
                state_tx,
                status_tx,
                shutdown_rx: shutdown_rx.clone(),
            },
            bridge: BridgeSideChannels {
                event_rx,
                relay_rx,
                shutdown_rx,
            },
            control: ControlChannels {
                shutdown_tx,
                relay_tx,
                status_rx,
                state_rx,
                line_tx,
            },
        }
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new()
    }
}
