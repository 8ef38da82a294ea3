//! Game session: login state machine, packet loop, reconnect supervision.
//!
//! One runner per guild link owns the persistent connection. The lifecycle
//! is Idle → Connecting → LoggingIn → Spawned → Ready, with any failure
//! landing in Disconnected and a capped-exponential reconnect bringing it
//! back to Connecting. Authentication refusals are fatal after a bounded
//! retry count; everything else retries forever.

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bridge::channels::SessionChannels;
use crate::bridge::CommandCorrelator;
use crate::chat::Classifier;
use crate::common::error::{ConnectionError, ConnectionResult};
use crate::common::messages::SessionStatus;
use crate::common::reconnect::{reconnect_backoff, AuthAttempts};
use crate::common::types::SessionState;
use crate::config::types::ReconnectSettings;
use crate::protocol::codec::Connection;
use crate::protocol::packets::{
    login_ids, ClientSettings, ClientboundChat, DisconnectPacket, Handshake, KeepAlive,
    LoginStart, LoginSuccess, PacketIds, ServerboundChat,
};
use crate::protocol::text::flatten_chat_body;
use crate::protocol::{new_connection, PacketDecode, ProtocolVersion};

/// Connection parameters for one guild link.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub username: String,
    pub token: Option<String>,
    pub host: String,
    pub port: u16,
    pub protocol: ProtocolVersion,
}

/// Why a connection ended without a connection error.
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown was requested locally.
    Shutdown,
    /// The remote ended the session (socket close or kick).
    Remote(String),
}

/// Drives the connection for one guild link.
pub struct SessionRunner {
    settings: SessionSettings,
    reconnect: ReconnectSettings,
    classifier: Classifier,
    correlator: CommandCorrelator,
    channels: SessionChannels,
    /// Set when the current connection reached Ready; resets backoff.
    reached_ready: bool,
}

impl SessionRunner {
    pub fn new(
        settings: SessionSettings,
        reconnect: ReconnectSettings,
        correlator: CommandCorrelator,
        channels: SessionChannels,
    ) -> Self {
        let classifier = Classifier::new(settings.username.clone());
        Self {
            settings,
            reconnect,
            classifier,
            correlator,
            channels,
            reached_ready: false,
        }
    }

    /// Run the connect/reconnect loop until shutdown or a fatal
    /// authentication failure.
    pub async fn run(mut self) -> Result<()> {
        let mut backoff = reconnect_backoff(&self.reconnect);
        let mut auth = AuthAttempts::new(self.reconnect.auth_retry_limit);

        loop {
            if self.shutdown_requested() {
                break;
            }

            self.set_state(SessionState::Connecting);
            self.send_status(SessionStatus::Connecting);
            info!(
                host = %self.settings.host,
                port = self.settings.port,
                "Connecting to game server"
            );

            let end = match TcpStream::connect((self.settings.host.as_str(), self.settings.port))
                .await
            {
                Ok(stream) => self.run_stream(stream).await,
                Err(e) => Err(ConnectionError::ConnectFailed {
                    host: self.settings.host.clone(),
                    port: self.settings.port,
                    source: e,
                }),
            };

            match end {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Remote(reason)) => {
                    warn!(reason = %reason, "Session ended by remote");
                    self.send_status(SessionStatus::Disconnected { reason });
                }
                Err(ConnectionError::AuthFailed { reason }) => {
                    let fatal = auth.record_failure();
                    error!(
                        reason = %reason,
                        attempts = auth.failures(),
                        "Login refused"
                    );
                    self.send_status(SessionStatus::AuthFailure {
                        attempts: auth.failures(),
                        fatal,
                    });
                    if fatal {
                        self.set_state(SessionState::Idle);
                        return Err(anyhow!(
                            "authentication failed after {} attempts: {}",
                            auth.failures(),
                            reason
                        ));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Session error");
                    self.send_status(SessionStatus::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }

            if self.reached_ready {
                // A good session resets both counters.
                backoff = reconnect_backoff(&self.reconnect);
                auth.reset();
                self.reached_ready = false;
            }

            let delay = backoff
                .next()
                .unwrap_or(std::time::Duration::from_secs(self.reconnect.max_delay_secs));
            info!("Reconnecting in {:.1} seconds...", delay.as_secs_f64());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = self.channels.shutdown_rx.changed() => {
                    if changed.is_err() || *self.channels.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Run one connection to completion and perform disconnect bookkeeping:
    /// the state goes to Disconnected and every pending command fails with
    /// a transient error rather than waiting out its timeout.
    async fn run_stream<S>(&mut self, stream: S) -> ConnectionResult<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.drive_connection(stream).await;
        self.set_state(SessionState::Disconnected);
        self.correlator.fail_all();
        result
    }

    async fn drive_connection<S>(&mut self, stream: S) -> ConnectionResult<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ids = self.settings.protocol.ids();
        let mut conn = new_connection(stream);

        conn.send(
            Handshake::login(
                self.settings.protocol,
                &self.settings.host,
                self.settings.port,
            )
            .into(),
        )
        .await?;
        conn.send(
            LoginStart {
                username: self.settings.username.clone(),
                token: self.settings.token.clone(),
            }
            .into(),
        )
        .await?;
        self.set_state(SessionState::LoggingIn);
        debug!(username = %self.settings.username, "Login start sent");

        let mut logged_in = false;
        let mut shutdown_rx = self.channels.shutdown_rx.clone();

        loop {
            tokio::select! {
                packet = conn.next() => {
                    let packet = match packet {
                        None => return Err(ConnectionError::ConnectionClosed),
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(packet)) => packet,
                    };

                    if !logged_in {
                        logged_in = self.handle_login_packet(&mut conn, &ids, packet).await?;
                    } else if let Some(end) =
                        self.handle_play_packet(&mut conn, &ids, packet).await?
                    {
                        return Ok(end);
                    }
                }

                line = self.channels.line_rx.recv() => {
                    match line {
                        None => return Ok(SessionEnd::Shutdown),
                        Some(line) => self.send_line(&mut conn, &ids, line).await?,
                    }
                }

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown requested, closing session");
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Handle a packet before login completes. Returns true once logged in.
    async fn handle_login_packet<S>(
        &mut self,
        conn: &mut Connection<S>,
        ids: &PacketIds,
        packet: crate::protocol::Packet,
    ) -> ConnectionResult<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut payload = packet.payload;
        if packet.id == login_ids::LOGIN_DISCONNECT {
            let reason = DisconnectPacket::decode(&mut payload)
                .map(|d| d.reason)
                .unwrap_or_else(|_| "login refused".to_string());
            return Err(ConnectionError::AuthFailed { reason });
        }
        if packet.id == login_ids::LOGIN_SUCCESS {
            let success = LoginSuccess::decode(&mut payload)?;
            info!(username = %success.username, "Login successful");
            conn.send(ClientSettings::default().into_packet(ids)).await?;
            return Ok(true);
        }
        debug!(id = packet.id, "Ignoring pre-login packet");
        Ok(false)
    }

    /// Handle a play-state packet. Returns Some when the session ends.
    async fn handle_play_packet<S>(
        &mut self,
        conn: &mut Connection<S>,
        ids: &PacketIds,
        packet: crate::protocol::Packet,
    ) -> ConnectionResult<Option<SessionEnd>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut payload = packet.payload;

        if packet.id == ids.clientbound_keep_alive {
            let keep_alive = KeepAlive::decode(&mut payload)?;
            conn.send(keep_alive.into_packet(ids)).await?;
            if self.state() != SessionState::Ready {
                info!("Session ready, chat flowing");
                self.set_state(SessionState::Ready);
                self.send_status(SessionStatus::Ready);
                self.reached_ready = true;
            }
        } else if packet.id == ids.clientbound_chat {
            match ClientboundChat::decode(&mut payload) {
                Ok(chat) if chat.position != ClientboundChat::POSITION_ACTION_BAR => {
                    let flattened = flatten_chat_body(&chat.body);
                    let event = self.classifier.classify(&flattened);
                    if self.channels.event_tx.send(event).is_err() {
                        debug!("Event channel closed, dropping chat line");
                    }
                }
                Ok(_) => {} // Action bar noise.
                Err(e) => warn!(error = %e, "Skipping malformed chat packet"),
            }
        } else if packet.id == ids.clientbound_join_game {
            info!("Spawned into world");
            self.set_state(SessionState::Spawned);
        } else if packet.id == ids.clientbound_disconnect {
            let reason = DisconnectPacket::decode(&mut payload)
                .map(|d| d.reason)
                .unwrap_or_else(|_| "disconnected".to_string());
            return Ok(Some(SessionEnd::Remote(reason)));
        }
        // World-state packets the bridge does not care about fall through.

        Ok(None)
    }

    /// Send one shaped wire line. Valid only in Ready; the outbound pump
    /// gates on the state watch, so anything else is a late straggler.
    async fn send_line<S>(
        &mut self,
        conn: &mut Connection<S>,
        ids: &PacketIds,
        line: String,
    ) -> ConnectionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.state() == SessionState::Ready {
            debug!(line = %line, "Sending chat line");
            conn.send(ServerboundChat { text: line }.into_packet(ids))
                .await?;
        } else {
            warn!(line = %line, "Session not ready, dropping line");
        }
        Ok(())
    }

    fn state(&self) -> SessionState {
        *self.channels.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.channels.state_tx.send(state);
    }

    fn send_status(&self, status: SessionStatus) {
        if let Err(e) = self.channels.status_tx.send(status) {
            debug!("Status channel closed: {}", e);
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.channels.shutdown_rx.borrow()
    }
}

/// Started-at-most-once wrapper around a [`SessionRunner`].
///
/// `start` is idempotent: the first call spawns the runner, later calls
/// are no-ops. At most one live session exists per guild link.
pub struct Session {
    runner: std::sync::Mutex<Option<SessionRunner>>,
    state_rx: watch::Receiver<SessionState>,
}

impl Session {
    pub fn new(runner: SessionRunner, state_rx: watch::Receiver<SessionState>) -> Self {
        Self {
            runner: std::sync::Mutex::new(Some(runner)),
            state_rx,
        }
    }

    /// Spawn the session runner. Returns false when already started.
    pub fn start(&self) -> bool {
        let runner = self.runner.lock().unwrap().take();
        match runner {
            Some(runner) => {
                tokio::spawn(async move {
                    if let Err(e) = runner.run().await {
                        error!(error = %e, "Session runner terminated");
                    }
                });
                true
            }
            None => {
                debug!("start() called again, session already running");
                false
            }
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }
}
