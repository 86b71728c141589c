//! Match Session
//!
//! One tokio task owns the `MatchState`. Connections talk to it over an
//! mpsc channel; every command and tick runs to completion before the
//! next one is looked at, so the state needs no locking.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::commands::{self, CommandError};
use crate::game::events::{DisconnectReason, OutboundMessage, Recipient};
use crate::game::snapshot::MatchSnapshot;
use crate::game::state::{MatchState, PlayerId};
use crate::game::teams::AssignMode;
use crate::game::tick::{tick, TickResult};
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Configuration for a match session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Simulation tick rate (Hz).
    pub tick_rate: u32,
    /// Capacity of the command channel.
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            command_capacity: 1024,
        }
    }
}

/// Requests handled by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// A connection opened; `sender` receives its messages.
    Connect {
        /// Connection's player id
        player: PlayerId,
        /// Outbound channel
        sender: mpsc::Sender<ServerMessage>,
    },
    /// A parsed client message.
    Client {
        /// Sender
        player: PlayerId,
        /// Message
        message: ClientMessage,
    },
    /// A connection closed.
    Disconnect {
        /// Connection's player id
        player: PlayerId,
    },
    /// Current match view.
    Snapshot {
        /// Reply channel
        reply: oneshot::Sender<MatchSnapshot>,
    },
    /// Stop the session task.
    Shutdown,
}

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Session task is gone.
    #[error("Session closed")]
    Closed,
}

impl<T> From<mpsc::error::SendError<T>> for SessionError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        SessionError::Closed
    }
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Register a connection.
    pub async fn connect(
        &self,
        player: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), SessionError> {
        self.tx.send(SessionCommand::Connect { player, sender }).await?;
        Ok(())
    }

    /// Forward a client message.
    pub async fn send(&self, player: PlayerId, message: ClientMessage) -> Result<(), SessionError> {
        self.tx.send(SessionCommand::Client { player, message }).await?;
        Ok(())
    }

    /// Unregister a connection, removing its player from the match.
    pub async fn disconnect(&self, player: PlayerId) -> Result<(), SessionError> {
        self.tx.send(SessionCommand::Disconnect { player }).await?;
        Ok(())
    }

    /// Fetch a snapshot of the match.
    pub async fn snapshot(&self) -> Result<MatchSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.tx.send(SessionCommand::Shutdown).await?;
        Ok(())
    }
}

/// The session: match state plus the connections watching it.
pub struct MatchSession {
    /// Game state.
    state: MatchState,
    /// Open connections.
    clients: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
    /// Session configuration.
    config: SessionConfig,
    /// Wall-clock anchor and the match time it maps to; `None` until the first join.
    clock: Option<(Instant, u64)>,
}

impl MatchSession {
    /// Create a session around a fresh match.
    pub fn new(state: MatchState, config: SessionConfig) -> Self {
        Self {
            state,
            clients: BTreeMap::new(),
            config,
            clock: None,
        }
    }

    /// Match state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Number of open connections.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Spawn the session task.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.command_capacity);
        let task = tokio::spawn(self.run(rx));
        (SessionHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.config.tick_rate.max(1)));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_rate = self.config.tick_rate, "Session started");

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = ticker.tick(), if self.clock.is_some() => {
                    let dt_ms = self.elapsed_since_tick(Instant::now());
                    self.run_tick(dt_ms);
                }
            }
        }

        info!(players = self.state.players.len(), "Session stopped");
    }

    /// Handle one request to completion.
    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { player, sender } => {
                debug!(player = %player.short(), "Client connected");
                self.clients.insert(player, sender);
            }
            SessionCommand::Client { player, message } => {
                if let Some(reply) = self.handle_client(player, message) {
                    self.reply(&player, reply);
                }
                self.flush();
            }
            SessionCommand::Disconnect { player } => {
                self.clients.remove(&player);
                self.state.remove_player(&player, DisconnectReason::Disconnected);
                self.flush();
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            SessionCommand::Shutdown => {}
        }
    }

    /// Apply a client message, returning the direct reply if any.
    pub fn handle_client(&mut self, player: PlayerId, message: ClientMessage) -> Option<ServerMessage> {
        let action = message.action();
        let result: Result<(), CommandError> = match message {
            ClientMessage::Join { name, team } => {
                let mode = team.map_or(self.state.config.assign_mode, AssignMode::Preference);
                let joined = commands::join_with_mode(&mut self.state, player, name, mode).map(|_| ());
                if joined.is_ok() && self.clock.is_none() {
                    self.clock = Some((Instant::now(), self.state.now_ms));
                }
                joined
            }
            ClientMessage::Move { position, direction } => {
                if let Err(e) = commands::move_player(&mut self.state, &player, position, direction) {
                    debug!(player = %player.short(), reason = %e, "Move dropped");
                }
                return None;
            }
            ClientMessage::PickupFlag { flag_team } => {
                commands::pickup_flag(&mut self.state, &player, flag_team).map(|_| ())
            }
            ClientMessage::PickupWeapon { weapon_id } => {
                commands::pickup_weapon(&mut self.state, &player, weapon_id).map(|_| ())
            }
            ClientMessage::Shoot { direction } => {
                commands::shoot(&mut self.state, &player, direction).map(|_| ())
            }
            ClientMessage::UseItem => commands::use_item(&mut self.state, &player).map(|_| ()),
            ClientMessage::Ping { timestamp } => {
                commands::touch(&mut self.state, &player);
                return Some(ServerMessage::pong(timestamp));
            }
            ClientMessage::Leave => commands::leave(&mut self.state, &player, DisconnectReason::Left),
        };

        Some(match result {
            Ok(()) => ServerMessage::ok(action),
            Err(e) => {
                debug!(player = %player.short(), action, reason = %e, kind = ?e.kind(), "Command rejected");
                ServerMessage::rejected(action, &e)
            }
        })
    }

    /// Milliseconds of wall time not yet simulated at `now`.
    ///
    /// Measured from the anchor rather than the previous tick so
    /// sub-millisecond remainders carry over instead of being lost.
    pub fn elapsed_since_tick(&self, now: Instant) -> u64 {
        self.clock.map_or(0, |(origin, base_ms)| {
            let elapsed = now.saturating_duration_since(origin).as_millis();
            let target = base_ms.saturating_add(u64::try_from(elapsed).unwrap_or(u64::MAX));
            target.saturating_sub(self.state.now_ms)
        })
    }

    /// Advance the match by `dt_ms` and deliver what it produced.
    pub fn run_tick(&mut self, dt_ms: u64) -> TickResult {
        let result = tick(&mut self.state, dt_ms);
        self.flush();
        result
    }

    fn reply(&self, player: &PlayerId, message: ServerMessage) {
        if let Some(sender) = self.clients.get(player) {
            deliver(player, sender, message);
        }
    }

    /// Fan queued events out to the match's connections.
    fn flush(&mut self) {
        for OutboundMessage { tick, recipient, event } in self.state.take_outbound() {
            let message = ServerMessage::Event { tick, event };
            for (player, sender) in &self.clients {
                let addressed = recipient == Recipient::Player(*player)
                    || (self.state.players.contains_key(player) && recipient.includes(player));
                if addressed {
                    deliver(player, sender, message.clone());
                }
            }
        }
    }
}

fn deliver(player: &PlayerId, sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    match sender.try_send(message) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(player = %player.short(), "Outbound queue full, dropping message");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(player = %player.short(), "Outbound channel closed");
        }
    }
}
