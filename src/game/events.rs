//! Game Events
//!
//! State-change notifications produced by commands and ticks. The
//! simulation only appends to the outbound list; fan-out belongs to the
//! transport.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::items::{BoostKind, ItemKind, WeaponKind};
use crate::game::pickup::PickupId;
use crate::game::projectile::ProjectileId;
use crate::game::snapshot::MatchSnapshot;
use crate::game::state::{MatchPhase, PlayerId};
use crate::game::teams::TeamId;

/// Why a player left the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Sent `leave`
    Left,
    /// Connection closed
    Disconnected,
    /// Evicted after the inactivity timeout
    Inactive,
}

/// Final score line for one team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    /// Team
    pub team: TeamId,
    /// Captures
    pub score: u32,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    /// Player entered the match
    PlayerJoined {
        player: PlayerId,
        name: String,
        team: TeamId,
        position: Vec2,
    },

    /// Player moved
    PlayerMoved {
        player: PlayerId,
        position: Vec2,
        direction: Vec2,
    },

    /// Enemy flag taken
    FlagPickedUp {
        player: PlayerId,
        flag_team: TeamId,
    },

    /// Carried flag dropped
    FlagDropped {
        player: PlayerId,
        flag_team: TeamId,
        position: Vec2,
    },

    /// Flag captured; the captured flag is back at its base
    FlagCaptured {
        player: PlayerId,
        team: TeamId,
        flag_team: TeamId,
        score: u32,
    },

    /// Flag back at base, by touch (`by`) or auto-return (`None`)
    FlagReturned {
        flag_team: TeamId,
        by: Option<PlayerId>,
    },

    /// Weapon picked up
    WeaponPickedUp {
        player: PlayerId,
        pickup: PickupId,
        weapon: WeaponKind,
        charges: u32,
    },

    /// Boost auto-collected
    BoostPickedUp {
        player: PlayerId,
        pickup: PickupId,
        boost: BoostKind,
    },

    /// Spawn point restocked
    WeaponRespawned {
        pickup: PickupId,
        item: ItemKind,
        position: Vec2,
    },

    /// Projectile spawned
    ProjectileFired {
        projectile: ProjectileId,
        owner: PlayerId,
        position: Vec2,
        velocity: Vec2,
    },

    /// Projectile stopped by geometry
    ProjectileHitWall {
        projectile: ProjectileId,
        position: Vec2,
    },

    /// Projectile lifetime ran out
    ProjectileExpired {
        projectile: ProjectileId,
    },

    /// Player stunned
    PlayerStunned {
        player: PlayerId,
        by: PlayerId,
        until: Option<u64>,
    },

    /// Stun wore off
    PlayerRecovered {
        player: PlayerId,
    },

    /// Player eliminated
    PlayerKilled {
        player: PlayerId,
        by: Option<PlayerId>,
        position: Vec2,
        respawn_at: u64,
    },

    /// Player back in the world
    PlayerRespawned {
        player: PlayerId,
        position: Vec2,
    },

    /// Held boost used
    BoostActivated {
        player: PlayerId,
        boost: BoostKind,
        expires_at: Option<u64>,
    },

    /// Active boost wore off
    BoostExpired {
        player: PlayerId,
        boost: BoostKind,
    },

    /// A team reached the capture limit
    MatchEnded {
        winner: TeamId,
        scores: Vec<TeamScore>,
    },

    /// Player removed
    PlayerDisconnected {
        player: PlayerId,
        reason: DisconnectReason,
    },

    /// Phase transition
    GameStatusChanged {
        phase: MatchPhase,
        player_count: usize,
    },

    /// Scores, flags, items and buffs back to their initial state
    GameReset,

    /// Full state, sent to a joiner
    StateSnapshot {
        snapshot: Box<MatchSnapshot>,
    },
}

impl GameEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::PlayerJoined { .. } => "playerJoined",
            GameEvent::PlayerMoved { .. } => "playerMoved",
            GameEvent::FlagPickedUp { .. } => "flagPickedUp",
            GameEvent::FlagDropped { .. } => "flagDropped",
            GameEvent::FlagCaptured { .. } => "flagCaptured",
            GameEvent::FlagReturned { .. } => "flagReturned",
            GameEvent::WeaponPickedUp { .. } => "weaponPickedUp",
            GameEvent::BoostPickedUp { .. } => "boostPickedUp",
            GameEvent::WeaponRespawned { .. } => "weaponRespawned",
            GameEvent::ProjectileFired { .. } => "projectileFired",
            GameEvent::ProjectileHitWall { .. } => "projectileHitWall",
            GameEvent::ProjectileExpired { .. } => "projectileExpired",
            GameEvent::PlayerStunned { .. } => "playerStunned",
            GameEvent::PlayerRecovered { .. } => "playerRecovered",
            GameEvent::PlayerKilled { .. } => "playerKilled",
            GameEvent::PlayerRespawned { .. } => "playerRespawned",
            GameEvent::BoostActivated { .. } => "boostActivated",
            GameEvent::BoostExpired { .. } => "boostExpired",
            GameEvent::MatchEnded { .. } => "matchEnded",
            GameEvent::PlayerDisconnected { .. } => "playerDisconnected",
            GameEvent::GameStatusChanged { .. } => "gameStatusChanged",
            GameEvent::GameReset => "gameReset",
            GameEvent::StateSnapshot { .. } => "stateSnapshot",
        }
    }
}

/// Who receives an outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", content = "player", rename_all = "snake_case")]
pub enum Recipient {
    /// Every match client
    All,
    /// One client
    Player(PlayerId),
    /// Everyone but one client
    AllExcept(PlayerId),
}

impl Recipient {
    /// Check if `player` should receive the message.
    #[inline]
    pub fn includes(&self, player: &PlayerId) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Player(id) => id == player,
            Recipient::AllExcept(id) => id != player,
        }
    }
}

/// An event addressed for delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    /// Tick the event was produced on
    pub tick: u64,
    /// Addressees
    pub recipient: Recipient,
    /// Payload
    pub event: GameEvent,
}
