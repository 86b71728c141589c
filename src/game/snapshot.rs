//! Match Snapshots
//!
//! Serializable view of the whole match, sent to joiners so they can
//! render without replaying history.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::effects::Stat;
use crate::game::items::ItemKind;
use crate::game::map::Rect;
use crate::game::objective::Flag;
use crate::game::pickup::PickupId;
use crate::game::projectile::ProjectileId;
use crate::game::state::{MatchPhase, MatchState, Player, PlayerId};
use crate::game::teams::TeamId;

/// Team line in a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamView {
    /// Team id
    pub id: TeamId,
    /// Display name
    pub name: String,
    /// Captures
    pub score: u32,
    /// Base position
    pub base: Vec2,
    /// Members
    pub members: Vec<PlayerId>,
}

/// Spawn point in a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickupView {
    /// Pickup id
    pub id: PickupId,
    /// Item type
    pub kind: ItemKind,
    /// Position
    pub position: Vec2,
    /// Can be collected now
    pub available: bool,
}

/// Projectile in a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileView {
    /// Projectile id
    pub id: ProjectileId,
    /// Shooter
    pub owner: PlayerId,
    /// Position
    pub position: Vec2,
    /// Velocity
    pub velocity: Vec2,
}

/// Static geometry in a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Tile size
    pub tile_size: f32,
    /// Walls
    pub walls: Vec<Rect>,
}

/// Everything a client needs to draw the match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Tick
    pub tick: u64,
    /// Simulated clock (ms)
    pub now_ms: u64,
    /// Phase
    pub phase: MatchPhase,
    /// Winner (while ended)
    pub winner: Option<TeamId>,
    /// Capture limit
    pub capture_limit: u32,
    /// Geometry
    pub world: WorldView,
    /// Teams
    pub teams: Vec<TeamView>,
    /// Players
    pub players: Vec<Player>,
    /// Movement multiplier per player; clients scale their prediction by it
    pub speed_multipliers: BTreeMap<PlayerId, f32>,
    /// Flags
    pub flags: Vec<Flag>,
    /// Spawn points
    pub pickups: Vec<PickupView>,
    /// Live projectiles
    pub projectiles: Vec<ProjectileView>,
    /// SHA-256 of canonical state, hex
    pub state_hash: String,
}

impl MatchSnapshot {
    /// Capture the current state.
    pub fn capture(state: &MatchState) -> Self {
        Self {
            tick: state.tick,
            now_ms: state.now_ms,
            phase: state.phase,
            winner: state.winner,
            capture_limit: state.config.capture_limit,
            world: WorldView {
                width: state.map.width,
                height: state.map.height,
                tile_size: state.map.tile_size,
                walls: state.map.walls.clone(),
            },
            teams: state
                .roster
                .teams()
                .map(|t| TeamView {
                    id: t.id,
                    name: t.name.clone(),
                    score: t.score,
                    base: state.base_of(t.id).unwrap_or(Vec2::ZERO),
                    members: t.members.iter().copied().collect(),
                })
                .collect(),
            players: state.players.values().cloned().collect(),
            speed_multipliers: state
                .players
                .keys()
                .map(|id| (*id, state.effects.stat_multiplier(id, Stat::MoveSpeed)))
                .collect(),
            flags: state.objective.flags().cloned().collect(),
            pickups: state
                .pickups
                .iter()
                .map(|p| PickupView { id: p.id, kind: p.kind, position: p.position, available: p.available })
                .collect(),
            projectiles: state
                .projectiles
                .iter()
                .map(|p| ProjectileView { id: p.id, owner: p.owner, position: p.position, velocity: p.velocity })
                .collect(),
            state_hash: hex::encode(state.compute_hash()),
        }
    }
}
