//! Death/Respawn Scheduler
//!
//! Tracks who is dead and when they come back, and picks spawn points
//! per group. Groups are keyed by team.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::state::PlayerId;
use crate::game::teams::TeamId;

/// Spawn-point selection strategy for a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Uniform over the group's points.
    Random,
    /// Always the first point.
    Sequential,
    /// Group counter mod point count.
    #[default]
    RoundRobin,
}

/// A set of spawn points sharing one selection strategy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RespawnGroup {
    /// Group identifier
    pub id: TeamId,
    /// Candidate spawn points
    pub points: Vec<Vec2>,
    /// Selection strategy
    pub mode: SelectionMode,
    /// Round-robin counter; only ever increases
    pub counter: u64,
}

/// Notifications raised by the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum RespawnEvent {
    /// Entity marked dead.
    Died {
        /// Dead entity
        entity: PlayerId,
        /// When it may respawn
        due_at: u64,
    },
    /// Entity placed back in the world.
    Respawned {
        /// Respawned entity
        entity: PlayerId,
        /// Group the point came from
        group: TeamId,
        /// Chosen point
        position: Vec2,
    },
}

/// Respawn scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RespawnError {
    /// Group was never registered.
    #[error("respawn group {0} does not exist")]
    UnknownGroup(TeamId),

    /// Group exists but has no points.
    #[error("no free spawn point in group {0}")]
    NoSpawnPoints(TeamId),
}

/// Pure time comparison: has the respawn timer elapsed?
#[inline]
pub fn should_respawn(due_at: u64, now: u64) -> bool {
    now >= due_at
}

/// Death/respawn scheduler.
#[derive(Clone, Debug)]
pub struct RespawnScheduler {
    delay_ms: u64,
    groups: BTreeMap<TeamId, RespawnGroup>,
    pending: BTreeMap<PlayerId, u64>,
    events: Vec<RespawnEvent>,
}

impl RespawnScheduler {
    /// Create a scheduler with a fixed respawn delay.
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            groups: BTreeMap::new(),
            pending: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Register (or replace) a spawn group.
    pub fn add_group(&mut self, id: TeamId, points: Vec<Vec2>, mode: SelectionMode) {
        self.groups.insert(id, RespawnGroup { id, points, mode, counter: 0 });
    }

    /// Look up a group.
    pub fn group(&self, id: TeamId) -> Option<&RespawnGroup> {
        self.groups.get(&id)
    }

    /// Mark an entity dead; returns the respawn-due timestamp.
    pub fn mark_dead(&mut self, entity: PlayerId, now: u64) -> u64 {
        let due_at = now.saturating_add(self.delay_ms);
        self.pending.insert(entity, due_at);
        self.events.push(RespawnEvent::Died { entity, due_at });
        due_at
    }

    /// Respawn-due timestamp of a dead entity.
    pub fn due_at(&self, entity: &PlayerId) -> Option<u64> {
        self.pending.get(entity).copied()
    }

    /// Entity is waiting to respawn.
    pub fn is_pending(&self, entity: &PlayerId) -> bool {
        self.pending.contains_key(entity)
    }

    /// Entities whose timer has elapsed, in id order. Read-only.
    pub fn due(&self, now: u64) -> Vec<PlayerId> {
        self.pending
            .iter()
            .filter(|(_, due_at)| should_respawn(**due_at, now))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Pick a point from a group without touching the pending set.
    pub fn select_point(
        &mut self,
        group_id: TeamId,
        rng: &mut DeterministicRng,
    ) -> Result<Vec2, RespawnError> {
        let group = self.groups.get_mut(&group_id).ok_or(RespawnError::UnknownGroup(group_id))?;
        if group.points.is_empty() {
            return Err(RespawnError::NoSpawnPoints(group_id));
        }

        let index = match group.mode {
            SelectionMode::Random => rng.next_int(group.points.len() as u32) as usize,
            SelectionMode::Sequential => 0,
            SelectionMode::RoundRobin => {
                let index = (group.counter % group.points.len() as u64) as usize;
                group.counter = group.counter.wrapping_add(1);
                index
            }
        };

        group.points.get(index).copied().ok_or(RespawnError::NoSpawnPoints(group_id))
    }

    /// Bring an entity back at a point from `group_id`.
    ///
    /// Clears the pending timer whether or not it was due; the caller
    /// decides when to respawn.
    pub fn respawn(
        &mut self,
        entity: PlayerId,
        group_id: TeamId,
        rng: &mut DeterministicRng,
    ) -> Result<Vec2, RespawnError> {
        let position = self.select_point(group_id, rng)?;
        self.pending.remove(&entity);
        self.events.push(RespawnEvent::Respawned { entity, group: group_id, position });
        Ok(position)
    }

    /// Forget a dead entity (e.g. it disconnected).
    pub fn cancel(&mut self, entity: &PlayerId) -> bool {
        self.pending.remove(entity).is_some()
    }

    /// Drop every pending timer. Group counters carry on.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<RespawnEvent> {
        std::mem::take(&mut self.events)
    }
}
