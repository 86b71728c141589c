//! Pickup/Spawn-Point Registry
//!
//! World-placed items: registration, proximity collection, and timed
//! respawn. The registry does not know what an item does.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::items::ItemKind;
use crate::game::state::PlayerId;

/// Pickup identifier (registration order).
pub type PickupId = u32;

/// Default collection radius.
pub const DEFAULT_PICKUP_RADIUS: f32 = 24.0;

/// Parameters for `register`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickupConfig {
    /// What sits here
    pub kind: ItemKind,
    /// Spawn position
    pub position: Vec2,
    /// Collection radius
    #[serde(default = "default_radius")]
    pub radius: f32,
    /// Respawn interval in ms; 0 means it never comes back
    #[serde(default)]
    pub respawn_ms: u64,
    /// Remaining uses before retirement; `None` is unlimited
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Never goes unavailable
    #[serde(default)]
    pub persistent: bool,
}

fn default_radius() -> f32 {
    DEFAULT_PICKUP_RADIUS
}

/// A registered pickup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    /// Identifier
    pub id: PickupId,
    /// Item type
    pub kind: ItemKind,
    /// Current position
    pub position: Vec2,
    /// Configured spawn position
    pub spawn_position: Vec2,
    /// Collection radius
    pub radius: f32,
    /// Respawn interval (ms)
    pub respawn_ms: u64,
    /// Configured use cap
    pub max_uses: Option<u32>,
    /// Remaining uses
    pub uses_remaining: Option<u32>,
    /// Never goes unavailable
    pub persistent: bool,
    /// Can be collected now
    pub available: bool,
    /// Last collector
    pub holder: Option<PlayerId>,
    /// When it comes back
    pub respawn_at: Option<u64>,
    /// Out of uses or non-respawning; never returns
    pub retired: bool,
}

/// Registry notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum PickupEvent {
    /// Item collected.
    Collected {
        /// Pickup id
        pickup: PickupId,
        /// Item type
        kind: ItemKind,
        /// Collector
        player: PlayerId,
    },
    /// Item available again.
    Respawned {
        /// Pickup id
        pickup: PickupId,
        /// Item type
        kind: ItemKind,
        /// New position
        position: Vec2,
    },
}

/// Pickup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PickupError {
    /// No such pickup.
    #[error("pickup {0} does not exist")]
    UnknownPickup(PickupId),

    /// Already taken.
    #[error("item is not available")]
    Unavailable(PickupId),

    /// Player not in range.
    #[error("too far from item")]
    TooFar(PickupId),
}

/// Pickup registry.
#[derive(Clone, Debug, Default)]
pub struct PickupRegistry {
    pickups: BTreeMap<PickupId, Pickup>,
    next_id: PickupId,
    events: Vec<PickupEvent>,
}

impl PickupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pickup; returns its id.
    pub fn register(&mut self, config: PickupConfig) -> PickupId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.pickups.insert(
            id,
            Pickup {
                id,
                kind: config.kind,
                position: config.position,
                spawn_position: config.position,
                radius: config.radius,
                respawn_ms: config.respawn_ms,
                max_uses: config.max_uses,
                uses_remaining: config.max_uses,
                persistent: config.persistent,
                available: true,
                holder: None,
                respawn_at: None,
                retired: false,
            },
        );
        id
    }

    /// Look up a pickup.
    pub fn get(&self, id: PickupId) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    /// All pickups, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Pickup> {
        self.pickups.values()
    }

    /// Number of registered pickups.
    pub fn len(&self) -> usize {
        self.pickups.len()
    }

    /// Nothing registered.
    pub fn is_empty(&self) -> bool {
        self.pickups.is_empty()
    }

    /// Auto-collect every available item within its radius of `position`
    /// that `accept` allows. Returns the collected ids.
    pub fn check_pickups<F>(
        &mut self,
        position: Vec2,
        player: PlayerId,
        now: u64,
        mut accept: F,
    ) -> Vec<PickupId>
    where
        F: FnMut(&Pickup) -> bool,
    {
        let in_range: Vec<PickupId> = self
            .pickups
            .values()
            .filter(|p| p.available && position.within(p.position, p.radius) && accept(*p))
            .map(|p| p.id)
            .collect();

        for id in &in_range {
            self.collect(*id, player, now);
        }
        in_range
    }

    /// Explicitly collect one item, checking availability and `range`.
    pub fn try_collect(
        &mut self,
        id: PickupId,
        player: PlayerId,
        position: Vec2,
        range: f32,
        now: u64,
    ) -> Result<ItemKind, PickupError> {
        let pickup = self.pickups.get(&id).ok_or(PickupError::UnknownPickup(id))?;
        if !pickup.available {
            return Err(PickupError::Unavailable(id));
        }
        if !position.within(pickup.position, range) {
            return Err(PickupError::TooFar(id));
        }

        let kind = pickup.kind;
        self.collect(id, player, now);
        Ok(kind)
    }

    fn collect(&mut self, id: PickupId, player: PlayerId, now: u64) {
        let Some(pickup) = self.pickups.get_mut(&id) else {
            return;
        };

        pickup.holder = Some(player);

        if let Some(uses) = pickup.uses_remaining.as_mut() {
            *uses = uses.saturating_sub(1);
            if *uses == 0 {
                pickup.retired = true;
                pickup.available = false;
                pickup.respawn_at = None;
            }
        }

        if !pickup.persistent && !pickup.retired {
            pickup.available = false;
            if pickup.respawn_ms > 0 {
                pickup.respawn_at = Some(now.saturating_add(pickup.respawn_ms));
            } else {
                pickup.retired = true;
            }
        }

        self.events.push(PickupEvent::Collected { pickup: id, kind: pickup.kind, player });
    }

    /// Restore pickups whose respawn time has elapsed. `reposition`
    /// chooses where each one reappears. Returns the restored ids.
    pub fn update<F>(&mut self, now: u64, mut reposition: F) -> Vec<PickupId>
    where
        F: FnMut(&Pickup) -> Vec2,
    {
        let mut restored = Vec::new();

        for pickup in self.pickups.values_mut() {
            let due = match pickup.respawn_at {
                Some(at) => now >= at,
                None => false,
            };
            if !due || pickup.retired {
                continue;
            }

            pickup.position = reposition(pickup);
            pickup.available = true;
            pickup.holder = None;
            pickup.respawn_at = None;

            self.events.push(PickupEvent::Respawned {
                pickup: pickup.id,
                kind: pickup.kind,
                position: pickup.position,
            });
            restored.push(pickup.id);
        }

        restored
    }

    /// Put every pickup back at its spawn position with its uses restored.
    pub fn reset(&mut self) {
        for pickup in self.pickups.values_mut() {
            pickup.position = pickup.spawn_position;
            pickup.available = true;
            pickup.holder = None;
            pickup.respawn_at = None;
            pickup.retired = false;
            pickup.uses_remaining = pickup.max_uses;
        }
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<PickupEvent> {
        std::mem::take(&mut self.events)
    }
}
