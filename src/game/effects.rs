//! Status Effect Engine
//!
//! Timed buffs and debuffs with stacking. Effects are tagged data, not
//! closures: the engine tracks lifetimes and raises events, and the match
//! coordinator decides what an `Effect` means for a player.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::state::PlayerId;

/// Buff identifier (monotonic counter).
pub type BuffId = u32;

/// Kind of status effect. At most one record per (target, kind).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    /// Movement speed boost
    SpeedBoost,
    /// Projectile immunity
    Shield,
    /// Weapon charge regeneration
    Overcharge,
    /// Cannot act, cannot be hit
    Stun,
}

/// Category of a status effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffCategory {
    /// Beneficial
    Buff,
    /// Harmful
    Debuff,
    /// Neither
    Neutral,
}

/// Stat a modifier scales.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    /// Movement speed
    MoveSpeed,
}

/// What a buff does, interpreted by the owner of the target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Multiply a stat (per stack).
    StatModifier {
        /// Scaled stat
        stat: Stat,
        /// Multiplier per stack
        multiplier: f32,
    },
    /// Ignore projectile hits.
    Immunity,
    /// Prevent every action.
    Stun,
    /// Restore weapon charges on each status tick (per stack).
    ChargeRegen {
        /// Charges per pulse
        per_pulse: u32,
    },
}

/// Parameters for `apply`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuffConfig {
    /// Kind (dedup key)
    pub kind: BuffKind,
    /// Category
    pub category: BuffCategory,
    /// Lifetime in ms; 0 means permanent
    pub duration_ms: u64,
    /// Re-application adds a stack instead of refreshing
    pub stackable: bool,
    /// Stack ceiling (ignored when not stackable)
    pub max_stacks: u32,
    /// Effect description
    pub effect: Effect,
}

/// An active status effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Buff {
    /// Identifier
    pub id: BuffId,
    /// Affected player
    pub target: PlayerId,
    /// Kind
    pub kind: BuffKind,
    /// Category
    pub category: BuffCategory,
    /// Effect description
    pub effect: Effect,
    /// Current stacks (>= 1)
    pub stacks: u32,
    /// Stack ceiling
    pub max_stacks: u32,
    /// Stacks on re-application
    pub stackable: bool,
    /// Lifetime in ms (0 = permanent)
    pub duration_ms: u64,
    /// First application time
    pub applied_at: u64,
    /// Expiry time; `None` if permanent
    pub expires_at: Option<u64>,
}

impl Buff {
    /// Buff is past its expiry at `now`.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Lifecycle notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum BuffEvent {
    /// New record created (apply hook).
    Applied {
        /// Buff id
        buff: BuffId,
        /// Target
        target: PlayerId,
        /// Kind
        kind: BuffKind,
        /// Effect
        effect: Effect,
        /// Expiry, if any
        expires_at: Option<u64>,
    },
    /// Stack added to an existing record.
    Stacked {
        /// Buff id
        buff: BuffId,
        /// Target
        target: PlayerId,
        /// Kind
        kind: BuffKind,
        /// Stack count after the add
        stacks: u32,
    },
    /// Non-stackable record re-applied; expiry moved.
    Refreshed {
        /// Buff id
        buff: BuffId,
        /// Target
        target: PlayerId,
        /// Kind
        kind: BuffKind,
        /// New expiry
        expires_at: Option<u64>,
    },
    /// Periodic status tick (tick hook).
    Ticked {
        /// Buff id
        buff: BuffId,
        /// Target
        target: PlayerId,
        /// Kind
        kind: BuffKind,
        /// Effect
        effect: Effect,
        /// Current stacks
        stacks: u32,
    },
    /// Record removed.
    Expired {
        /// Buff id
        buff: BuffId,
        /// Target
        target: PlayerId,
        /// Kind
        kind: BuffKind,
        /// Effect
        effect: Effect,
        /// Whether the expire hook should run
        run_hook: bool,
    },
}

/// Status effect errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuffError {
    /// Stackable buff already at its ceiling.
    #[error("max stacks reached ({max})")]
    MaxStacksReached {
        /// Buff kind
        kind: BuffKind,
        /// Ceiling
        max: u32,
    },

    /// No such buff.
    #[error("buff {0} does not exist")]
    UnknownBuff(BuffId),
}

/// Status effect engine.
#[derive(Clone, Debug, Default)]
pub struct StatusEffects {
    buffs: BTreeMap<BuffId, Buff>,
    next_id: BuffId,
    events: Vec<BuffEvent>,
}

impl StatusEffects {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a buff to `target`.
    ///
    /// Same-kind non-stackable: expiry moves to `now + duration` (not
    /// added). Same-kind stackable: one more stack, expiry refreshed, or
    /// `MaxStacksReached` at the ceiling. Otherwise a new record.
    pub fn apply(
        &mut self,
        target: PlayerId,
        config: &BuffConfig,
        now: u64,
    ) -> Result<BuffId, BuffError> {
        let expires_at = expiry(config.duration_ms, now);

        if let Some(buff) = self
            .buffs
            .values_mut()
            .find(|b| b.target == target && b.kind == config.kind)
        {
            if !buff.stackable {
                buff.expires_at = expires_at;
                self.events.push(BuffEvent::Refreshed {
                    buff: buff.id,
                    target,
                    kind: buff.kind,
                    expires_at,
                });
                return Ok(buff.id);
            }

            if buff.stacks >= buff.max_stacks {
                return Err(BuffError::MaxStacksReached {
                    kind: buff.kind,
                    max: buff.max_stacks,
                });
            }

            buff.stacks += 1;
            buff.expires_at = expires_at;
            self.events.push(BuffEvent::Stacked {
                buff: buff.id,
                target,
                kind: buff.kind,
                stacks: buff.stacks,
            });
            return Ok(buff.id);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let buff = Buff {
            id,
            target,
            kind: config.kind,
            category: config.category,
            effect: config.effect,
            stacks: 1,
            max_stacks: config.max_stacks.max(1),
            stackable: config.stackable,
            duration_ms: config.duration_ms,
            applied_at: now,
            expires_at,
        };
        self.buffs.insert(id, buff);
        self.events.push(BuffEvent::Applied {
            buff: id,
            target,
            kind: config.kind,
            effect: config.effect,
            expires_at,
        });
        Ok(id)
    }

    /// Remove a buff. With `run_hook` false the expire hook is suppressed.
    pub fn remove(&mut self, id: BuffId, run_hook: bool) -> Result<Buff, BuffError> {
        let buff = self.buffs.remove(&id).ok_or(BuffError::UnknownBuff(id))?;
        self.events.push(BuffEvent::Expired {
            buff: id,
            target: buff.target,
            kind: buff.kind,
            effect: buff.effect,
            run_hook,
        });
        Ok(buff)
    }

    /// Periodic pulse: raise `Ticked` for every live buff.
    pub fn status_tick(&mut self, now: u64) {
        for buff in self.buffs.values() {
            if buff.is_expired(now) {
                continue;
            }
            self.events.push(BuffEvent::Ticked {
                buff: buff.id,
                target: buff.target,
                kind: buff.kind,
                effect: buff.effect,
                stacks: buff.stacks,
            });
        }
    }

    /// Remove every buff past its expiry; returns the removed ids.
    pub fn update(&mut self, now: u64) -> Vec<BuffId> {
        let expired: Vec<BuffId> = self
            .buffs
            .values()
            .filter(|b| b.is_expired(now))
            .map(|b| b.id)
            .collect();

        for id in &expired {
            // Ids came from the map a moment ago
            let _ = self.remove(*id, true);
        }
        expired
    }

    /// Remove every buff on a target.
    pub fn clear_target(&mut self, target: &PlayerId, run_hooks: bool) -> usize {
        let ids: Vec<BuffId> = self
            .buffs
            .values()
            .filter(|b| b.target == *target)
            .map(|b| b.id)
            .collect();
        for id in &ids {
            let _ = self.remove(*id, run_hooks);
        }
        ids.len()
    }

    /// Drop every buff without running hooks or raising events.
    pub fn clear(&mut self) {
        self.buffs.clear();
    }

    /// Look up a buff.
    pub fn get(&self, id: BuffId) -> Option<&Buff> {
        self.buffs.get(&id)
    }

    /// Buff of `kind` on `target`.
    pub fn find(&self, target: &PlayerId, kind: BuffKind) -> Option<&Buff> {
        self.buffs.values().find(|b| b.target == *target && b.kind == kind)
    }

    /// All buffs on `target`, in id order.
    pub fn buffs_for<'a>(&'a self, target: &'a PlayerId) -> impl Iterator<Item = &'a Buff> + 'a {
        self.buffs.values().filter(move |b| b.target == *target)
    }

    /// All buffs, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Buff> {
        self.buffs.values()
    }

    /// Target carries an active `Immunity` effect.
    pub fn is_immune(&self, target: &PlayerId) -> bool {
        self.buffs_for(target).any(|b| matches!(b.effect, Effect::Immunity))
    }

    /// Target carries an active `Stun` effect.
    pub fn is_stunned(&self, target: &PlayerId) -> bool {
        self.buffs_for(target).any(|b| matches!(b.effect, Effect::Stun))
    }

    /// Product of every modifier on `stat`, one factor per stack.
    pub fn stat_multiplier(&self, target: &PlayerId, stat: Stat) -> f32 {
        self.buffs_for(target)
            .filter_map(|b| match b.effect {
                Effect::StatModifier { stat: s, multiplier } if s == stat => {
                    Some(multiplier.powi(b.stacks as i32))
                }
                _ => None,
            })
            .product()
    }

    /// Number of live buffs.
    pub fn len(&self) -> usize {
        self.buffs.len()
    }

    /// No live buffs.
    pub fn is_empty(&self) -> bool {
        self.buffs.is_empty()
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<BuffEvent> {
        std::mem::take(&mut self.events)
    }
}

#[inline]
fn expiry(duration_ms: u64, now: u64) -> Option<u64> {
    if duration_ms == 0 {
        None
    } else {
        Some(now.saturating_add(duration_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pid(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn haste(stackable: bool, max_stacks: u32) -> BuffConfig {
        BuffConfig {
            kind: BuffKind::SpeedBoost,
            category: BuffCategory::Buff,
            duration_ms: 1_000,
            stackable,
            max_stacks,
            effect: Effect::StatModifier { stat: Stat::MoveSpeed, multiplier: 1.5 },
        }
    }

    #[test]
    fn test_apply_creates_record_and_event() {
        let mut effects = StatusEffects::new();
        let id = effects.apply(pid(1), &haste(false, 1), 100).unwrap();

        let buff = effects.get(id).unwrap();
        assert_eq!(buff.stacks, 1);
        assert_eq!(buff.expires_at, Some(1_100));

        let events = effects.take_events();
        assert!(matches!(events.as_slice(), [BuffEvent::Applied { buff, .. }] if *buff == id));
    }

    #[test]
    fn test_non_stackable_refreshes_in_place() {
        let mut effects = StatusEffects::new();
        let first = effects.apply(pid(1), &haste(false, 1), 0).unwrap();
        let second = effects.apply(pid(1), &haste(false, 1), 600).unwrap();

        assert_eq!(first, second);
        assert_eq!(effects.len(), 1);
        // now + duration, not added to the old expiry
        assert_eq!(effects.get(first).unwrap().expires_at, Some(1_600));
        assert_eq!(effects.get(first).unwrap().stacks, 1);
    }

    #[test]
    fn test_stackable_caps_at_max() {
        // Apply a max-3 stackable buff four times
        let mut effects = StatusEffects::new();
        let config = haste(true, 3);

        let id = effects.apply(pid(1), &config, 0).unwrap();
        effects.apply(pid(1), &config, 10).unwrap();
        effects.apply(pid(1), &config, 20).unwrap();
        let fourth = effects.apply(pid(1), &config, 30);

        assert_eq!(effects.get(id).unwrap().stacks, 3);
        assert_eq!(
            fourth,
            Err(BuffError::MaxStacksReached { kind: BuffKind::SpeedBoost, max: 3 })
        );
        assert_eq!(fourth.unwrap_err().to_string(), "max stacks reached (3)");

        let stacked = effects
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, BuffEvent::Stacked { .. }))
            .count();
        assert_eq!(stacked, 2);
    }

    #[test]
    fn test_stacking_multiplies_stat() {
        let mut effects = StatusEffects::new();
        effects.apply(pid(1), &haste(true, 3), 0).unwrap();
        effects.apply(pid(1), &haste(true, 3), 0).unwrap();

        let m = effects.stat_multiplier(&pid(1), Stat::MoveSpeed);
        assert!((m - 2.25).abs() < 1e-5);
        assert_eq!(effects.stat_multiplier(&pid(2), Stat::MoveSpeed), 1.0);
    }

    #[test]
    fn test_remove_respects_hook_suppression() {
        let mut effects = StatusEffects::new();
        let id = effects.apply(pid(1), &haste(false, 1), 0).unwrap();
        effects.take_events();

        effects.remove(id, false).unwrap();
        assert!(matches!(
            effects.take_events().as_slice(),
            [BuffEvent::Expired { run_hook: false, .. }]
        ));
        assert_eq!(effects.remove(id, true), Err(BuffError::UnknownBuff(id)));
    }

    #[test]
    fn test_update_expires_due_buffs() {
        let mut effects = StatusEffects::new();
        let id = effects.apply(pid(1), &haste(false, 1), 0).unwrap();
        effects.take_events();

        assert!(effects.update(999).is_empty());
        assert_eq!(effects.update(1_000), vec![id]);
        assert!(effects.is_empty());
        assert!(matches!(
            effects.take_events().as_slice(),
            [BuffEvent::Expired { run_hook: true, kind: BuffKind::SpeedBoost, .. }]
        ));
    }

    #[test]
    fn test_permanent_buff_never_expires() {
        let mut effects = StatusEffects::new();
        let config = BuffConfig { duration_ms: 0, ..haste(false, 1) };
        let id = effects.apply(pid(1), &config, 0).unwrap();

        assert_eq!(effects.get(id).unwrap().expires_at, None);
        assert!(effects.update(u64::MAX).is_empty());
    }

    #[test]
    fn test_update_zero_elapsed_is_idempotent() {
        let mut effects = StatusEffects::new();
        effects.apply(pid(1), &haste(false, 1), 0).unwrap();
        effects.update(500);
        effects.take_events();

        let before = effects.iter().cloned().collect::<Vec<_>>();
        assert!(effects.update(500).is_empty());
        assert_eq!(effects.iter().cloned().collect::<Vec<_>>(), before);
        assert!(effects.take_events().is_empty());
    }

    #[test]
    fn test_status_tick_pulses_live_buffs() {
        let mut effects = StatusEffects::new();
        let regen = BuffConfig {
            kind: BuffKind::Overcharge,
            category: BuffCategory::Buff,
            duration_ms: 5_000,
            stackable: false,
            max_stacks: 1,
            effect: Effect::ChargeRegen { per_pulse: 1 },
        };
        effects.apply(pid(1), &regen, 0).unwrap();
        effects.take_events();

        effects.status_tick(1_000);
        assert!(matches!(
            effects.take_events().as_slice(),
            [BuffEvent::Ticked { effect: Effect::ChargeRegen { per_pulse: 1 }, .. }]
        ));

        // Past expiry but not yet swept: no pulse
        effects.status_tick(5_000);
        assert!(effects.take_events().is_empty());
    }

    #[test]
    fn test_immunity_and_stun_queries() {
        let mut effects = StatusEffects::new();
        let shield = BuffConfig {
            kind: BuffKind::Shield,
            category: BuffCategory::Buff,
            duration_ms: 100,
            stackable: false,
            max_stacks: 1,
            effect: Effect::Immunity,
        };
        let stun = BuffConfig {
            kind: BuffKind::Stun,
            category: BuffCategory::Debuff,
            duration_ms: 100,
            stackable: false,
            max_stacks: 1,
            effect: Effect::Stun,
        };
        effects.apply(pid(1), &shield, 0).unwrap();
        effects.apply(pid(2), &stun, 0).unwrap();

        assert!(effects.is_immune(&pid(1)));
        assert!(!effects.is_stunned(&pid(1)));
        assert!(effects.is_stunned(&pid(2)));

        assert_eq!(effects.clear_target(&pid(2), false), 1);
        assert!(!effects.is_stunned(&pid(2)));
    }

    proptest! {
        #[test]
        fn test_stacks_never_exceed_max(max in 1u32..6, applications in 1usize..20) {
            let mut effects = StatusEffects::new();
            let config = haste(true, max);
            let mut ok = 0u32;
            for i in 0..applications {
                if effects.apply(pid(1), &config, i as u64).is_ok() {
                    ok += 1;
                }
            }
            let buff = effects.find(&pid(1), BuffKind::SpeedBoost).unwrap();
            prop_assert!(buff.stacks <= max);
            prop_assert_eq!(buff.stacks, ok);
            prop_assert_eq!(effects.len(), 1);
        }
    }
}
