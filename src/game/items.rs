//! Weapons and Boosts
//!
//! Static item definitions. Weapons fire projectiles and carry a charge
//! count; boosts are held until `use_item` turns them into a buff.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::effects::{BuffCategory, BuffConfig, BuffKind, Effect, Stat};
use crate::game::projectile::HitEffect;

/// Weapon types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    /// Single fast shot that eliminates
    Blaster,
    /// Three-way spread that eliminates
    Scatter,
    /// Single shot that stuns
    Stunner,
}

/// Firing characteristics of a weapon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeaponStats {
    /// Charges on pickup
    pub charges: u32,
    /// Projectiles per shot
    pub projectiles: u32,
    /// Total spread in radians (multi-shot only)
    pub spread: f32,
    /// Projectile speed (units/second)
    pub speed: f32,
    /// Projectile radius
    pub radius: f32,
    /// Projectile lifetime (ms)
    pub ttl_ms: u64,
    /// What a hit does
    pub effect: HitEffect,
}

impl WeaponKind {
    /// All weapon kinds.
    pub const ALL: [WeaponKind; 3] = [WeaponKind::Blaster, WeaponKind::Scatter, WeaponKind::Stunner];

    /// Firing characteristics.
    pub fn stats(self) -> WeaponStats {
        match self {
            WeaponKind::Blaster => WeaponStats {
                charges: 6,
                projectiles: 1,
                spread: 0.0,
                speed: 600.0,
                radius: 4.0,
                ttl_ms: 1_500,
                effect: HitEffect::Kill,
            },
            WeaponKind::Scatter => WeaponStats {
                charges: 3,
                projectiles: 3,
                spread: 0.5,
                speed: 500.0,
                radius: 4.0,
                ttl_ms: 800,
                effect: HitEffect::Kill,
            },
            WeaponKind::Stunner => WeaponStats {
                charges: 4,
                projectiles: 1,
                spread: 0.0,
                speed: 450.0,
                radius: 6.0,
                ttl_ms: 1_500,
                effect: HitEffect::Stun { duration_ms: 2_000 },
            },
        }
    }
}

impl fmt::Display for WeaponKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeaponKind::Blaster => write!(f, "blaster"),
            WeaponKind::Scatter => write!(f, "scatter"),
            WeaponKind::Stunner => write!(f, "stunner"),
        }
    }
}

/// Boost types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    /// Faster movement
    Speed,
    /// Projectile immunity
    Shield,
    /// Weapon charge regeneration
    Overcharge,
}

impl BoostKind {
    /// All boost kinds.
    pub const ALL: [BoostKind; 3] = [BoostKind::Speed, BoostKind::Shield, BoostKind::Overcharge];

    /// Buff applied when the boost is used.
    pub fn buff(self) -> BuffConfig {
        match self {
            BoostKind::Speed => BuffConfig {
                kind: BuffKind::SpeedBoost,
                category: BuffCategory::Buff,
                duration_ms: 8_000,
                stackable: false,
                max_stacks: 1,
                effect: Effect::StatModifier { stat: Stat::MoveSpeed, multiplier: 1.5 },
            },
            BoostKind::Shield => BuffConfig {
                kind: BuffKind::Shield,
                category: BuffCategory::Buff,
                duration_ms: 5_000,
                stackable: false,
                max_stacks: 1,
                effect: Effect::Immunity,
            },
            BoostKind::Overcharge => BuffConfig {
                kind: BuffKind::Overcharge,
                category: BuffCategory::Buff,
                duration_ms: 6_000,
                stackable: false,
                max_stacks: 1,
                effect: Effect::ChargeRegen { per_pulse: 1 },
            },
        }
    }

    /// Boost matching a buff kind, if any.
    pub fn from_buff(kind: BuffKind) -> Option<BoostKind> {
        match kind {
            BuffKind::SpeedBoost => Some(BoostKind::Speed),
            BuffKind::Shield => Some(BoostKind::Shield),
            BuffKind::Overcharge => Some(BoostKind::Overcharge),
            BuffKind::Stun => None,
        }
    }
}

impl fmt::Display for BoostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoostKind::Speed => write!(f, "speed"),
            BoostKind::Shield => write!(f, "shield"),
            BoostKind::Overcharge => write!(f, "overcharge"),
        }
    }
}

/// Anything that can sit on a spawn point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    /// A weapon
    Weapon(WeaponKind),
    /// A boost
    Boost(BoostKind),
}

impl ItemKind {
    /// Weapon kind, if this is a weapon.
    pub fn weapon(self) -> Option<WeaponKind> {
        match self {
            ItemKind::Weapon(kind) => Some(kind),
            ItemKind::Boost(_) => None,
        }
    }

    /// Boost kind, if this is a boost.
    pub fn boost(self) -> Option<BoostKind> {
        match self {
            ItemKind::Boost(kind) => Some(kind),
            ItemKind::Weapon(_) => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Weapon(kind) => write!(f, "weapon:{}", kind),
            ItemKind::Boost(kind) => write!(f, "boost:{}", kind),
        }
    }
}
