//! Projectile Simulator
//!
//! Integrates projectile motion and resolves hits against a per-tick
//! snapshot of hittable players. Hits are reported as outcomes; the
//! coordinator applies them.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::collision::circles_overlap;
use crate::game::map::ArenaMap;
use crate::game::state::PlayerId;
use crate::game::teams::TeamId;

/// Cap on collision sub-steps per projectile per update.
const MAX_SUBSTEPS: f32 = 256.0;

/// Projectile identifier (monotonic counter).
pub type ProjectileId = u32;

/// Which targets a projectile ignores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitFilter {
    /// Hits everyone
    None,
    /// Ignores the shooter
    ExcludeOwner,
    /// Ignores the shooter's team
    #[default]
    ExcludeTeam,
}

/// What a hit does to its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HitEffect {
    /// Eliminate the target
    Kill,
    /// Stun the target
    Stun {
        /// Stun length (ms)
        duration_ms: u64,
    },
}

/// Parameters for `fire`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectileSpec {
    /// Shooter
    pub owner: PlayerId,
    /// Shooter's team
    pub team: TeamId,
    /// Start position
    pub position: Vec2,
    /// Aim direction (normalized by `fire`)
    pub direction: Vec2,
    /// Speed (units/second)
    pub speed: f32,
    /// Collision radius
    pub radius: f32,
    /// Lifetime (ms)
    pub ttl_ms: u64,
    /// Target filter
    pub filter: HitFilter,
    /// Effect on hit
    pub effect: HitEffect,
}

/// A live projectile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Identifier
    pub id: ProjectileId,
    /// Shooter
    pub owner: PlayerId,
    /// Shooter's team
    pub team: TeamId,
    /// Current position
    pub position: Vec2,
    /// Velocity (units/second)
    pub velocity: Vec2,
    /// Collision radius
    pub radius: f32,
    /// Creation time
    pub created_at: u64,
    /// Expiry time
    pub expires_at: u64,
    /// Target filter
    pub filter: HitFilter,
    /// Effect on hit
    pub effect: HitEffect,
}

impl Projectile {
    /// Check if this projectile may strike `target`.
    pub fn can_hit(&self, target: &Hittable) -> bool {
        match self.filter {
            HitFilter::None => true,
            HitFilter::ExcludeOwner => target.id != self.owner,
            HitFilter::ExcludeTeam => target.id != self.owner && target.team != self.team,
        }
    }
}

/// An entity eligible to be struck this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hittable {
    /// Player id
    pub id: PlayerId,
    /// Team
    pub team: TeamId,
    /// Position
    pub position: Vec2,
    /// Body radius
    pub radius: f32,
}

/// Result of one projectile's update.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectileOutcome {
    /// Struck a player (projectile removed).
    Hit {
        /// Projectile id
        projectile: ProjectileId,
        /// Shooter
        owner: PlayerId,
        /// Struck player
        target: PlayerId,
        /// Effect to apply
        effect: HitEffect,
        /// Impact position
        position: Vec2,
    },
    /// Entered a wall or left the world (projectile removed).
    HitWall {
        /// Projectile id
        projectile: ProjectileId,
        /// Impact position
        position: Vec2,
    },
    /// Lifetime ran out (projectile removed).
    Expired {
        /// Projectile id
        projectile: ProjectileId,
    },
}

/// Projectile simulator.
#[derive(Clone, Debug, Default)]
pub struct ProjectileSimulator {
    projectiles: BTreeMap<ProjectileId, Projectile>,
    next_id: ProjectileId,
}

impl ProjectileSimulator {
    /// Create an empty simulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn one projectile along `spec.direction`.
    pub fn fire(&mut self, spec: &ProjectileSpec, now: u64) -> ProjectileId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let direction = spec.direction.normalize();
        self.projectiles.insert(
            id,
            Projectile {
                id,
                owner: spec.owner,
                team: spec.team,
                position: spec.position,
                velocity: direction.scale(spec.speed),
                radius: spec.radius,
                created_at: now,
                expires_at: now.saturating_add(spec.ttl_ms),
                filter: spec.filter,
                effect: spec.effect,
            },
        );
        id
    }

    /// Spawn `count` projectiles at evenly spaced angles across `spread`
    /// radians, centred on the aim direction.
    pub fn fire_spread(
        &mut self,
        spec: &ProjectileSpec,
        count: u32,
        spread: f32,
        now: u64,
    ) -> Vec<ProjectileId> {
        if count <= 1 {
            return vec![self.fire(spec, now)];
        }

        let base = spec.direction.normalize();
        let step = spread / (count - 1) as f32;
        (0..count)
            .map(|i| {
                let offset = -spread * 0.5 + step * i as f32;
                let shot = ProjectileSpec { direction: base.rotate(offset), ..*spec };
                self.fire(&shot, now)
            })
            .collect()
    }

    /// Advance every projectile by `dt_ms` and resolve collisions.
    ///
    /// Order per projectile: integrate in radius-sized sub-steps, hit
    /// test against `targets` in order, wall test, then lifetime test once
    /// the full step is travelled. A target is struck at most once per
    /// update.
    pub fn update(
        &mut self,
        dt_ms: u64,
        now: u64,
        targets: &[Hittable],
        map: &ArenaMap,
    ) -> Vec<ProjectileOutcome> {
        let dt = dt_ms as f32 / 1000.0;
        let mut outcomes = Vec::new();
        let mut removed = Vec::new();
        let mut struck: BTreeSet<PlayerId> = BTreeSet::new();

        for projectile in self.projectiles.values_mut() {
            let start = projectile.position;
            let travel = projectile.velocity.scale(dt);
            // Each sub-step moves at most one radius
            let steps = (travel.length() / projectile.radius.max(1.0)).ceil().clamp(1.0, MAX_SUBSTEPS) as u32;

            let mut resolved = false;
            for step in 1..=steps {
                projectile.position = if step == steps {
                    start + travel
                } else {
                    start + travel.scale(step as f32 / steps as f32)
                };

                let hit = targets.iter().find(|target| {
                    !struck.contains(&target.id)
                        && projectile.can_hit(target)
                        && circles_overlap(
                            projectile.position,
                            projectile.radius,
                            target.position,
                            target.radius,
                        )
                });

                if let Some(target) = hit {
                    struck.insert(target.id);
                    outcomes.push(ProjectileOutcome::Hit {
                        projectile: projectile.id,
                        owner: projectile.owner,
                        target: target.id,
                        effect: projectile.effect,
                        position: projectile.position,
                    });
                    resolved = true;
                } else if map.blocks_point(projectile.position) {
                    outcomes.push(ProjectileOutcome::HitWall {
                        projectile: projectile.id,
                        position: projectile.position,
                    });
                    resolved = true;
                }
                if resolved {
                    break;
                }
            }

            if resolved {
                removed.push(projectile.id);
            } else if now >= projectile.expires_at {
                outcomes.push(ProjectileOutcome::Expired { projectile: projectile.id });
                removed.push(projectile.id);
            }
        }

        for id in removed {
            self.projectiles.remove(&id);
        }
        outcomes
    }

    /// Look up a projectile.
    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    /// All live projectiles, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    /// Number of live projectiles.
    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    /// No live projectiles.
    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    /// Remove every projectile.
    pub fn clear(&mut self) {
        self.projectiles.clear();
    }
}
