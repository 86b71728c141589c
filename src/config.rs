//! Arena Configuration
//!
//! Startup description of an arena: world size, teams with their bases
//! and spawn points, item spawns, walls and match rules. Loaded from
//! JSON; a built-in arena is used when no file is given.

use std::collections::BTreeSet;
use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::items::{BoostKind, ItemKind, WeaponKind};
use crate::game::map::{ArenaMap, Rect};
use crate::game::pickup::{PickupConfig, DEFAULT_PICKUP_RADIUS};
use crate::game::teams::TeamId;
use crate::game::tick::MatchConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Arena file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Arena file is not valid JSON for `ArenaConfig`.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Arena is structurally unusable.
    #[error("invalid arena: {0}")]
    Invalid(String),

    /// Environment variable holds a bad socket address.
    #[error("invalid address in {key}: {value}")]
    InvalidAddress {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },

    /// Environment variable holds a bad value.
    #[error("invalid value in {key}: {value}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },
}

/// World dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Tile size (for clients)
    pub tile_size: f32,
}

/// One team.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Team id
    pub id: TeamId,
    /// Display name
    pub name: String,
    /// Flag base
    pub base: Vec2,
    /// Spawn points
    pub spawn_points: Vec<Vec2>,
    /// Member cap
    pub max_size: usize,
}

/// Full arena description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// World dimensions
    pub world: WorldConfig,
    /// Teams
    pub teams: Vec<TeamConfig>,
    /// Item spawns
    #[serde(default)]
    pub items: Vec<PickupConfig>,
    /// Blocking geometry
    #[serde(default)]
    pub walls: Vec<Rect>,
    /// Match rules
    #[serde(default)]
    pub rules: MatchConfig,
}

impl Default for ArenaConfig {
    /// Two teams on a 1600x900 field with a central wall.
    fn default() -> Self {
        let item = |kind: ItemKind, x: f32, y: f32, respawn_ms: u64| PickupConfig {
            kind,
            position: Vec2::new(x, y),
            radius: DEFAULT_PICKUP_RADIUS,
            respawn_ms,
            max_uses: None,
            persistent: false,
        };

        Self {
            world: WorldConfig { width: 1600.0, height: 900.0, tile_size: 32.0 },
            teams: vec![
                TeamConfig {
                    id: TeamId::RED,
                    name: "Red".into(),
                    base: Vec2::new(150.0, 450.0),
                    spawn_points: vec![
                        Vec2::new(120.0, 380.0),
                        Vec2::new(120.0, 520.0),
                        Vec2::new(200.0, 450.0),
                    ],
                    max_size: 8,
                },
                TeamConfig {
                    id: TeamId::BLUE,
                    name: "Blue".into(),
                    base: Vec2::new(1450.0, 450.0),
                    spawn_points: vec![
                        Vec2::new(1480.0, 380.0),
                        Vec2::new(1480.0, 520.0),
                        Vec2::new(1400.0, 450.0),
                    ],
                    max_size: 8,
                },
            ],
            items: vec![
                item(ItemKind::Weapon(WeaponKind::Blaster), 800.0, 150.0, 10_000),
                item(ItemKind::Weapon(WeaponKind::Scatter), 600.0, 450.0, 15_000),
                item(ItemKind::Weapon(WeaponKind::Stunner), 1000.0, 450.0, 15_000),
                item(ItemKind::Boost(BoostKind::Speed), 800.0, 750.0, 20_000),
                item(ItemKind::Boost(BoostKind::Shield), 560.0, 200.0, 20_000),
                item(ItemKind::Boost(BoostKind::Overcharge), 1040.0, 700.0, 20_000),
            ],
            walls: vec![
                Rect::new(760.0, 350.0, 80.0, 200.0),
                Rect::new(500.0, 600.0, 160.0, 40.0),
                Rect::new(940.0, 260.0, 160.0, 40.0),
            ],
            rules: MatchConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Parse from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Static geometry.
    pub fn map(&self) -> ArenaMap {
        ArenaMap::new(self.world.width, self.world.height, self.world.tile_size, self.walls.clone())
    }

    /// Check the arena can host a match.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.world.width > 0.0 && self.world.height > 0.0 && self.world.tile_size > 0.0) {
            return invalid("world dimensions must be positive".into());
        }
        if self.teams.len() < 2 {
            return invalid(format!("need at least two teams, got {}", self.teams.len()));
        }
        if let Some(wall) = self.walls.iter().find(|w| !w.is_valid()) {
            return invalid(format!("wall {:?} has no area", wall));
        }

        let rules = &self.rules;
        if rules.drop_offset_min > rules.drop_offset_max {
            return invalid("drop offset range is inverted".into());
        }
        if rules.capture_limit == 0 {
            return invalid("capture limit must be at least 1".into());
        }

        let map = self.map();
        let placeable = |p: Vec2| map.in_bounds(p) && !map.blocks_point(p);

        let mut ids = BTreeSet::new();
        for team in &self.teams {
            if !ids.insert(team.id) {
                return invalid(format!("duplicate team {}", team.id));
            }
            if team.max_size == 0 {
                return invalid(format!("team {} has no slots", team.id));
            }
            if team.spawn_points.is_empty() {
                return invalid(format!("team {} has no spawn points", team.id));
            }
            if !placeable(team.base) {
                return invalid(format!("team {} base {} is outside the world or in a wall", team.id, team.base));
            }
            if let Some(p) = team.spawn_points.iter().find(|p| !placeable(**p)) {
                return invalid(format!("team {} spawn point {} is outside the world or in a wall", team.id, p));
            }
        }

        if let Some(item) = self.items.iter().find(|i| !placeable(i.position)) {
            return invalid(format!("{} at {} is outside the world or in a wall", item.kind, item.position));
        }
        Ok(())
    }
}
