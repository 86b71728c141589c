//! Arena Geometry
//!
//! World bounds plus the wall list. Walls block both movement and
//! projectiles; leaving the world counts as hitting a wall.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::collision::circle_intersects_rect;

/// Axis-aligned rectangle, anchored at its top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width (positive)
    pub width: f32,
    /// Height (positive)
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Check if `point` lies strictly inside the rectangle.
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x > self.x
            && point.x < self.x + self.width
            && point.y > self.y
            && point.y < self.y + self.height
    }

    /// Center of the rectangle.
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Both dimensions are finite and positive.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Static arena geometry.
#[derive(Clone, Debug)]
pub struct ArenaMap {
    /// World width in pixels
    pub width: f32,
    /// World height in pixels
    pub height: f32,
    /// Tile size (clients render on this grid)
    pub tile_size: f32,
    /// Collision volumes
    pub walls: Vec<Rect>,
}

impl ArenaMap {
    /// Create a map from dimensions and walls.
    pub fn new(width: f32, height: f32, tile_size: f32, walls: Vec<Rect>) -> Self {
        Self { width, height, tile_size, walls }
    }

    /// Lower-right corner of the world.
    #[inline]
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Center of the world.
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }

    /// Check if a point is inside the world (edges inclusive).
    #[inline]
    pub fn in_bounds(&self, point: Vec2) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }

    /// Check if a whole circle fits inside the world.
    #[inline]
    pub fn circle_in_bounds(&self, center: Vec2, radius: f32) -> bool {
        center.x - radius >= 0.0
            && center.x + radius <= self.width
            && center.y - radius >= 0.0
            && center.y + radius <= self.height
    }

    /// Clamp a point into the world.
    #[inline]
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        point.clamp(Vec2::ZERO, self.max())
    }

    /// Check if a point is inside any wall or outside the world.
    pub fn blocks_point(&self, point: Vec2) -> bool {
        !self.in_bounds(point) || self.walls.iter().any(|wall| wall.contains_point(point))
    }

    /// Check if a circle (player body) collides with the world edge or a wall.
    pub fn blocks_circle(&self, center: Vec2, radius: f32) -> bool {
        !self.circle_in_bounds(center, radius)
            || self.walls.iter().any(|wall| circle_intersects_rect(center, radius, wall))
    }

    /// Walkable for a body of `radius` at `center`.
    #[inline]
    pub fn is_walkable(&self, center: Vec2, radius: f32) -> bool {
        !self.blocks_circle(center, radius)
    }
}
