//! Collision Detection
//!
//! Circle-circle and circle-rectangle tests. Players, projectiles and
//! pickups are circles; walls are axis-aligned rectangles.

use crate::core::vec2::Vec2;
use crate::game::map::Rect;

/// Check if two circles overlap (touching counts).
#[inline]
pub fn circles_overlap(pos_a: Vec2, radius_a: f32, pos_b: Vec2, radius_b: f32) -> bool {
    let combined_radius = radius_a + radius_b;
    pos_a.distance_squared(pos_b) <= combined_radius * combined_radius
}

/// Closest point on `rect` to `point`.
#[inline]
pub fn closest_point_on_rect(point: Vec2, rect: &Rect) -> Vec2 {
    Vec2::new(
        point.x.clamp(rect.x, rect.x + rect.width),
        point.y.clamp(rect.y, rect.y + rect.height),
    )
}

/// Check if a circle overlaps an axis-aligned rectangle.
///
/// Edge contact does not count, so a player can slide along a wall.
#[inline]
pub fn circle_intersects_rect(center: Vec2, radius: f32, rect: &Rect) -> bool {
    if rect.contains_point(center) {
        return true;
    }
    let closest = closest_point_on_rect(center, rect);
    center.distance_squared(closest) < radius * radius
}
