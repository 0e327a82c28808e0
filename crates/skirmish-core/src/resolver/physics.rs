//! Geometry helpers shared by the resolver, abilities and controllers.
//!
//! All functions are pure. Movement is expressed as a step of
//! `speed * dt` along a unit direction, then clamped into the arena.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Default arena width.
pub const ARENA_WIDTH: f32 = 1000.0;

/// Default arena height.
pub const ARENA_HEIGHT: f32 = 800.0;

/// Default distance kept from every arena edge.
pub const ARENA_MARGIN: f32 = 50.0;

/// Arena size and edge margin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaBounds {
    /// Width along x.
    pub width: f32,
    /// Height along y.
    pub height: f32,
    /// Minimum distance from any edge.
    pub margin: f32,
}

impl Default for ArenaBounds {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            margin: ARENA_MARGIN,
        }
    }
}

impl ArenaBounds {
    /// Clamps each axis of `pos` into `[margin, dimension - margin]`.
    ///
    /// When the margin leaves no room on an axis the position is pinned to
    /// that axis' midpoint.
    #[must_use]
    pub fn clamp(&self, pos: Vec2) -> Vec2 {
        Vec2::new(
            clamp_axis(pos.x, self.margin, self.width - self.margin),
            clamp_axis(pos.y, self.margin, self.height - self.margin),
        )
    }
}

fn clamp_axis(v: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        (lo + hi) / 2.0
    } else {
        v.clamp(lo, hi)
    }
}

/// Euclidean distance.
#[must_use]
pub fn distance(a: Vec2, b: Vec2) -> f32 {
    a.distance(b)
}

/// Unit vector from `from` toward `to`, zero when the points coincide.
#[must_use]
pub fn move_direction(from: Vec2, to: Vec2) -> Vec2 {
    (to - from).normalize_or_zero()
}

/// Pulls `target` back along the line from `origin` so it lies within
/// `range` of `origin`.
#[must_use]
pub fn pull_within(origin: Vec2, target: Vec2, range: f32) -> Vec2 {
    let range = range.max(0.0);
    if distance(origin, target) <= range {
        target
    } else {
        origin + move_direction(origin, target) * range
    }
}

/// Position after moving from `from` along `direction` at `speed` for
/// `dt` seconds, clamped into `bounds`.
#[must_use]
pub fn step(from: Vec2, direction: Vec2, speed: f32, dt: f32, bounds: &ArenaBounds) -> Vec2 {
    bounds.clamp(from + direction * speed * dt)
}
