//! Resolver module: the stateless combat math.
//!
//! The resolver owns no combatant state. It reads positions and stats
//! through each combatant's lock and writes damage through
//! [`Combatant::take_damage`], so the same functions serve both the manual
//! intent path and the autonomous controllers.
//!
//! # Available Pieces
//!
//! - [`physics`]: distances, directions, arena clamping
//! - [`combat`]: damage rolls, attack resolution, target search
//! - [`CombatResolver`]: the above bound to one arena

pub mod combat;
pub mod physics;

use std::sync::Arc;

use glam::Vec2;
use rand::Rng;

pub use combat::{nearest_enemy, resolve_attack, roll_damage, AttackOutcome};
pub use physics::ArenaBounds;

use crate::entity::Combatant;

/// Combat math parameterized by a fixed arena.
///
/// # Example
///
/// ```
/// use skirmish_core::resolver::CombatResolver;
/// use glam::Vec2;
///
/// let resolver = CombatResolver::default();
/// assert_eq!(resolver.clamp_to_world(Vec2::new(-5.0, 2000.0)), Vec2::new(50.0, 750.0));
/// assert_eq!(resolver.distance(Vec2::ZERO, Vec2::new(3.0, 4.0)), 5.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombatResolver {
    bounds: ArenaBounds,
}

impl CombatResolver {
    /// Creates a resolver for `bounds`.
    #[must_use]
    pub fn new(bounds: ArenaBounds) -> Self {
        Self { bounds }
    }

    /// Arena this resolver clamps to.
    #[must_use]
    pub fn bounds(&self) -> &ArenaBounds {
        &self.bounds
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(&self, a: Vec2, b: Vec2) -> f32 {
        physics::distance(a, b)
    }

    /// Whether `target` is within `range` of `attacker`.
    #[must_use]
    pub fn in_range(&self, attacker: &Combatant, target: &Combatant, range: f32) -> bool {
        physics::distance(attacker.position(), target.position()) <= range
    }

    /// Whether `target` is within `attacker`'s plain attack reach.
    #[must_use]
    pub fn in_attack_range(&self, attacker: &Combatant, target: &Combatant) -> bool {
        self.in_range(attacker, target, attacker.stats().attack_range)
    }

    /// Clamps `pos` into the arena.
    #[must_use]
    pub fn clamp_to_world(&self, pos: Vec2) -> Vec2 {
        self.bounds.clamp(pos)
    }

    /// Unit vector toward `to`, zero when coincident.
    #[must_use]
    pub fn move_direction(&self, from: Vec2, to: Vec2) -> Vec2 {
        physics::move_direction(from, to)
    }

    /// See [`combat::nearest_enemy`].
    #[must_use]
    pub fn nearest_enemy<'a>(
        &self,
        entity: &Combatant,
        candidates: &'a [Arc<Combatant>],
    ) -> Option<&'a Arc<Combatant>> {
        combat::nearest_enemy(entity, candidates)
    }

    /// See [`combat::resolve_attack`].
    pub fn resolve_attack<R: Rng + ?Sized>(
        &self,
        attacker: &Combatant,
        target: &Combatant,
        rng: &mut R,
    ) -> AttackOutcome {
        combat::resolve_attack(attacker, target, rng)
    }

    /// Moves `entity` along `direction` for `dt` seconds at its current
    /// speed and returns the new position. Dead combatants stay put.
    pub fn step_toward(&self, entity: &Combatant, direction: Vec2, dt: f32) -> Vec2 {
        let speed = entity.effective_speed();
        entity.with_state(|state| {
            if state.is_alive() {
                let next = physics::step(state.position(), direction, speed, dt, &self.bounds);
                state.move_to(next);
            }
            state.position()
        })
    }
}
