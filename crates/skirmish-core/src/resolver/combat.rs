//! Plain-attack resolution and targeting.
//!
//! # Damage Roll
//!
//! `damage = base * U(0.85, 1.15)`, doubled on a critical roll (10%), and
//! never below 1.0. The base is the attacker's attack damage after buffs.
//!
//! # Outcome Order
//!
//! 1. Attacking yourself is `InvalidTarget`.
//! 2. Distance beyond the attacker's reach is `OutOfRange`.
//! 3. A dead attacker or target is `InvalidTarget`.
//! 4. Otherwise damage is rolled and applied; the outcome is `Kill`, `Hit`,
//!    or `Miss` when a shield soaked the whole blow.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entity::{Combatant, DamageReport};

use super::physics;

/// Lower bound of the damage variance factor.
pub const DAMAGE_VARIANCE_MIN: f32 = 0.85;

/// Upper bound of the damage variance factor.
pub const DAMAGE_VARIANCE_MAX: f32 = 1.15;

/// Probability that an attack is a critical hit.
pub const CRIT_CHANCE: f32 = 0.10;

/// Damage multiplier of a critical hit.
pub const CRIT_MULTIPLIER: f32 = 2.0;

/// Floor of any rolled damage.
pub const MIN_DAMAGE: f32 = 1.0;

/// Result of a plain attack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttackOutcome {
    /// Damage landed and the target survived.
    Hit {
        /// Health removed.
        damage: f32,
    },
    /// The attack connected but removed no health.
    Miss,
    /// Damage landed and the target died.
    Kill {
        /// Health removed.
        damage: f32,
    },
    /// The target is beyond the attacker's reach.
    OutOfRange,
    /// Attacker or target is dead, or they are the same combatant.
    InvalidTarget,
}

impl AttackOutcome {
    /// Health removed by this attack.
    #[must_use]
    pub fn damage(self) -> f32 {
        match self {
            Self::Hit { damage } | Self::Kill { damage } => damage,
            Self::Miss | Self::OutOfRange | Self::InvalidTarget => 0.0,
        }
    }

    /// Whether the attack landed (`Hit` or `Kill`).
    #[must_use]
    pub fn landed(self) -> bool {
        matches!(self, Self::Hit { .. } | Self::Kill { .. })
    }
}

/// Rolls damage for a blow with base damage `base`.
pub fn roll_damage<R: Rng + ?Sized>(base: f32, rng: &mut R) -> f32 {
    let factor = rng.gen_range(DAMAGE_VARIANCE_MIN..DAMAGE_VARIANCE_MAX);
    let crit = if rng.gen::<f32>() < CRIT_CHANCE {
        CRIT_MULTIPLIER
    } else {
        1.0
    };
    (base * factor * crit).max(MIN_DAMAGE)
}

/// Resolves a plain attack from `attacker` on `target`.
pub fn resolve_attack<R: Rng + ?Sized>(
    attacker: &Combatant,
    target: &Combatant,
    rng: &mut R,
) -> AttackOutcome {
    if attacker.id() == target.id() {
        return AttackOutcome::InvalidTarget;
    }
    if physics::distance(attacker.position(), target.position()) > attacker.stats().attack_range {
        return AttackOutcome::OutOfRange;
    }
    if !attacker.is_alive() || !target.is_alive() {
        return AttackOutcome::InvalidTarget;
    }

    let damage = roll_damage(attacker.effective_attack_damage(), rng);
    let DamageReport { applied, killed } = target.strike(damage);

    let outcome = if applied <= 0.0 {
        AttackOutcome::Miss
    } else if killed {
        AttackOutcome::Kill { damage: applied }
    } else {
        AttackOutcome::Hit { damage: applied }
    };
    tracing::trace!(
        attacker = %attacker.id(),
        target = %target.id(),
        rolled = damage,
        ?outcome,
        "Attack resolved"
    );
    outcome
}

/// Alive candidate closest to `entity`, excluding `entity` itself.
///
/// Ties go to the earliest candidate.
#[must_use]
pub fn nearest_enemy<'a>(
    entity: &Combatant,
    candidates: &'a [Arc<Combatant>],
) -> Option<&'a Arc<Combatant>> {
    let origin = entity.position();
    let mut best: Option<(&Arc<Combatant>, f32)> = None;
    for candidate in candidates {
        if candidate.id() == entity.id() || !candidate.is_alive() {
            continue;
        }
        let d = physics::distance(origin, candidate.position());
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(c, _)| c)
}
