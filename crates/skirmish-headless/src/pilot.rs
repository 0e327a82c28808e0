//! Scripted pilot for the controlled combatant.
//!
//! Each step the pilot closes in on the nearest living opponent, fires any
//! ready ability whose range covers the target, and swings a plain attack
//! once in reach. It only uses the battle's public intents.

use skirmish_core::resolver::nearest_enemy;
use skirmish_core::{AttackOutcome, Battle};

/// How close the pilot walks before it stops to fight, as a fraction of reach.
const ENGAGE_FRACTION: f32 = 0.8;

/// Counters for the final report.
#[derive(Debug, Default, Clone, Copy)]
pub struct PilotStats {
    /// Steps taken.
    pub moves: u32,
    /// Plain attacks that landed.
    pub hits: u32,
    /// Abilities cast.
    pub casts: u32,
}

/// Drives the controlled combatant with a fixed script.
#[derive(Debug, Default)]
pub struct Pilot {
    stats: PilotStats,
}

impl Pilot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> PilotStats {
        self.stats
    }

    /// Performs one step. Returns `false` when there is nothing to do.
    pub fn step(&mut self, battle: &Battle) -> bool {
        let Some(me) = battle.controlled() else {
            return false;
        };
        let opponents = battle.opponents();
        let Some(target) = nearest_enemy(&me, &opponents) else {
            return false;
        };

        let gap = target.position() - me.position();
        let distance = gap.length();

        for ability in me.all_abilities() {
            if distance <= ability.def().range.max(me.stats().attack_range)
                && me.can_use(ability)
                && battle.use_ability(ability.id())
            {
                tracing::debug!(ability = ability.id(), "Pilot cast");
                self.stats.casts += 1;
            }
        }

        if distance > me.stats().attack_range * ENGAGE_FRACTION {
            let dir = gap.normalize_or_zero();
            if battle.move_by(dir.x, dir.y) {
                self.stats.moves += 1;
            }
        } else {
            battle.move_by(0.0, 0.0);
        }

        if let Some(AttackOutcome::Hit { .. } | AttackOutcome::Kill { .. }) = battle.attack() {
            self.stats.hits += 1;
        }
        true
    }
}
