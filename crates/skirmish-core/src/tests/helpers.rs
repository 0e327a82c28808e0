//! Test helper functions for setting up battles and combatants.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;

use crate::config::BattleConfig;
use crate::entity::{archetype, Archetype, Combatant, EntityId, Team};
use crate::simulation::Battle;

/// One simulation tick at the default cadence.
pub const TICK: Duration = Duration::from_millis(16);

// =============================================================================
// Combatants
// =============================================================================

/// Spawns a combatant of `archetype` at `pos`.
pub fn spawn_at(archetype: Archetype, id: u64, team: Team, pos: Vec2) -> Arc<Combatant> {
    let c = archetype::spawn(archetype, EntityId::new(id), team);
    c.move_to(pos);
    c
}

/// Spawns the standard duel: a controlled Toilet Man at the origin and an
/// opposing Camera Man at `(distance, 0)`.
pub fn duel(distance: f32) -> (Arc<Combatant>, Arc<Combatant>) {
    (
        spawn_at(Archetype::ToiletMan, 1, Team::Controlled, Vec2::ZERO),
        spawn_at(Archetype::CameraMan, 2, Team::Opposing, Vec2::new(distance, 0.0)),
    )
}

// =============================================================================
// Battles
// =============================================================================

/// Default config with a fixed seed.
pub fn seeded_config(seed: u64) -> BattleConfig {
    BattleConfig {
        seed: Some(seed),
        ..BattleConfig::default()
    }
}

/// Creates and initializes a seeded battle in `mode`.
pub async fn start_battle(mode: &str, seed: u64) -> Battle {
    let battle = Battle::new(seeded_config(seed)).expect("valid config");
    battle.initialize(mode).await.expect("known mode");
    battle
}

/// Health, mana and position of every combatant, controlled first.
pub fn vitals(battle: &Battle) -> Vec<(f32, f32, Vec2)> {
    battle
        .controlled()
        .into_iter()
        .chain(battle.opponents())
        .map(|c| (c.health(), c.mana(), c.position()))
        .collect()
}

/// Kills every opponent outright.
pub fn wipe_opponents(battle: &Battle) {
    for opponent in battle.opponents() {
        opponent.take_damage(f32::MAX);
    }
}
