//! Concurrency tests: many tasks mutating shared combatants at once.
//!
//! The multi-threaded tests check the clamping and once-only death rules
//! hold under real contention. The paused-clock tests check task lifetimes:
//! what runs while playing and what stops when the battle ends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::entity::{Archetype, Team};
use crate::simulation::PhaseTag;

use super::helpers::{spawn_at, start_battle, vitals, wipe_opponents};

// =============================================================================
// Shared state under contention
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_damage_clamps_and_kills() {
    let target = spawn_at(Archetype::ToiletMan, 1, Team::Controlled, Vec2::ZERO);
    let healed = Arc::new(AtomicU32::new(0));
    let mut set = JoinSet::new();

    for _ in 0..16 {
        let target = Arc::clone(&target);
        let healed = Arc::clone(&healed);
        set.spawn(async move {
            let mut applied = 0.0f32;
            for _ in 0..100 {
                let hit = target.take_damage(7.0);
                applied += hit;
                let h = target.health();
                assert!((0.0..=1200.0).contains(&h));
                if target.is_alive() {
                    healed.fetch_add(1, Ordering::SeqCst);
                }
                target.heal(1.0);
                tokio::task::yield_now().await;
            }
            applied
        });
    }

    let mut total = 0.0;
    while let Some(applied) = set.join_next().await {
        total += applied.unwrap();
    }

    assert!(!target.is_alive());
    assert_eq!(target.health(), 0.0);
    // Every point of health removed was either starting health or healed back.
    let max_healed = healed.load(Ordering::SeqCst) as f32;
    assert!(total >= 1200.0 - 1e-2);
    assert!(total <= 1200.0 + max_healed + 1e-2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_lethal_blows_report_one_kill() {
    for _ in 0..50 {
        let target = spawn_at(Archetype::TvMan, 1, Team::Opposing, Vec2::ZERO);
        let mut set = JoinSet::new();
        for _ in 0..8 {
            let target = Arc::clone(&target);
            set.spawn(async move { target.strike(400.0).killed });
        }

        let mut kills = 0;
        while let Some(killed) = set.join_next().await {
            kills += u32::from(killed.unwrap());
        }
        assert_eq!(kills, 1);
        assert!(!target.is_alive());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mana_spend_never_overdraws() {
    let caster = spawn_at(Archetype::CameraMan, 1, Team::Opposing, Vec2::ZERO);
    let mut set = JoinSet::new();

    for _ in 0..8 {
        let caster = Arc::clone(&caster);
        set.spawn(async move {
            let mut spent = 0u32;
            for _ in 0..50 {
                if caster.consume_mana(7.0) {
                    spent += 1;
                }
                tokio::task::yield_now().await;
            }
            spent
        });
    }

    let mut spent = 0;
    while let Some(n) = set.join_next().await {
        spent += n.unwrap();
    }

    // 600 mana buys 85 spends of 7 with 5 left over.
    assert_eq!(spent, 85);
    assert!((caster.mana() - 5.0).abs() < 1e-3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_casts_fire_once() {
    let caster = spawn_at(Archetype::TvMan, 1, Team::Opposing, Vec2::ZERO);
    let victim = spawn_at(Archetype::ToiletMan, 2, Team::Controlled, Vec2::new(100.0, 0.0));
    let field = Arc::new(vec![Arc::clone(&caster), Arc::clone(&victim)]);
    let mut set = JoinSet::new();

    for _ in 0..8 {
        let caster = Arc::clone(&caster);
        let field = Arc::clone(&field);
        set.spawn(async move {
            let shock = Arc::clone(&caster.abilities()[0]);
            shock.cast(&caster, Some(Vec2::new(100.0, 0.0)), &field).is_some()
        });
    }

    let mut casts = 0;
    while let Some(fired) = set.join_next().await {
        if fired.unwrap() {
            casts += 1;
        }
    }

    assert_eq!(casts, 1);
    assert_eq!(caster.mana(), 740.0);
    assert_eq!(victim.health(), 1020.0);
}

// =============================================================================
// Task lifetimes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn tick_loop_runs_at_fixed_cadence() {
    let battle = start_battle("single", 3).await;
    let mut rx = battle.subscribe();

    sleep(Duration::from_millis(1000)).await;
    let snap = rx.borrow_and_update().clone();
    assert_eq!(snap.phase, PhaseTag::Playing);
    assert!((60..=63).contains(&snap.tick), "tick {}", snap.tick);
    assert!(rx.has_changed().is_ok());
    battle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn mana_regenerates_over_time() {
    let battle = start_battle("single", 3).await;
    let controlled = battle.controlled().unwrap();
    controlled.consume_mana(300.0);

    sleep(Duration::from_millis(800)).await;
    // ~50 ticks at 1.0 per tick
    assert!(controlled.mana() >= 140.0, "mana {}", controlled.mana());
    battle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn everything_stops_once_over() {
    let battle = start_battle("double", 8).await;
    sleep(Duration::from_secs(2)).await;

    wipe_opponents(&battle);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(battle.outcome(), Some(true));

    let frozen = battle.snapshot();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(battle.snapshot(), frozen);
    assert_eq!(battle.subscribe().borrow().tick, frozen.tick);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_controllers() {
    let battle = start_battle("double", 8).await;
    let controlled = battle.controlled().unwrap();
    battle.shutdown();

    let health = controlled.health();
    let mana = controlled.mana();
    sleep(Duration::from_secs(30)).await;
    assert_eq!(controlled.health(), health);
    assert_eq!(controlled.mana(), mana);
}

#[tokio::test(start_paused = true)]
async fn dropped_battle_leaves_no_running_tasks() {
    let battle = start_battle("double", 8).await;
    let opponents = battle.opponents();
    let controlled = battle.controlled().unwrap();
    drop(battle);

    let before = vitals_of(&controlled, &opponents);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(vitals_of(&controlled, &opponents), before);
}

#[tokio::test(start_paused = true)]
async fn cooldown_publisher_outlives_nothing() {
    let caster = spawn_at(Archetype::CameraMan, 1, Team::Opposing, Vec2::ZERO);
    let flash = Arc::clone(&caster.abilities()[0]);
    let rx = flash.subscribe();
    assert!(flash.cast(&caster, None, &[]).is_some());

    // Drop every strong reference while the publisher is mid-countdown.
    drop(flash);
    drop(caster);
    sleep(Duration::from_secs(1)).await;
    assert!(rx.has_changed().is_err());
}

#[tokio::test(start_paused = true)]
async fn restart_retires_previous_controllers() {
    let battle = start_battle("single", 4).await;
    let old_controlled = battle.controlled().unwrap();
    battle.restart().await.unwrap();

    let frozen = old_controlled.health();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(old_controlled.health(), frozen);
    assert_eq!(vitals(&battle).len(), 2);
    battle.shutdown();
}

fn vitals_of(
    controlled: &Arc<crate::entity::Combatant>,
    opponents: &[Arc<crate::entity::Combatant>],
) -> Vec<(f32, f32)> {
    std::iter::once(controlled)
        .chain(opponents)
        .map(|c| (c.health(), c.mana()))
        .collect()
}
