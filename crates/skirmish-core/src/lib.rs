//! # Skirmish Core
//!
//! Real-time arena battle core for Skirmish.
//!
//! One controlled combatant fights one or more autonomous opponents. Each
//! combatant has health, mana, a position and a handful of timed abilities.
//! Everything runs concurrently on tokio: a fixed-rate tick, one controller
//! task per opponent, and per-ability cooldown publishers, all acting on
//! shared combatant state.
//!
//! ## Architecture
//!
//! - **Entities**: combatant state with clamped, serialized mutators
//! - **Abilities**: immutable definitions plus cooldown state machines
//! - **Resolver**: stateless combat math (range, damage, targeting)
//! - **AI**: per-opponent decision loops gated by reaction time
//! - **Simulation**: phase machine, tick loop, manual intents
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skirmish_core::{Battle, BattleConfig};
//!
//! let battle = Battle::new(BattleConfig::default())?;
//! battle.initialize("double").await?;
//!
//! let mut snapshots = battle.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     if snapshots.borrow().victory.is_some() {
//!         break;
//!     }
//!     battle.attack();
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ability;
pub mod ai;
pub mod config;
pub mod entity;
pub mod error;
pub mod resolver;
pub mod simulation;

#[cfg(test)]
mod tests;

pub use ability::{
    Ability, AbilityCategory, AbilityDef, AbilityEffect, AbilitySnapshot, CastReport,
};
pub use ai::{AiState, Difficulty};
pub use config::BattleConfig;
pub use entity::{
    Archetype, Combatant, DamageReport, EntityId, EntitySnapshot, Facing, StatusFlags, Team,
};
pub use error::{BattleError, Result};
pub use resolver::{ArenaBounds, AttackOutcome, CombatResolver};
pub use simulation::{
    Battle, BattleMode, BattlePhase, BattleSnapshot, PhaseTag, PlayingState,
};
