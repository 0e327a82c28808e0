//! Battle configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use skirmish_core::config::BattleConfig;
//!
//! let config = BattleConfig::from_json_str("{}").unwrap();
//! assert_eq!(config, BattleConfig::default());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai::Difficulty;
use crate::error::{BattleError, Result};
use crate::resolver::ArenaBounds;

/// Tunables for one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Simulation tick cadence.
    pub tick_interval_ms: u64,
    /// Controller polling cadence.
    pub ai_poll_interval_ms: u64,
    /// Refresh cadence of cooldown progress publishers.
    pub cooldown_refresh_ms: u64,
    /// Controller pause after a cast.
    pub skill_settle_ms: u64,
    /// Delay between `Loading` and `Playing`.
    pub loading_delay_ms: u64,
    /// Mana restored to the controlled combatant per tick.
    pub controlled_mana_regen: f32,
    /// Mana restored to each opposing combatant per tick.
    pub opposing_mana_regen: f32,
    /// Arena size and margin.
    pub arena: ArenaBounds,
    /// Controller difficulty.
    pub difficulty: Difficulty,
    /// Master seed for all randomness. Drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            ai_poll_interval_ms: 100,
            cooldown_refresh_ms: 50,
            skill_settle_ms: 500,
            loading_delay_ms: 0,
            controlled_mana_regen: 1.0,
            opposing_mana_regen: 0.5,
            arena: ArenaBounds::default(),
            difficulty: Difficulty::Normal,
            seed: None,
        }
    }
}

impl BattleConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::ConfigParse`] for malformed JSON and
    /// [`BattleError::InvalidConfig`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let positive_ms = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("ai_poll_interval_ms", self.ai_poll_interval_ms),
            ("cooldown_refresh_ms", self.cooldown_refresh_ms),
        ];
        for (name, value) in positive_ms {
            if value == 0 {
                return Err(BattleError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        for (name, value) in [
            ("controlled_mana_regen", self.controlled_mana_regen),
            ("opposing_mana_regen", self.opposing_mana_regen),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BattleError::InvalidConfig(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        let a = &self.arena;
        if !(a.width.is_finite() && a.height.is_finite() && a.width > 0.0 && a.height > 0.0) {
            return Err(BattleError::InvalidConfig(
                "arena width and height must be > 0".into(),
            ));
        }
        if !a.margin.is_finite() || a.margin < 0.0 || a.margin * 2.0 >= a.width.min(a.height) {
            return Err(BattleError::InvalidConfig(
                "arena margin must leave room inside the arena".into(),
            ));
        }
        Ok(())
    }

    /// Tick cadence.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Controller polling cadence.
    #[must_use]
    pub fn ai_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ai_poll_interval_ms)
    }

    /// Cooldown publisher cadence.
    #[must_use]
    pub fn cooldown_refresh(&self) -> Duration {
        Duration::from_millis(self.cooldown_refresh_ms)
    }

    /// Controller pause after a cast.
    #[must_use]
    pub fn skill_settle(&self) -> Duration {
        Duration::from_millis(self.skill_settle_ms)
    }

    /// Delay between `Loading` and `Playing`.
    #[must_use]
    pub fn loading_delay(&self) -> Duration {
        Duration::from_millis(self.loading_delay_ms)
    }
}
