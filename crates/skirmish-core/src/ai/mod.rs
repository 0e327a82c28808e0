//! Autonomous controllers for opposing combatants.
//!
//! Each opposing combatant gets one [`AiController`]: a five-state machine
//! gated by a reaction time, run on its own task by [`controller::spawn`].
//! Controllers use the same resolver and ability APIs the manual intent
//! path uses.

pub mod controller;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BattleError;

pub use controller::{AiController, AiStep, ControllerHandle};

/// Controller difficulty.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Slow reactions, rarely casts, never retreats.
    Easy,
    /// The default.
    #[default]
    Normal,
    /// Fast reactions, casts whenever it can.
    Hard,
}

/// Tuning derived from a [`Difficulty`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyProfile {
    /// Minimum interval between two actions.
    pub reaction_time: Duration,
    /// Probability of preferring an ability over a plain attack.
    pub skill_preference: f32,
    /// Health fraction below which the controller backs off once.
    pub retreat_threshold: Option<f32>,
}

impl Difficulty {
    /// Every difficulty, easiest first.
    pub const ALL: [Self; 3] = [Self::Easy, Self::Normal, Self::Hard];

    /// The tuning for this difficulty.
    #[must_use]
    pub const fn profile(self) -> DifficultyProfile {
        match self {
            Self::Easy => DifficultyProfile {
                reaction_time: Duration::from_millis(1500),
                skill_preference: 0.3,
                retreat_threshold: None,
            },
            Self::Normal => DifficultyProfile {
                reaction_time: Duration::from_millis(1000),
                skill_preference: 0.5,
                retreat_threshold: Some(0.15),
            },
            Self::Hard => DifficultyProfile {
                reaction_time: Duration::from_millis(500),
                skill_preference: 0.8,
                retreat_threshold: Some(0.25),
            },
        }
    }

    const fn key(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Difficulty {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BattleError::UnknownDifficulty(s.to_string()))
    }
}

/// Controller state.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    /// Deciding whether to close in or fight.
    #[default]
    Idle,
    /// Closing the distance to the target.
    MovingToTarget,
    /// In reach: attacking or casting.
    Attacking,
    /// Waiting for a cast to settle.
    UsingSkill,
    /// Backing away at low health.
    Retreating,
}
