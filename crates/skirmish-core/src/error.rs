//! Error types for the battle core.
//!
//! Gameplay misuse (moving a dead combatant, casting on cooldown, attacking
//! out of range) is never an error: those requests are no-ops with an
//! observable outcome. [`BattleError`] is reserved for setup and
//! configuration failures that the outer shell has to surface.

use thiserror::Error;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for battle setup and configuration.
#[derive(Debug, Error)]
pub enum BattleError {
    /// The requested battle mode has no roster mapping.
    #[error("Unknown battle mode: {0}")]
    UnknownMode(String),

    /// The requested archetype name is not one of the known combatant kinds.
    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    /// The requested AI difficulty name is not recognised.
    #[error("Unknown difficulty: {0}")]
    UnknownDifficulty(String),

    /// A configuration value is outside its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// `restart()` was requested before any battle was initialized.
    #[error("Battle has not been initialized")]
    NotInitialized,
}
