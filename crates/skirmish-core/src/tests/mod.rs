//! Test module for scenario and concurrency tests.
//!
//! - `integration.rs`: End-to-end battle scenarios through the public API
//! - `concurrency.rs`: Tick, controllers and cooldowns racing on shared state
//! - `helpers.rs`: Test setup utilities and factory functions

mod concurrency;
mod helpers;

// Re-export for convenience
pub use helpers::*;
