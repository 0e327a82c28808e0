//! Timed status effects carried by a combatant.
//!
//! Statuses are installed by ability effects (shield, empower, slow, haste) and
//! expire on their own. Expiry is evaluated lazily against the clock: every
//! read sweeps effects whose deadline has passed, and the simulation tick
//! sweeps all combatants once per tick.

use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

bitflags! {
    /// Active status flags on a combatant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StatusFlags: u8 {
        /// A shield pool absorbs incoming damage before health.
        const SHIELDED = 1 << 0;
        /// Basic attack and ability damage are scaled up.
        const EMPOWERED = 1 << 1;
        /// Movement speed is scaled down.
        const SLOWED = 1 << 2;
        /// Movement speed is scaled up.
        const HASTED = 1 << 3;
    }
}

/// Timed effect slot: a magnitude and the instant it lapses.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timed {
    value: f32,
    until: Instant,
}

impl Timed {
    fn new(value: f32, duration: Duration, now: Instant) -> Self {
        Self {
            value,
            until: now + duration,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.until
    }
}

/// All timed statuses on one combatant.
///
/// Lives inside the combatant's locked state, so every method here runs
/// under that lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusEffects {
    shield: Option<Timed>,
    empower: Option<Timed>,
    slow: Option<Timed>,
    haste: Option<Timed>,
}

impl StatusEffects {
    /// Creates an empty status set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every effect whose deadline is at or before `now`.
    pub fn sweep(&mut self, now: Instant) {
        for slot in [
            &mut self.shield,
            &mut self.empower,
            &mut self.slow,
            &mut self.haste,
        ] {
            if slot.is_some_and(|t| !t.is_live(now)) {
                *slot = None;
            }
        }
        if self.shield.is_some_and(|t| t.value <= 0.0) {
            self.shield = None;
        }
    }

    /// Removes every effect.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns the currently active flags.
    #[must_use]
    pub fn flags(&self, now: Instant) -> StatusFlags {
        let mut flags = StatusFlags::empty();
        if self.shield.is_some_and(|t| t.is_live(now) && t.value > 0.0) {
            flags.insert(StatusFlags::SHIELDED);
        }
        if self.empower.is_some_and(|t| t.is_live(now)) {
            flags.insert(StatusFlags::EMPOWERED);
        }
        if self.slow.is_some_and(|t| t.is_live(now)) {
            flags.insert(StatusFlags::SLOWED);
        }
        if self.haste.is_some_and(|t| t.is_live(now)) {
            flags.insert(StatusFlags::HASTED);
        }
        flags
    }

    /// Remaining shield pool (0 when unshielded or expired).
    #[must_use]
    pub fn shield(&self, now: Instant) -> f32 {
        self.shield
            .filter(|t| t.is_live(now))
            .map_or(0.0, |t| t.value)
    }

    /// Installs a shield. A stronger or longer shield replaces a weaker one;
    /// shields do not stack.
    pub fn apply_shield(&mut self, amount: f32, duration: Duration, now: Instant) {
        if amount <= 0.0 || duration.is_zero() {
            return;
        }
        let incoming = Timed::new(amount, duration, now);
        match self.shield {
            Some(current) if current.is_live(now) && current.value >= amount => {
                self.shield = Some(Timed {
                    value: current.value,
                    until: current.until.max(incoming.until),
                });
            }
            _ => self.shield = Some(incoming),
        }
    }

    /// Installs (or refreshes) a damage multiplier.
    pub fn apply_empower(&mut self, multiplier: f32, duration: Duration, now: Instant) {
        if multiplier <= 0.0 || duration.is_zero() {
            return;
        }
        self.empower = Some(Timed::new(multiplier, duration, now));
    }

    /// Installs (or refreshes) a movement multiplier in `[0, 1]`.
    pub fn apply_slow(&mut self, factor: f32, duration: Duration, now: Instant) {
        if duration.is_zero() {
            return;
        }
        self.slow = Some(Timed::new(factor.clamp(0.0, 1.0), duration, now));
    }

    /// Installs (or refreshes) a movement multiplier of at least 1.
    pub fn apply_haste(&mut self, factor: f32, duration: Duration, now: Instant) {
        if factor.is_nan() || factor <= 1.0 || duration.is_zero() {
            return;
        }
        self.haste = Some(Timed::new(factor, duration, now));
    }

    /// Soaks up as much of `amount` as the shield allows and returns what
    /// is left for health.
    pub fn absorb(&mut self, amount: f32, now: Instant) -> f32 {
        let Some(shield) = self.shield.as_mut().filter(|t| t.is_live(now)) else {
            return amount;
        };
        let soaked = amount.min(shield.value);
        shield.value -= soaked;
        if shield.value <= 0.0 {
            self.shield = None;
        }
        amount - soaked
    }

    /// Multiplier applied to outgoing damage.
    #[must_use]
    pub fn damage_multiplier(&self, now: Instant) -> f32 {
        self.empower
            .filter(|t| t.is_live(now))
            .map_or(1.0, |t| t.value)
    }

    /// Multiplier applied to movement speed. Slow and haste compound.
    #[must_use]
    pub fn speed_multiplier(&self, now: Instant) -> f32 {
        let live = |slot: Option<Timed>| slot.filter(|t| t.is_live(now)).map_or(1.0, |t| t.value);
        live(self.slow) * live(self.haste)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn empty_by_default() {
        let now = Instant::now();
        let effects = StatusEffects::new();
        assert!(effects.flags(now).is_empty());
        assert_eq!(effects.shield(now), 0.0);
        assert_eq!(effects.damage_multiplier(now), 1.0);
        assert_eq!(effects.speed_multiplier(now), 1.0);
    }

    #[test]
    fn shield_absorbs_before_passing_through() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_shield(100.0, secs(8), now);
        assert!(effects.flags(now).contains(StatusFlags::SHIELDED));

        assert_eq!(effects.absorb(60.0, now), 0.0);
        assert!((effects.shield(now) - 40.0).abs() < 1e-4);

        // 40 soaked, 30 left over
        assert!((effects.absorb(70.0, now) - 30.0).abs() < 1e-4);
        assert!(!effects.flags(now).contains(StatusFlags::SHIELDED));
    }

    #[test]
    fn shield_expires() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_shield(100.0, secs(8), now);

        let later = now + secs(9);
        assert_eq!(effects.shield(later), 0.0);
        assert_eq!(effects.absorb(50.0, later), 50.0);

        effects.sweep(later);
        assert_eq!(effects, StatusEffects::new());
    }

    #[test]
    fn weaker_shield_only_extends_duration() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_shield(400.0, secs(2), now);
        effects.apply_shield(100.0, secs(10), now);

        let later = now + secs(5);
        assert!((effects.shield(later) - 400.0).abs() < 1e-4);
    }

    #[test]
    fn zero_shield_is_ignored() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_shield(0.0, secs(10), now);
        assert!(effects.flags(now).is_empty());
    }

    #[test]
    fn empower_and_slow_multipliers() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_empower(1.3, secs(15), now);
        effects.apply_slow(2.0, secs(3), now); // clamped to 1.0

        assert!((effects.damage_multiplier(now) - 1.3).abs() < 1e-6);
        assert_eq!(effects.speed_multiplier(now), 1.0);

        effects.apply_slow(0.5, secs(3), now);
        assert!((effects.speed_multiplier(now) - 0.5).abs() < 1e-6);

        let flags = effects.flags(now);
        assert!(flags.contains(StatusFlags::EMPOWERED | StatusFlags::SLOWED));

        let later = now + secs(4);
        assert_eq!(effects.speed_multiplier(later), 1.0);
        assert!(effects.flags(later).contains(StatusFlags::EMPOWERED));
    }

    #[test]
    fn haste_speeds_up_and_compounds_with_slow() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_haste(1.5, secs(10), now);
        assert!(effects.flags(now).contains(StatusFlags::HASTED));
        assert!((effects.speed_multiplier(now) - 1.5).abs() < 1e-6);

        effects.apply_slow(0.5, secs(3), now);
        assert!((effects.speed_multiplier(now) - 0.75).abs() < 1e-6);

        let later = now + secs(11);
        assert_eq!(effects.speed_multiplier(later), 1.0);
        effects.sweep(later);
        assert_eq!(effects, StatusEffects::new());
    }

    #[test]
    fn haste_at_or_below_one_is_ignored() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_haste(1.0, secs(10), now);
        effects.apply_haste(0.5, secs(10), now);
        assert!(effects.flags(now).is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let now = Instant::now();
        let mut effects = StatusEffects::new();
        effects.apply_shield(10.0, secs(1), now);
        effects.apply_empower(2.0, secs(1), now);
        effects.clear();
        assert!(effects.flags(now).is_empty());
    }

    #[test]
    fn flags_serialization_roundtrip() {
        let flags = StatusFlags::SHIELDED | StatusFlags::SLOWED;
        let json = serde_json::to_string(&flags).unwrap();
        let back: StatusFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(flags, back);
    }
}
