//! Abilities: immutable definitions plus a per-instance cooldown machine.
//!
//! An [`Ability`] is created once per combatant from an [`AbilityDef`] and is
//! never shared between combatants. Its cooldown has two states:
//!
//! - **Ready**: no deadline is set, or the deadline has passed.
//! - **`OnCooldown`**: a deadline lies in the future.
//!
//! The state is derived from the clock on every read, so expiry needs no
//! timer to be correct. Observers who want push notifications subscribe to
//! a `watch` channel that a short-lived publisher task refreshes while the
//! ability cools down.
//!
//! # Casting
//!
//! [`Ability::cast`] performs the whole use atomically with respect to the
//! caster: the readiness check, the mana deduction, the cooldown start and
//! any self-targeted effect happen under the caster's lock. Effects on other
//! combatants are applied afterwards, one lock at a time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::entity::{Combatant, Team};
use crate::resolver::physics;

/// Default refresh period of the cooldown progress publisher.
pub const COOLDOWN_REFRESH: Duration = Duration::from_millis(50);

/// Search radius around the impact point for single-target area abilities.
pub const SINGLE_TARGET_RADIUS: f32 = 60.0;

/// Broad ability category, used by observers and the AI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityCategory {
    /// Deals damage to hostiles.
    Attack,
    /// Shields the caster or allies.
    Defense,
    /// Restores health.
    Heal,
    /// Strengthens the caster or allies.
    Buff,
    /// Weakens a hostile.
    Debuff,
    /// Big cooldown, big effect.
    Ultimate,
}

/// Category-specific payload of an ability.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbilityEffect {
    /// Damage around the impact point. A radius of 0 strikes only the
    /// hostile closest to the impact point.
    Area {
        /// Area-of-effect radius.
        radius: f32,
    },
    /// Absorb pool on the caster and allies in range.
    Shield {
        /// Pool size.
        amount: f32,
        /// Pool lifetime.
        duration: Duration,
    },
    /// Health restored to the caster.
    Heal {
        /// Health restored.
        amount: f32,
    },
    /// Damage scaling on the caster and allies in range.
    Empower {
        /// Outgoing damage multiplier.
        multiplier: f32,
        /// Buff lifetime.
        duration: Duration,
    },
    /// Movement speed-up on the caster.
    Haste {
        /// Movement multiplier above 1.
        factor: f32,
        /// Buff lifetime.
        duration: Duration,
    },
    /// Movement scaling on the hostile nearest the impact point.
    Slow {
        /// Movement multiplier in `[0, 1]`.
        factor: f32,
        /// Debuff lifetime.
        duration: Duration,
    },
}

/// Immutable ability definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityDef {
    /// Stable identifier, unique within one combatant.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Mana deducted on use.
    pub mana_cost: f32,
    /// Minimum interval between uses.
    pub cooldown: Duration,
    /// Base damage, 0 for non-damaging abilities.
    pub damage: f32,
    /// Maximum distance from the caster to the impact point.
    pub range: f32,
    /// Category.
    pub category: AbilityCategory,
    /// Payload.
    pub effect: AbilityEffect,
}

/// What a successful cast did to hostiles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CastReport {
    /// Total health removed from hostiles.
    pub damage_dealt: f32,
    /// Hostiles killed by this cast.
    pub kills: u32,
}

/// Read-only view of one ability for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilitySnapshot {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Category.
    pub category: AbilityCategory,
    /// Mana cost.
    pub mana_cost: f32,
    /// Whether the ability is cooling down.
    pub on_cooldown: bool,
    /// Remaining fraction of the cooldown, 1.0 just used, 0.0 ready.
    pub progress: f32,
}

#[derive(Debug, Default)]
struct CooldownState {
    ready_at: Option<Instant>,
    // Bumped on every start/reset so stale publishers can tell they are stale.
    generation: u64,
}

impl CooldownState {
    fn remaining(&self, now: Instant) -> Duration {
        self.ready_at
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }
}

/// One combatant's instance of an ability.
pub struct Ability {
    def: AbilityDef,
    refresh: Duration,
    cooldown: Mutex<CooldownState>,
    progress_tx: watch::Sender<f32>,
}

impl fmt::Debug for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ability")
            .field("id", &self.def.id)
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

impl Ability {
    /// Creates a ready ability with the default publisher refresh.
    #[must_use]
    pub fn new(def: AbilityDef) -> Self {
        Self::with_refresh(def, COOLDOWN_REFRESH)
    }

    /// Creates a ready ability whose publisher refreshes every `refresh`.
    #[must_use]
    pub fn with_refresh(def: AbilityDef, refresh: Duration) -> Self {
        let (progress_tx, _) = watch::channel(0.0);
        Self {
            def,
            refresh: refresh.max(Duration::from_millis(1)),
            cooldown: Mutex::new(CooldownState::default()),
            progress_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CooldownState> {
        self.cooldown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The immutable definition.
    #[must_use]
    pub fn def(&self) -> &AbilityDef {
        &self.def
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.def.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Time left until ready.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.lock().remaining(Instant::now())
    }

    /// Whether the ability is cooling down.
    #[must_use]
    pub fn is_on_cooldown(&self) -> bool {
        !self.remaining().is_zero()
    }

    /// Remaining fraction of the cooldown in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress_at(&self.lock(), Instant::now())
    }

    fn progress_at(&self, state: &CooldownState, now: Instant) -> f32 {
        let total = self.def.cooldown.as_secs_f32();
        if total <= 0.0 {
            return 0.0;
        }
        (state.remaining(now).as_secs_f32() / total).clamp(0.0, 1.0)
    }

    /// Forces the ability back to Ready and retires any running publisher.
    pub fn reset_cooldown(&self) {
        {
            let mut state = self.lock();
            state.ready_at = None;
            state.generation = state.generation.wrapping_add(1);
        }
        self.progress_tx.send_replace(0.0);
    }

    /// Subscribes to cooldown progress updates.
    ///
    /// The channel is refreshed every publisher period while cooling down
    /// and settles at 0.0 once ready.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.progress_tx.subscribe()
    }

    /// Owned snapshot for observers.
    #[must_use]
    pub fn snapshot(&self) -> AbilitySnapshot {
        let now = Instant::now();
        let (on_cooldown, progress) = {
            let state = self.lock();
            (!state.remaining(now).is_zero(), self.progress_at(&state, now))
        };
        AbilitySnapshot {
            id: self.def.id.clone(),
            name: self.def.name.clone(),
            category: self.def.category,
            mana_cost: self.def.mana_cost,
            on_cooldown,
            progress,
        }
    }

    /// Tries to claim the cooldown. Returns `false` if already cooling down.
    fn try_start_cooldown(self: &Arc<Self>, now: Instant) -> bool {
        let generation = {
            let mut state = self.lock();
            if !state.remaining(now).is_zero() {
                return false;
            }
            if self.def.cooldown.is_zero() {
                return true;
            }
            state.ready_at = Some(now + self.def.cooldown);
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };
        self.progress_tx.send_replace(1.0);
        self.spawn_publisher(generation);
        true
    }

    fn spawn_publisher(self: &Arc<Self>, generation: u64) {
        // Without a runtime observers still get correct values by polling.
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let weak = Arc::downgrade(self);
        let refresh = self.refresh;
        handle.spawn(async move {
            let mut ticker = interval(refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(ability) = weak.upgrade() else {
                    break;
                };
                if !ability.publish(generation) {
                    break;
                }
            }
        });
    }

    /// Pushes the current progress. Returns `false` once the publisher for
    /// `generation` has nothing left to do.
    fn publish(&self, generation: u64) -> bool {
        let progress = {
            let state = self.lock();
            if state.generation != generation {
                return false;
            }
            self.progress_at(&state, Instant::now())
        };
        self.progress_tx.send_replace(progress);
        progress > 0.0
    }

    /// Uses the ability.
    ///
    /// Returns `None` without any side effect when the caster is dead, lacks
    /// mana, or the ability is cooling down. Otherwise deducts mana, starts
    /// the cooldown, applies the effect and reports what it did to hostiles.
    ///
    /// `target` is the aimed point. It is pulled back within cast range; when
    /// absent the caster's own position is the impact point. `field` is every
    /// combatant the effect may reach; the caster may appear in it.
    pub fn cast(
        self: &Arc<Self>,
        caster: &Combatant,
        target: Option<Vec2>,
        field: &[Arc<Combatant>],
    ) -> Option<CastReport> {
        let now = Instant::now();
        let effect = self.def.effect;

        let (origin, multiplier) = caster.with_state(|state| {
            if !state.is_alive() || state.mana() < self.def.mana_cost {
                return None;
            }
            if !self.try_start_cooldown(now) {
                return None;
            }
            if !state.consume_mana(self.def.mana_cost) {
                return None;
            }
            match effect {
                AbilityEffect::Shield { amount, duration } => {
                    state.statuses_mut().apply_shield(amount, duration, now);
                }
                AbilityEffect::Heal { amount } => state.heal(amount),
                AbilityEffect::Empower {
                    multiplier,
                    duration,
                } => state.statuses_mut().apply_empower(multiplier, duration, now),
                AbilityEffect::Haste { factor, duration } => {
                    state.statuses_mut().apply_haste(factor, duration, now);
                }
                AbilityEffect::Area { .. } | AbilityEffect::Slow { .. } => {}
            }
            Some((state.position(), state.statuses().damage_multiplier(now)))
        })?;

        tracing::debug!(
            caster = %caster.id(),
            ability = %self.def.id,
            "Ability cast"
        );

        let impact = target.map_or(origin, |t| physics::pull_within(origin, t, self.def.range));
        let team = caster.team();
        let caster_id = caster.id();
        let others = field.iter().filter(|c| c.id() != caster_id);
        let mut report = CastReport::default();

        match effect {
            AbilityEffect::Area { radius } => {
                let damage = self.def.damage * multiplier;
                if damage <= 0.0 {
                    return Some(report);
                }
                let hostiles = others.filter(|c| team.is_hostile_to(c.team()));
                let victims: Vec<&Arc<Combatant>> = if radius > 0.0 {
                    hostiles
                        .filter(|c| {
                            c.is_alive() && physics::distance(c.position(), impact) <= radius
                        })
                        .collect()
                } else {
                    nearest_to(hostiles, impact, SINGLE_TARGET_RADIUS)
                        .into_iter()
                        .collect()
                };
                for victim in victims {
                    let hit = victim.strike(damage);
                    report.damage_dealt += hit.applied;
                    report.kills += u32::from(hit.killed);
                }
            }
            AbilityEffect::Slow { factor, duration } => {
                let hostiles = others.filter(|c| team.is_hostile_to(c.team()));
                let reach = self.def.range.max(SINGLE_TARGET_RADIUS);
                if let Some(victim) = nearest_to(hostiles, impact, reach) {
                    victim.apply_slow(factor, duration);
                }
            }
            AbilityEffect::Shield { amount, duration } => {
                for ally in allies_in_range(others, team, origin, self.def.range) {
                    ally.apply_shield(amount, duration);
                }
            }
            AbilityEffect::Empower {
                multiplier,
                duration,
            } => {
                for ally in allies_in_range(others, team, origin, self.def.range) {
                    ally.apply_empower(multiplier, duration);
                }
            }
            AbilityEffect::Heal { .. } | AbilityEffect::Haste { .. } => {}
        }

        Some(report)
    }
}

/// Alive combatant closest to `point` within `reach`; first minimal wins.
fn nearest_to<'a>(
    candidates: impl Iterator<Item = &'a Arc<Combatant>>,
    point: Vec2,
    reach: f32,
) -> Option<&'a Arc<Combatant>> {
    let mut best: Option<(&Arc<Combatant>, f32)> = None;
    for candidate in candidates.filter(|c| c.is_alive()) {
        let d = physics::distance(candidate.position(), point);
        if d <= reach && best.map_or(true, |(_, bd)| d < bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(c, _)| c)
}

fn allies_in_range<'a>(
    candidates: impl Iterator<Item = &'a Arc<Combatant>>,
    team: Team,
    origin: Vec2,
    range: f32,
) -> Vec<&'a Arc<Combatant>> {
    candidates
        .filter(|c| {
            c.team() == team
                && c.is_alive()
                && physics::distance(c.position(), origin) <= range
        })
        .collect()
}
