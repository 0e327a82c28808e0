//! The battle: phase machine, tick loop, and manual intents.
//!
//! [`Battle`] owns the authoritative [`BattlePhase`] and every task that
//! acts on it:
//!
//! 1. **TICK**: one task advancing elapsed time, regenerating mana, sweeping
//!    statuses, handing targets to controllers, publishing a snapshot and
//!    evaluating termination, in that order
//! 2. **CONTROLLERS**: one task per opposing combatant (see [`crate::ai`])
//! 3. **COOLDOWNS**: short-lived publishers owned by each ability
//!
//! Manual intents (`move_by`, `attack`, `use_ability`) run synchronously on
//! the caller and are honored only while the phase is `Playing` and the
//! controlled combatant is alive. Termination is re-evaluated after every
//! tick and every intent; the first transition to `Over` stops the tick
//! task and every controller.
//!
//! # Lock Order
//!
//! phase → rng → combatant, and tasks only on its own. No combatant lock is
//! ever held while taking another lock.
//!
//! # Example
//!
//! ```
//! use skirmish_core::{Battle, BattleConfig};
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let battle = Battle::new(BattleConfig { seed: Some(1), ..BattleConfig::default() }).unwrap();
//! battle.initialize("single").await.unwrap();
//!
//! assert!(battle.is_playing());
//! battle.move_by(1.0, 0.0);
//! assert!(battle.tick_once(Duration::from_millis(16)));
//! battle.shutdown();
//! # });
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::ability::CastReport;
use crate::ai::{controller, AiController, ControllerHandle};
use crate::config::BattleConfig;
use crate::entity::{archetype, Archetype, Combatant, EntityId, EntitySnapshot, Team};
use crate::error::{BattleError, Result};
use crate::resolver::{AttackOutcome, CombatResolver};

/// Score for each opponent the controlled side kills.
pub const KILL_SCORE: u64 = 100;

/// Spawn point of the controlled combatant.
pub const CONTROLLED_SPAWN: Vec2 = Vec2::new(200.0, 400.0);

// =============================================================================
// Modes and phases
// =============================================================================

/// Roster selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleMode {
    /// One Camera Man.
    Single,
    /// A Camera Man and a TV Man.
    Double,
}

impl BattleMode {
    /// Stable key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }

    /// Opposing archetypes and their spawn points.
    #[must_use]
    pub fn roster(self) -> Vec<(Archetype, Vec2)> {
        match self {
            Self::Single => vec![(Archetype::CameraMan, Vec2::new(800.0, 400.0))],
            Self::Double => vec![
                (Archetype::CameraMan, Vec2::new(700.0, 300.0)),
                (Archetype::TvMan, Vec2::new(800.0, 500.0)),
            ],
        }
    }
}

impl fmt::Display for BattleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BattleMode {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "double" => Ok(Self::Double),
            _ => Err(BattleError::UnknownMode(s.to_string())),
        }
    }
}

/// Live battle data.
#[derive(Debug, Clone)]
pub struct PlayingState {
    /// The combatant driven by intents.
    pub controlled: Arc<Combatant>,
    /// Combatants driven by controllers.
    pub opponents: Vec<Arc<Combatant>>,
    /// Simulated time since `Playing` began.
    pub elapsed: Duration,
    /// Points earned by the controlled side.
    pub score: u64,
}

impl PlayingState {
    /// The controlled combatant followed by the opponents.
    #[must_use]
    pub fn field(&self) -> Vec<Arc<Combatant>> {
        std::iter::once(&self.controlled)
            .chain(&self.opponents)
            .cloned()
            .collect()
    }

    fn award(&mut self, damage: f32, kills: u32) {
        self.score += whole_units(damage) + u64::from(kills) * KILL_SCORE;
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_units(damage: f32) -> u64 {
    if damage.is_finite() && damage > 0.0 {
        damage.floor() as u64
    } else {
        0
    }
}

/// Top-level battle phase.
#[derive(Debug, Clone)]
pub enum BattlePhase {
    /// Being set up.
    Loading,
    /// In progress.
    Playing(PlayingState),
    /// Finished. Terminal until restart.
    Over {
        /// Whether the controlled side won.
        victory: bool,
    },
}

/// Phase tag carried by snapshots.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    /// See [`BattlePhase::Loading`].
    Loading,
    /// See [`BattlePhase::Playing`].
    Playing,
    /// See [`BattlePhase::Over`].
    Over,
}

/// Read-only view of the battle for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleSnapshot {
    /// Phase.
    pub phase: PhaseTag,
    /// Set once the battle is over.
    pub victory: Option<bool>,
    /// Ticks since `Playing` began.
    pub tick: u64,
    /// Simulated milliseconds since `Playing` began.
    pub elapsed_ms: u64,
    /// Points earned by the controlled side.
    pub score: u64,
    /// The controlled combatant.
    pub controlled: Option<EntitySnapshot>,
    /// The opposing combatants.
    pub opponents: Vec<EntitySnapshot>,
}

impl BattleSnapshot {
    fn loading() -> Self {
        Self {
            phase: PhaseTag::Loading,
            victory: None,
            tick: 0,
            elapsed_ms: 0,
            score: 0,
            controlled: None,
            opponents: Vec::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn of(state: &PlayingState, tick: u64, victory: Option<bool>) -> Self {
        Self {
            phase: if victory.is_some() {
                PhaseTag::Over
            } else {
                PhaseTag::Playing
            },
            victory,
            tick,
            elapsed_ms: state.elapsed.as_millis() as u64,
            score: state.score,
            controlled: Some(state.controlled.snapshot()),
            opponents: state.opponents.iter().map(|o| o.snapshot()).collect(),
        }
    }
}

// =============================================================================
// Battle
// =============================================================================

#[derive(Default)]
struct Tasks {
    tick: Option<JoinHandle<()>>,
    controllers: Vec<ControllerHandle>,
}

struct BattleCore {
    config: BattleConfig,
    resolver: CombatResolver,
    seed: u64,
    phase: Mutex<BattlePhase>,
    mode: Mutex<Option<BattleMode>>,
    rng: Mutex<ChaCha8Rng>,
    snapshot_tx: watch::Sender<BattleSnapshot>,
    next_id: AtomicU64,
    // Bumped by every (re)initialize and shutdown; stale tasks compare it.
    epoch: AtomicU64,
    tick: AtomicU64,
    tasks: Mutex<Tasks>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A battle: one controlled combatant against autonomous opponents.
///
/// Dropping the battle stops every task it started.
pub struct Battle {
    inner: Arc<BattleCore>,
}

impl fmt::Debug for Battle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Battle")
            .field("seed", &self.inner.seed)
            .field("mode", &*lock(&self.inner.mode))
            .field("phase", &*lock(&self.inner.phase))
            .finish_non_exhaustive()
    }
}

impl Battle {
    /// Creates a battle in `Loading` with no combatants.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: BattleConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let (snapshot_tx, _) = watch::channel(BattleSnapshot::loading());
        Ok(Self {
            inner: Arc::new(BattleCore {
                resolver: CombatResolver::new(config.arena),
                config,
                seed,
                phase: Mutex::new(BattlePhase::Loading),
                mode: Mutex::new(None),
                rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
                snapshot_tx,
                next_id: AtomicU64::new(1),
                epoch: AtomicU64::new(0),
                tick: AtomicU64::new(0),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }

    /// Master seed in use.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.inner.seed
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.inner.config
    }

    /// Mode of the last initialize, if any.
    #[must_use]
    pub fn mode(&self) -> Option<BattleMode> {
        *lock(&self.inner.mode)
    }

    /// Sets up a fresh battle for `mode` and starts it.
    ///
    /// Any battle in progress is stopped first. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::UnknownMode`] for an unrecognized mode.
    pub async fn initialize(&self, mode: &str) -> Result<()> {
        let mode: BattleMode = mode.parse()?;
        self.inner.start(mode).await;
        Ok(())
    }

    /// Starts a fresh battle in the last initialized mode.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::NotInitialized`] if `initialize` never
    /// succeeded.
    pub async fn restart(&self) -> Result<()> {
        let mode = self.mode().ok_or(BattleError::NotInitialized)?;
        self.inner.start(mode).await;
        Ok(())
    }

    /// Stops every task and returns to `Loading`.
    pub fn shutdown(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_tasks();
        *lock(&self.inner.phase) = BattlePhase::Loading;
        self.inner.publish();
        tracing::debug!("Battle shut down");
    }

    /// Runs one tick synchronously. Returns `false` once not playing.
    pub fn tick_once(&self, dt: Duration) -> bool {
        self.inner.tick_once(dt)
    }

    /// Subscribes to snapshots published every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BattleSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// A fresh snapshot. Once over, the final published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BattleSnapshot {
        self.inner.snapshot()
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> BattlePhase {
        lock(&self.inner.phase).clone()
    }

    /// Whether the phase is `Playing`.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        matches!(*lock(&self.inner.phase), BattlePhase::Playing(_))
    }

    /// `Some(victory)` once over.
    #[must_use]
    pub fn outcome(&self) -> Option<bool> {
        match *lock(&self.inner.phase) {
            BattlePhase::Over { victory } => Some(victory),
            _ => None,
        }
    }

    /// The controlled combatant, while playing.
    #[must_use]
    pub fn controlled(&self) -> Option<Arc<Combatant>> {
        match &*lock(&self.inner.phase) {
            BattlePhase::Playing(p) => Some(Arc::clone(&p.controlled)),
            _ => None,
        }
    }

    /// The opposing combatants, while playing.
    #[must_use]
    pub fn opponents(&self) -> Vec<Arc<Combatant>> {
        match &*lock(&self.inner.phase) {
            BattlePhase::Playing(p) => p.opponents.clone(),
            _ => Vec::new(),
        }
    }

    // ===== Intents =====

    /// Moves the controlled combatant one tick's worth along `(dx, dy)`.
    ///
    /// Components are clamped to `[-1, 1]`. A zero vector stops movement.
    /// Returns `false` if the intent was not honored.
    pub fn move_by(&self, dx: f32, dy: f32) -> bool {
        let axis = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        let direction = Vec2::new(axis(dx), axis(dy));
        let resolver = self.inner.resolver;
        let step_secs = self.inner.config.tick_interval().as_secs_f32();
        self.inner
            .with_controlled(|state| {
                let moving = direction != Vec2::ZERO;
                state.controlled.set_moving(moving);
                if moving {
                    resolver.step_toward(&state.controlled, direction, step_secs);
                }
            })
            .is_some()
    }

    /// Plain attack on the nearest living opponent.
    ///
    /// Returns `None` if the intent was not honored, and
    /// `Some(InvalidTarget)` when no opponent is alive.
    pub fn attack(&self) -> Option<AttackOutcome> {
        let inner = &self.inner;
        inner.with_controlled(|state| {
            let Some(target) = inner.resolver.nearest_enemy(&state.controlled, &state.opponents)
            else {
                return AttackOutcome::InvalidTarget;
            };
            let outcome = {
                let mut rng = lock(&inner.rng);
                inner.resolver.resolve_attack(&state.controlled, target, &mut *rng)
            };
            let kills = u32::from(matches!(outcome, AttackOutcome::Kill { .. }));
            if kills > 0 {
                tracing::debug!(target = %target.id(), "Opponent killed by attack");
            }
            state.award(outcome.damage(), kills);
            outcome
        })
    }

    /// Casts `ability_id` aimed at the nearest living opponent.
    ///
    /// Returns `true` if the ability was cast.
    pub fn use_ability(&self, ability_id: &str) -> bool {
        let inner = &self.inner;
        inner
            .with_controlled(|state| {
                let ability = state.controlled.ability(ability_id).cloned()?;
                let aim = inner
                    .resolver
                    .nearest_enemy(&state.controlled, &state.opponents)
                    .map(|t| t.position());
                let field = state.field();
                let CastReport {
                    damage_dealt,
                    kills,
                } = ability.cast(&state.controlled, aim, &field)?;
                state.award(damage_dealt, kills);
                Some(())
            })
            .flatten()
            .is_some()
    }
}

impl Drop for Battle {
    fn drop(&mut self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_tasks();
    }
}

// =============================================================================
// Core
// =============================================================================

impl BattleCore {
    fn alloc_id(&self) -> EntityId {
        EntityId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn spawn_combatant(&self, archetype: Archetype, team: Team, at: Vec2) -> Arc<Combatant> {
        let c = archetype::spawn_with_refresh(
            archetype,
            self.alloc_id(),
            team,
            self.config.cooldown_refresh(),
        );
        c.move_to(self.resolver.clamp_to_world(at));
        c
    }

    async fn start(self: &Arc<Self>, mode: BattleMode) {
        self.stop_tasks();
        *lock(&self.mode) = Some(mode);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.phase) = BattlePhase::Loading;
        self.tick.store(0, Ordering::SeqCst);
        self.publish();

        let delay = self.config.loading_delay();
        if !delay.is_zero() {
            sleep(delay).await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
        }

        let controlled =
            self.spawn_combatant(Archetype::ToiletMan, Team::Controlled, CONTROLLED_SPAWN);
        let opponents: Vec<Arc<Combatant>> = mode
            .roster()
            .into_iter()
            .map(|(archetype, at)| self.spawn_combatant(archetype, Team::Opposing, at))
            .collect();
        let state = PlayingState {
            controlled: Arc::clone(&controlled),
            opponents: opponents.clone(),
            elapsed: Duration::ZERO,
            score: 0,
        };
        let field = state.field();

        let controllers = opponents
            .iter()
            .map(|opponent| {
                let seed = lock(&self.rng).gen::<u64>();
                let brain = AiController::new(Arc::clone(opponent), self.config.difficulty, seed)
                    .with_settle(self.config.skill_settle())
                    .with_step(self.config.tick_interval());
                let handle = controller::spawn(
                    brain,
                    field.clone(),
                    self.resolver,
                    self.config.ai_poll_interval(),
                );
                handle.set_target(Some(Arc::clone(&controlled)));
                handle
            })
            .collect();

        *lock(&self.phase) = BattlePhase::Playing(state);
        {
            let mut tasks = lock(&self.tasks);
            tasks.controllers = controllers;
            tasks.tick = Some(self.spawn_tick_loop(epoch));
        }
        self.publish();

        tracing::info!(
            mode = %mode,
            seed = self.seed,
            opponents = opponents.len(),
            difficulty = %self.config.difficulty,
            "Battle started"
        );
    }

    fn spawn_tick_loop(self: &Arc<Self>, epoch: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.tick_interval();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else {
                    break;
                };
                if core.epoch.load(Ordering::SeqCst) != epoch || !core.tick_once(period) {
                    break;
                }
            }
        })
    }

    fn stop_tasks(&self) {
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for handle in &tasks.controllers {
            handle.stop();
        }
        if let Some(tick) = tasks.tick {
            tick.abort();
        }
    }

    /// Runs `f` on the live state if playing with a living controlled
    /// combatant, then re-evaluates termination.
    fn with_controlled<R>(&self, f: impl FnOnce(&mut PlayingState) -> R) -> Option<R> {
        let result = {
            let mut phase = lock(&self.phase);
            match &mut *phase {
                BattlePhase::Playing(state) if state.controlled.is_alive() => Some(f(state)),
                _ => None,
            }
        };
        if result.is_some() {
            self.evaluate();
        }
        result
    }

    fn tick_once(&self, dt: Duration) -> bool {
        let controlled = {
            let mut phase = lock(&self.phase);
            let BattlePhase::Playing(state) = &mut *phase else {
                return false;
            };
            state.elapsed += dt;
            state.controlled.sweep_statuses();
            state.controlled.restore_mana(self.config.controlled_mana_regen);
            for opponent in &state.opponents {
                opponent.sweep_statuses();
                opponent.restore_mana(self.config.opposing_mana_regen);
            }
            Arc::clone(&state.controlled)
        };
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;

        for handle in &lock(&self.tasks).controllers {
            handle.set_target(Some(Arc::clone(&controlled)));
        }
        self.publish();
        tracing::trace!(tick, "Tick");

        !self.evaluate()
    }

    /// Moves `Playing` to `Over` if either side is wiped out. Returns
    /// `true` if the battle is over.
    fn evaluate(&self) -> bool {
        let (victory, final_snapshot) = {
            let mut phase = lock(&self.phase);
            let state = match &*phase {
                BattlePhase::Playing(state) => state,
                BattlePhase::Over { .. } => return true,
                BattlePhase::Loading => return false,
            };
            let victory = if !state.controlled.is_alive() {
                false
            } else if state.opponents.iter().all(|o| !o.is_alive()) {
                true
            } else {
                return false;
            };
            let tick = self.tick.load(Ordering::SeqCst);
            let snapshot = BattleSnapshot::of(state, tick, Some(victory));
            *phase = BattlePhase::Over { victory };
            (victory, snapshot)
        };

        tracing::info!(
            victory,
            elapsed_ms = final_snapshot.elapsed_ms,
            score = final_snapshot.score,
            "Battle over"
        );
        self.snapshot_tx.send_replace(final_snapshot);
        self.stop_tasks();
        true
    }

    fn snapshot(&self) -> BattleSnapshot {
        let phase = lock(&self.phase);
        match &*phase {
            BattlePhase::Loading => BattleSnapshot::loading(),
            BattlePhase::Playing(state) => {
                BattleSnapshot::of(state, self.tick.load(Ordering::SeqCst), None)
            }
            BattlePhase::Over { .. } => self.snapshot_tx.borrow().clone(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_replace(snapshot);
    }
}
