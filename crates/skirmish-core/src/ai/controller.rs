//! The per-combatant decision loop.
//!
//! [`AiController::update`] is one synchronous, gated decision: it does
//! nothing until the profile's reaction time has elapsed since the last
//! action, then advances the state machine by exactly one step:
//!
//! | state            | action                                                   |
//! |------------------|----------------------------------------------------------|
//! | `Idle`           | far (> 1.5x reach) → `MovingToTarget`, else `Attacking`  |
//! | `MovingToTarget` | step toward target with jitter; in reach → `Attacking`   |
//! | `Attacking`      | stop; cast or attack; far (> 2x reach) → `MovingToTarget` |
//! | `UsingSkill`     | settle, then `Idle`                                      |
//! | `Retreating`     | step away from the target, then `Idle`                   |
//!
//! `Attacking` casts only when the preference roll succeeds and mana is
//! above 50.
//!
//! Dropping below the retreat threshold sends the controller to
//! `Retreating` once per life.
//!
//! [`spawn`] runs a controller on its own tokio task, polling at a fixed
//! interval until its combatant dies or it is stopped.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

use crate::ability::{Ability, CastReport};
use crate::entity::Combatant;
use crate::resolver::{AttackOutcome, CombatResolver};

use super::{AiState, Difficulty, DifficultyProfile};

/// Default polling interval of a running controller.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default pause after a cast before the controller reconsiders.
pub const SKILL_SETTLE: Duration = Duration::from_millis(500);

/// Default duration of one approach step, in seconds.
pub const MOVE_STEP_SECS: f32 = 0.016;

/// Maximum jitter added to each axis of the approach direction.
pub const MOVE_JITTER: f32 = 0.15;

/// Mana a controller must hold before it considers casting.
pub const CAST_MANA_FLOOR: f32 = 50.0;

const APPROACH_FACTOR: f32 = 1.5;
const DISENGAGE_FACTOR: f32 = 2.0;

/// What one call to [`AiController::update`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum AiStep {
    /// The controlled combatant is dead; nothing will happen again.
    Inactive,
    /// Still inside the reaction gate, or no live target.
    Waiting,
    /// Changed state without acting.
    Transition(AiState),
    /// Stepped toward the target.
    Moved(Vec2),
    /// Performed a plain attack.
    Attacked(AttackOutcome),
    /// Cast an ability.
    Cast {
        /// Ability id.
        ability: String,
        /// Effect on hostiles.
        report: CastReport,
    },
    /// Finished a cast; the runner pauses for this long.
    Settle(Duration),
    /// Backed away from the target.
    Retreated(Vec2),
}

/// Decision state of one opposing combatant.
#[derive(Debug)]
pub struct AiController {
    entity: Arc<Combatant>,
    profile: DifficultyProfile,
    state: AiState,
    last_action: Option<Instant>,
    rng: ChaCha8Rng,
    has_retreated: bool,
    step_secs: f32,
    settle: Duration,
}

impl AiController {
    /// Creates an idle controller for `entity`.
    ///
    /// The controller's random stream is derived from `seed` and the
    /// entity id, so two controllers in one battle never share a stream.
    #[must_use]
    pub fn new(entity: Arc<Combatant>, difficulty: Difficulty, seed: u64) -> Self {
        let stream = seed ^ entity.id().as_u64().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            entity,
            profile: difficulty.profile(),
            state: AiState::Idle,
            last_action: None,
            rng: ChaCha8Rng::seed_from_u64(stream),
            has_retreated: false,
            step_secs: MOVE_STEP_SECS,
            settle: SKILL_SETTLE,
        }
    }

    /// Overrides the settle pause after a cast.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Overrides the duration one approach step covers.
    #[must_use]
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step_secs = step.as_secs_f32();
        self
    }

    /// The combatant this controller drives.
    #[must_use]
    pub fn entity(&self) -> &Arc<Combatant> {
        &self.entity
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AiState {
        self.state
    }

    /// Tuning in effect.
    #[must_use]
    pub fn profile(&self) -> &DifficultyProfile {
        &self.profile
    }

    /// Whether this controller has used its one retreat.
    #[must_use]
    pub fn has_retreated(&self) -> bool {
        self.has_retreated
    }

    fn transition(&mut self, next: AiState) {
        if self.state != next {
            tracing::debug!(
                entity = %self.entity.id(),
                from = ?self.state,
                to = ?next,
                "AI state change"
            );
            self.state = next;
        }
    }

    fn should_retreat(&self) -> bool {
        !self.has_retreated
            && self
                .profile
                .retreat_threshold
                .is_some_and(|t| self.entity.health_fraction() < t)
    }

    /// Runs one gated decision against `target`.
    ///
    /// `field` is every combatant ability effects may reach.
    pub fn update(
        &mut self,
        target: &Combatant,
        field: &[Arc<Combatant>],
        resolver: &CombatResolver,
        now: Instant,
    ) -> AiStep {
        if !self.entity.is_alive() {
            return AiStep::Inactive;
        }
        if !target.is_alive() {
            return AiStep::Waiting;
        }
        if let Some(last) = self.last_action {
            if now.saturating_duration_since(last) < self.profile.reaction_time {
                return AiStep::Waiting;
            }
        }
        self.last_action = Some(now);

        if self.state != AiState::Retreating && self.should_retreat() {
            self.has_retreated = true;
            self.entity.set_moving(false);
            self.transition(AiState::Retreating);
            return AiStep::Transition(AiState::Retreating);
        }

        let reach = self.entity.stats().attack_range;
        let distance = resolver.distance(self.entity.position(), target.position());

        match self.state {
            AiState::Idle => {
                let next = if distance > reach * APPROACH_FACTOR {
                    AiState::MovingToTarget
                } else {
                    AiState::Attacking
                };
                self.transition(next);
                AiStep::Transition(next)
            }
            AiState::MovingToTarget => self.approach(target, resolver),
            AiState::Attacking => self.engage(target, field, resolver),
            AiState::UsingSkill => {
                self.transition(AiState::Idle);
                AiStep::Settle(self.settle)
            }
            AiState::Retreating => {
                let away = resolver.move_direction(target.position(), self.entity.position());
                let burst = self.profile.reaction_time.as_secs_f32();
                let pos = resolver.step_toward(&self.entity, away, burst);
                self.entity.set_moving(false);
                self.transition(AiState::Idle);
                AiStep::Retreated(pos)
            }
        }
    }

    fn approach(&mut self, target: &Combatant, resolver: &CombatResolver) -> AiStep {
        let direction = resolver.move_direction(self.entity.position(), target.position());
        let jitter = Vec2::new(
            (self.rng.gen::<f32>() - 0.5) * 2.0 * MOVE_JITTER,
            (self.rng.gen::<f32>() - 0.5) * 2.0 * MOVE_JITTER,
        );
        self.entity.set_moving(true);
        let pos = resolver.step_toward(&self.entity, direction + jitter, self.step_secs);
        if resolver.in_attack_range(&self.entity, target) {
            self.entity.set_moving(false);
            self.transition(AiState::Attacking);
        }
        AiStep::Moved(pos)
    }

    fn engage(
        &mut self,
        target: &Combatant,
        field: &[Arc<Combatant>],
        resolver: &CombatResolver,
    ) -> AiStep {
        self.entity.set_moving(false);

        let wants_cast = self.rng.gen::<f32>() < self.profile.skill_preference;
        let cast = if wants_cast && self.entity.mana() > CAST_MANA_FLOOR {
            self.try_cast(target, field)
        } else {
            None
        };
        let step = match cast {
            Some(step) => step,
            None => AiStep::Attacked(resolver.resolve_attack(&self.entity, target, &mut self.rng)),
        };

        // Disengage wins over the post-cast settle.
        if resolver.distance(self.entity.position(), target.position())
            > self.entity.stats().attack_range * DISENGAGE_FACTOR
        {
            self.transition(AiState::MovingToTarget);
        }
        step
    }

    fn try_cast(&mut self, target: &Combatant, field: &[Arc<Combatant>]) -> Option<AiStep> {
        let usable: Vec<&Arc<Ability>> = self
            .entity
            .abilities()
            .iter()
            .filter(|a| self.entity.can_use(a))
            .collect();
        if usable.is_empty() {
            return None;
        }
        let ability = Arc::clone(usable[self.rng.gen_range(0..usable.len())]);
        let report = ability.cast(&self.entity, Some(target.position()), field)?;
        self.transition(AiState::UsingSkill);
        Some(AiStep::Cast {
            ability: ability.id().to_string(),
            report,
        })
    }
}

/// Handle to a controller running on its own task.
#[derive(Debug)]
pub struct ControllerHandle {
    target_tx: watch::Sender<Option<Arc<Combatant>>>,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ControllerHandle {
    /// Hands the controller a (new) target. Unchanged targets are not
    /// re-announced.
    pub fn set_target(&self, target: Option<Arc<Combatant>>) {
        self.target_tx.send_if_modified(|current| {
            let same = match (current.as_ref(), target.as_ref()) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if !same {
                *current = target;
            }
            !same
        });
    }

    /// Stops the controller. It will not act again.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.join.abort();
    }

    /// Whether the task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs `controller` on a new task, polling every `poll`.
///
/// The task ends when the combatant dies, when [`ControllerHandle::stop`]
/// is called, or when the handle is dropped.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
#[must_use]
pub fn spawn(
    mut controller: AiController,
    field: Vec<Arc<Combatant>>,
    resolver: CombatResolver,
    poll: Duration,
) -> ControllerHandle {
    let (target_tx, target_rx) = watch::channel::<Option<Arc<Combatant>>>(None);
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let id = controller.entity().id();
        tracing::debug!(entity = %id, "AI controller started");

        let mut ticker = interval(poll.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }
            if *stop_rx.borrow() || !controller.entity().is_alive() {
                break;
            }
            let target = target_rx.borrow().clone();
            let Some(target) = target else {
                continue;
            };
            match controller.update(&target, &field, &resolver, Instant::now()) {
                AiStep::Inactive => break,
                AiStep::Settle(pause) => {
                    tokio::select! {
                        () = sleep(pause) => {}
                        _ = stop_rx.changed() => break,
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(entity = %id, "AI controller stopped");
    });

    ControllerHandle {
        target_tx,
        stop_tx,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{archetype, Archetype, EntityId, Team};

    fn setup(
        cam_at: Vec2,
        target_at: Vec2,
        difficulty: Difficulty,
    ) -> (AiController, Arc<Combatant>, Vec<Arc<Combatant>>) {
        let cam = archetype::spawn(Archetype::CameraMan, EntityId::new(2), Team::Opposing);
        cam.move_to(cam_at);
        let player = archetype::spawn(Archetype::ToiletMan, EntityId::new(1), Team::Controlled);
        player.move_to(target_at);
        let field = vec![Arc::clone(&player), Arc::clone(&cam)];
        (AiController::new(cam, difficulty, 42), player, field)
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    mod gate_tests {
        use super::*;

        #[test]
        fn acts_once_per_reaction_interval() {
            let (mut ai, player, field) =
                setup(Vec2::new(900.0, 400.0), Vec2::new(100.0, 400.0), Difficulty::Normal);
            let r = CombatResolver::default();
            let t0 = Instant::now();

            assert_eq!(
                ai.update(&player, &field, &r, t0),
                AiStep::Transition(AiState::MovingToTarget)
            );
            assert_eq!(ai.update(&player, &field, &r, t0 + secs(0.1)), AiStep::Waiting);
            assert_eq!(ai.update(&player, &field, &r, t0 + secs(0.99)), AiStep::Waiting);
            assert!(matches!(
                ai.update(&player, &field, &r, t0 + secs(1.0)),
                AiStep::Moved(_)
            ));
        }

        #[test]
        fn dead_controller_is_inactive() {
            let (mut ai, player, field) =
                setup(Vec2::new(300.0, 400.0), Vec2::new(200.0, 400.0), Difficulty::Easy);
            ai.entity().take_damage(10_000.0);
            let r = CombatResolver::default();
            assert_eq!(ai.update(&player, &field, &r, Instant::now()), AiStep::Inactive);
        }

        #[test]
        fn dead_target_means_waiting() {
            let (mut ai, player, field) =
                setup(Vec2::new(300.0, 400.0), Vec2::new(200.0, 400.0), Difficulty::Easy);
            player.take_damage(10_000.0);
            let r = CombatResolver::default();
            assert_eq!(ai.update(&player, &field, &r, Instant::now()), AiStep::Waiting);
            assert_eq!(ai.state(), AiState::Idle);
        }
    }

    mod transition_tests {
        use super::*;

        #[test]
        fn idle_near_goes_to_attacking() {
            let (mut ai, player, field) =
                setup(Vec2::new(600.0, 400.0), Vec2::new(200.0, 400.0), Difficulty::Hard);
            let r = CombatResolver::default();
            assert_eq!(
                ai.update(&player, &field, &r, Instant::now()),
                AiStep::Transition(AiState::Attacking)
            );
        }

        #[test]
        fn approach_moves_closer() {
            let (mut ai, player, field) =
                setup(Vec2::new(900.0, 400.0), Vec2::new(100.0, 400.0), Difficulty::Hard);
            let r = CombatResolver::default();
            let t0 = Instant::now();
            ai.update(&player, &field, &r, t0);

            let before = ai.entity().position();
            let AiStep::Moved(after) = ai.update(&player, &field, &r, t0 + secs(0.5)) else {
                panic!("expected a move");
            };
            let full = 400.0 * MOVE_STEP_SECS;
            let dx = before.x - after.x;
            assert!(dx >= (1.0 - MOVE_JITTER) * full - 1e-3, "dx {dx}");
            assert!(dx <= (1.0 + MOVE_JITTER) * full + 1e-3, "dx {dx}");
            assert!((after.y - before.y).abs() <= MOVE_JITTER * full + 1e-3);
            assert!(ai.entity().is_moving());
            assert_eq!(ai.state(), AiState::MovingToTarget);
        }

        #[test]
        fn approach_stops_in_reach() {
            let (mut ai, player, field) =
                setup(Vec2::new(900.0, 400.0), Vec2::new(100.0, 400.0), Difficulty::Hard);
            let r = CombatResolver::default();
            let t0 = Instant::now();
            ai.update(&player, &field, &r, t0);

            // Close the gap by hand, then let the next step notice.
            ai.entity().move_to(Vec2::new(603.0, 400.0));
            ai.update(&player, &field, &r, t0 + secs(0.5));
            assert_eq!(ai.state(), AiState::Attacking);
            assert!(!ai.entity().is_moving());
        }

        #[test]
        fn low_mana_attacks_plainly() {
            let (mut ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(200.0, 400.0), Difficulty::Hard);
            assert!(ai.entity().consume_mana(560.0));
            let r = CombatResolver::default();
            let t0 = Instant::now();
            ai.update(&player, &field, &r, t0);

            let step = ai.update(&player, &field, &r, t0 + secs(0.5));
            let AiStep::Attacked(outcome) = step else {
                panic!("expected an attack, got {step:?}");
            };
            assert!(outcome.landed());
            assert!(player.health() < 1200.0);
        }

        #[test]
        fn attacking_far_target_goes_back_to_moving() {
            let (mut ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(200.0, 400.0), Difficulty::Hard);
            assert!(ai.entity().consume_mana(560.0));
            let r = CombatResolver::default();
            let t0 = Instant::now();
            ai.update(&player, &field, &r, t0);
            assert_eq!(ai.state(), AiState::Attacking);

            ai.entity().move_to(Vec2::new(950.0, 750.0));
            player.move_to(Vec2::new(50.0, 50.0));
            let step = ai.update(&player, &field, &r, t0 + secs(0.5));
            assert_eq!(step, AiStep::Attacked(AttackOutcome::OutOfRange));
            assert_eq!(ai.state(), AiState::MovingToTarget);
        }

        #[test]
        fn step_length_follows_configured_step() {
            let (ai, player, field) =
                setup(Vec2::new(900.0, 400.0), Vec2::new(100.0, 400.0), Difficulty::Hard);
            let mut ai = ai.with_step(Duration::from_millis(40));
            let r = CombatResolver::default();
            let t0 = Instant::now();
            ai.update(&player, &field, &r, t0);

            let before = ai.entity().position();
            let AiStep::Moved(after) = ai.update(&player, &field, &r, t0 + secs(0.5)) else {
                panic!("expected a move");
            };
            let dx = before.x - after.x;
            assert!(dx >= (1.0 - MOVE_JITTER) * 400.0 * 0.04 - 1e-3, "dx {dx}");
        }

        #[test]
        fn cast_out_of_reach_still_disengages() {
            let (mut ai, player, field) =
                setup(Vec2::new(950.0, 750.0), Vec2::new(50.0, 50.0), Difficulty::Hard);
            let r = CombatResolver::default();
            let t0 = Instant::now();

            let mut cast_seen = false;
            for i in 0..40u8 {
                ai.state = AiState::Attacking;
                let step = ai.update(&player, &field, &r, t0 + secs(f32::from(i) * 0.5));
                assert_eq!(ai.state(), AiState::MovingToTarget, "after {step:?}");
                if matches!(step, AiStep::Cast { .. }) {
                    cast_seen = true;
                    break;
                }
            }
            assert!(cast_seen);
        }

        #[test]
        fn hard_controller_casts_then_settles() {
            let (mut ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(300.0, 400.0), Difficulty::Hard);
            let r = CombatResolver::default();
            let t0 = Instant::now();

            let mut cast = None;
            for i in 0..30u8 {
                let step = ai.update(&player, &field, &r, t0 + secs(f32::from(i) * 0.5));
                if let AiStep::Cast { ability, .. } = step {
                    cast = Some(ability);
                    break;
                }
            }
            let ability = cast.expect("a hard controller casts within a few actions");
            assert!(ai.entity().ability(&ability).unwrap().is_on_cooldown());
            assert_eq!(ai.state(), AiState::UsingSkill);

            let step = ai.update(&player, &field, &r, t0 + secs(20.0));
            assert_eq!(step, AiStep::Settle(SKILL_SETTLE));
            assert_eq!(ai.state(), AiState::Idle);
        }
    }

    mod retreat_tests {
        use super::*;

        #[test]
        fn retreats_once_below_threshold() {
            let (mut ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(300.0, 400.0), Difficulty::Normal);
            let r = CombatResolver::default();
            let t0 = Instant::now();
            ai.entity().take_damage(700.0); // 100 / 800 < 0.15

            assert_eq!(
                ai.update(&player, &field, &r, t0),
                AiStep::Transition(AiState::Retreating)
            );
            let before = r.distance(ai.entity().position(), player.position());
            let AiStep::Retreated(_) = ai.update(&player, &field, &r, t0 + secs(1.0)) else {
                panic!("expected a retreat");
            };
            let after = r.distance(ai.entity().position(), player.position());
            assert!(after > before);
            assert_eq!(ai.state(), AiState::Idle);
            assert!(ai.has_retreated());

            // Only once per life.
            assert!(matches!(
                ai.update(&player, &field, &r, t0 + secs(2.0)),
                AiStep::Transition(_)
            ));
            assert_ne!(ai.state(), AiState::Retreating);
        }

        #[test]
        fn easy_never_retreats() {
            let (mut ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(300.0, 400.0), Difficulty::Easy);
            let r = CombatResolver::default();
            ai.entity().take_damage(790.0);
            assert_eq!(
                ai.update(&player, &field, &r, Instant::now()),
                AiStep::Transition(AiState::Attacking)
            );
        }
    }

    mod task_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn running_controller_fights_and_stops() {
            let (ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(300.0, 400.0), Difficulty::Hard);
            let handle = spawn(ai, field, CombatResolver::default(), POLL_INTERVAL);
            handle.set_target(Some(Arc::clone(&player)));

            sleep(Duration::from_secs(5)).await;
            assert!(player.health() < 1200.0);

            handle.stop();
            sleep(Duration::from_millis(200)).await;
            assert!(handle.is_finished());

            let frozen = player.health();
            sleep(Duration::from_secs(5)).await;
            assert_eq!(player.health(), frozen);
        }

        #[tokio::test(start_paused = true)]
        async fn controller_ends_when_its_combatant_dies() {
            let (ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(300.0, 400.0), Difficulty::Easy);
            let cam = Arc::clone(ai.entity());
            let handle = spawn(ai, field, CombatResolver::default(), POLL_INTERVAL);
            handle.set_target(Some(player));

            cam.take_damage(10_000.0);
            sleep(Duration::from_millis(300)).await;
            assert!(handle.is_finished());
        }

        #[tokio::test(start_paused = true)]
        async fn no_target_means_no_action() {
            let (ai, player, field) =
                setup(Vec2::new(500.0, 400.0), Vec2::new(300.0, 400.0), Difficulty::Hard);
            let handle = spawn(ai, field, CombatResolver::default(), POLL_INTERVAL);

            sleep(Duration::from_secs(3)).await;
            assert_eq!(player.health(), 1200.0);
            assert!(!handle.is_finished());
            handle.stop();
        }
    }
}
