//! Entity module: per-combatant state and its guarded mutators.
//!
//! This module provides the core entity types for the battle simulation:
//! - [`EntityId`]: Unique identifier for combatants
//! - [`Archetype`]: Closed set of combatant kinds, keyed to data templates
//! - [`EntityState`]: The mutable record (health, mana, position, ...)
//! - [`Combatant`]: Shared handle pairing immutable stats and abilities with
//!   a serialized [`EntityState`]
//!
//! # Concurrency
//!
//! A combatant is touched by the tick loop (regen), by its own AI controller,
//! and by manual intents. Every mutation goes through a per-combatant mutex
//! held only for one clamped read-modify-write. The lock is never held across
//! an `.await`, and code never holds two combatant locks at once.
//!
//! # Example
//!
//! ```
//! use skirmish_core::entity::{archetype, Archetype, EntityId, Team};
//! use glam::Vec2;
//!
//! let toilet = archetype::spawn(Archetype::ToiletMan, EntityId::new(1), Team::Controlled);
//! toilet.move_to(Vec2::new(200.0, 400.0));
//!
//! assert_eq!(toilet.take_damage(300.0), 300.0);
//! assert_eq!(toilet.health(), 900.0);
//! ```

pub mod archetype;
pub mod status;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::ability::{Ability, AbilitySnapshot};
use crate::error::BattleError;

pub use archetype::{spawn, ArchetypeTemplate};
pub use status::{StatusEffects, StatusFlags};

/// Unique identifier for a combatant.
///
/// Identifiers are allocated monotonically by the battle and are never
/// reused, so a restarted battle hands out fresh ids.
///
/// # Example
///
/// ```
/// use skirmish_core::entity::EntityId;
///
/// let id1 = EntityId::new(1);
/// let id2 = EntityId::new(2);
///
/// assert!(id1 < id2);
/// assert_eq!(id1.as_u64(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new `EntityId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Combatant kind. Each kind maps to one stat/ability template.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Melee tank: high health, short reach.
    ToiletMan,
    /// Ranged marksman: long reach, fast.
    CameraMan,
    /// Support: buffs, shields.
    SpeakerMan,
    /// Caster: large area damage.
    TvMan,
}

impl Archetype {
    /// Every archetype, in declaration order.
    pub const ALL: [Self; 4] = [Self::ToiletMan, Self::CameraMan, Self::SpeakerMan, Self::TvMan];

    /// Stable lowercase key used by configuration files.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::ToiletMan => "toilet_man",
            Self::CameraMan => "camera_man",
            Self::SpeakerMan => "speaker_man",
            Self::TvMan => "tv_man",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Archetype {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BattleError::UnknownArchetype(s.to_string()))
    }
}

/// Side a combatant fights on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Driven by forwarded intents.
    Controlled,
    /// Driven by an autonomous controller.
    Opposing,
}

impl Team {
    /// Returns `true` if `other` is on the opposite side.
    #[must_use]
    pub fn is_hostile_to(self, other: Self) -> bool {
        self != other
    }
}

/// Facing direction. Only horizontal movement changes it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Facing negative x.
    Left,
    /// Facing positive x.
    #[default]
    Right,
    /// Facing negative y.
    Up,
    /// Facing positive y.
    Down,
}

/// Immutable stat block of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Health cap.
    pub max_health: f32,
    /// Mana cap.
    pub max_mana: f32,
    /// Base damage of a plain attack.
    pub attack_damage: f32,
    /// Movement speed in world units per second.
    pub movement_speed: f32,
    /// Reach of a plain attack.
    pub attack_range: f32,
}

/// The mutable per-combatant record.
///
/// Health and mana are clamped to `[0, max]` by every mutator. `alive` turns
/// false exactly once, when health reaches zero, and only [`reset`] brings it
/// back. While dead, damage, healing, movement and mana restoration are
/// no-ops.
///
/// [`reset`]: EntityState::reset
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    health: f32,
    mana: f32,
    max_health: f32,
    max_mana: f32,
    position: Vec2,
    alive: bool,
    moving: bool,
    facing: Facing,
    statuses: StatusEffects,
}

impl EntityState {
    /// Creates a full-health, full-mana state at the origin.
    #[must_use]
    pub fn new(stats: &Stats) -> Self {
        Self {
            health: stats.max_health,
            mana: stats.max_mana,
            max_health: stats.max_health,
            max_mana: stats.max_mana,
            position: Vec2::ZERO,
            alive: true,
            moving: false,
            facing: Facing::default(),
            statuses: StatusEffects::new(),
        }
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.health
    }

    /// Current mana.
    #[must_use]
    pub fn mana(&self) -> f32 {
        self.mana
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Whether the combatant is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the combatant is currently moving.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Current facing.
    #[must_use]
    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Timed statuses.
    #[must_use]
    pub fn statuses(&self) -> &StatusEffects {
        &self.statuses
    }

    /// Mutable timed statuses.
    pub fn statuses_mut(&mut self) -> &mut StatusEffects {
        &mut self.statuses
    }

    /// Moves to `pos` and updates facing from the x delta.
    ///
    /// x increasing faces right, x decreasing faces left, unchanged x keeps
    /// the current facing. No-op when dead.
    pub fn move_to(&mut self, pos: Vec2) {
        if !self.alive {
            return;
        }
        if pos.x > self.position.x {
            self.facing = Facing::Right;
        } else if pos.x < self.position.x {
            self.facing = Facing::Left;
        }
        self.position = pos;
    }

    /// Sets the moving flag.
    pub fn set_moving(&mut self, moving: bool) {
        self.moving = moving;
    }

    /// Applies damage, draining any live shield first.
    ///
    /// `applied` is the health actually removed, which is 0 when dead, when
    /// the shield soaked everything, or when `amount` is not positive.
    /// `killed` is set only by the blow that flips `alive`.
    pub fn take_damage(&mut self, amount: f32, now: Instant) -> DamageReport {
        if !self.alive || amount.is_nan() || amount <= 0.0 {
            return DamageReport::default();
        }
        let through = self.statuses.absorb(amount, now);
        let applied = through.min(self.health);
        self.health = (self.health - applied).max(0.0);
        let killed = self.health <= 0.0;
        if killed {
            self.health = 0.0;
            self.alive = false;
            self.moving = false;
        }
        DamageReport { applied, killed }
    }

    /// Restores health up to the cap. No-op when dead.
    pub fn heal(&mut self, amount: f32) {
        if !self.alive || amount.is_nan() || amount <= 0.0 {
            return;
        }
        self.health = (self.health + amount).min(self.max_health);
    }

    /// Deducts `amount` mana only if enough is available.
    pub fn consume_mana(&mut self, amount: f32) -> bool {
        if amount.is_nan() || amount < 0.0 || self.mana < amount {
            return false;
        }
        self.mana = (self.mana - amount).max(0.0);
        true
    }

    /// Restores mana up to the cap. No-op when dead.
    pub fn restore_mana(&mut self, amount: f32) {
        if !self.alive || amount.is_nan() || amount <= 0.0 {
            return;
        }
        self.mana = (self.mana + amount).min(self.max_mana);
    }

    /// Restores the initial state: full health and mana, origin, alive,
    /// not moving, default facing, no statuses.
    pub fn reset(&mut self) {
        self.health = self.max_health;
        self.mana = self.max_mana;
        self.position = Vec2::ZERO;
        self.alive = true;
        self.moving = false;
        self.facing = Facing::default();
        self.statuses.clear();
    }
}

/// Result of one [`EntityState::take_damage`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DamageReport {
    /// Health removed.
    pub applied: f32,
    /// Whether this blow was the lethal one.
    pub killed: bool,
}

/// Read-only view of a combatant for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Kind.
    pub archetype: Archetype,
    /// Side.
    pub team: Team,
    /// Current health.
    pub health: f32,
    /// Health cap.
    pub max_health: f32,
    /// Current mana.
    pub mana: f32,
    /// Mana cap.
    pub max_mana: f32,
    /// Position.
    pub position: Vec2,
    /// Alive flag.
    pub alive: bool,
    /// Facing.
    pub facing: Facing,
    /// Moving flag.
    pub moving: bool,
    /// Plain attack reach.
    pub attack_range: f32,
    /// Active statuses.
    pub statuses: StatusFlags,
    /// Remaining shield pool.
    pub shield: f32,
    /// Regular abilities followed by the ultimate.
    pub abilities: Vec<AbilitySnapshot>,
}

/// A combatant: immutable identity, stats and abilities plus serialized
/// mutable state.
///
/// Combatants are shared as `Arc<Combatant>` between the battle, the
/// controllers and ability effects. The mutator methods mirror
/// [`EntityState`] and each takes the lock once.
pub struct Combatant {
    id: EntityId,
    name: String,
    archetype: Archetype,
    team: Team,
    stats: Stats,
    state: Mutex<EntityState>,
    abilities: Vec<Arc<Ability>>,
    ultimate: Arc<Ability>,
}

impl fmt::Debug for Combatant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combatant")
            .field("id", &self.id)
            .field("archetype", &self.archetype)
            .field("team", &self.team)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl Combatant {
    /// Assembles a combatant from its parts. Prefer [`archetype::spawn`].
    #[must_use]
    pub fn new(
        id: EntityId,
        name: impl Into<String>,
        archetype: Archetype,
        team: Team,
        stats: Stats,
        abilities: Vec<Arc<Ability>>,
        ultimate: Arc<Ability>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            archetype,
            team,
            stats,
            state: Mutex::new(EntityState::new(&stats)),
            abilities,
            ultimate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntityState> {
        // A panic while holding the lock leaves a clamped, consistent record.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with exclusive access to the state.
    ///
    /// Callers must not await, or lock another combatant, inside `f`.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EntityState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind.
    #[must_use]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Side.
    #[must_use]
    pub fn team(&self) -> Team {
        self.team
    }

    /// Immutable stats.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Regular abilities, in slot order.
    #[must_use]
    pub fn abilities(&self) -> &[Arc<Ability>] {
        &self.abilities
    }

    /// The designated ultimate.
    #[must_use]
    pub fn ultimate(&self) -> &Arc<Ability> {
        &self.ultimate
    }

    /// Regular abilities followed by the ultimate.
    pub fn all_abilities(&self) -> impl Iterator<Item = &Arc<Ability>> + '_ {
        self.abilities.iter().chain(std::iter::once(&self.ultimate))
    }

    /// Looks up an owned ability by id.
    #[must_use]
    pub fn ability(&self, id: &str) -> Option<&Arc<Ability>> {
        self.all_abilities().find(|a| a.id() == id)
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.lock().health()
    }

    /// Current mana.
    #[must_use]
    pub fn mana(&self) -> f32 {
        self.lock().mana()
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.lock().position()
    }

    /// Whether the combatant is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.lock().is_alive()
    }

    /// Whether the combatant is moving.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.lock().is_moving()
    }

    /// Current facing.
    #[must_use]
    pub fn facing(&self) -> Facing {
        self.lock().facing()
    }

    /// Health as a fraction of the cap.
    #[must_use]
    pub fn health_fraction(&self) -> f32 {
        if self.stats.max_health > 0.0 {
            self.health() / self.stats.max_health
        } else {
            0.0
        }
    }

    /// Movement speed after slows.
    #[must_use]
    pub fn effective_speed(&self) -> f32 {
        let now = Instant::now();
        self.stats.movement_speed * self.lock().statuses().speed_multiplier(now)
    }

    /// Outgoing damage multiplier from buffs.
    #[must_use]
    pub fn damage_multiplier(&self) -> f32 {
        self.lock().statuses().damage_multiplier(Instant::now())
    }

    /// See [`EntityState::move_to`].
    pub fn move_to(&self, pos: Vec2) {
        self.lock().move_to(pos);
    }

    /// See [`EntityState::set_moving`].
    pub fn set_moving(&self, moving: bool) {
        self.lock().set_moving(moving);
    }

    /// See [`EntityState::take_damage`].
    pub fn strike(&self, amount: f32) -> DamageReport {
        let report = self.lock().take_damage(amount, Instant::now());
        if report.killed {
            tracing::debug!(entity = %self.id, name = %self.name, "Combatant died");
        }
        report
    }

    /// Applies damage and returns the health removed. See [`Self::strike`].
    pub fn take_damage(&self, amount: f32) -> f32 {
        self.strike(amount).applied
    }

    /// See [`EntityState::heal`].
    pub fn heal(&self, amount: f32) {
        self.lock().heal(amount);
    }

    /// See [`EntityState::consume_mana`].
    pub fn consume_mana(&self, amount: f32) -> bool {
        self.lock().consume_mana(amount)
    }

    /// See [`EntityState::restore_mana`].
    pub fn restore_mana(&self, amount: f32) {
        self.lock().restore_mana(amount);
    }

    /// Installs a shield on this combatant.
    pub fn apply_shield(&self, amount: f32, duration: std::time::Duration) {
        let mut state = self.lock();
        if state.is_alive() {
            state.statuses_mut().apply_shield(amount, duration, Instant::now());
        }
    }

    /// Scales outgoing damage by `multiplier` for `duration`.
    pub fn apply_empower(&self, multiplier: f32, duration: std::time::Duration) {
        let mut state = self.lock();
        if state.is_alive() {
            state.statuses_mut().apply_empower(multiplier, duration, Instant::now());
        }
    }

    /// Scales movement speed by `factor` for `duration`.
    pub fn apply_slow(&self, factor: f32, duration: std::time::Duration) {
        let mut state = self.lock();
        if state.is_alive() {
            state.statuses_mut().apply_slow(factor, duration, Instant::now());
        }
    }

    /// Base attack damage after buffs.
    #[must_use]
    pub fn effective_attack_damage(&self) -> f32 {
        self.stats.attack_damage * self.damage_multiplier()
    }

    /// Drops expired statuses.
    pub fn sweep_statuses(&self) {
        self.lock().statuses_mut().sweep(Instant::now());
    }

    /// Whether `ability` could be used right now: alive, enough mana, and
    /// not on cooldown.
    #[must_use]
    pub fn can_use(&self, ability: &Ability) -> bool {
        let state = self.lock();
        state.is_alive() && state.mana() >= ability.def().mana_cost && !ability.is_on_cooldown()
    }

    /// Restores the initial state and readies every ability.
    pub fn reset(&self) {
        self.lock().reset();
        for ability in self.all_abilities() {
            ability.reset_cooldown();
        }
    }

    /// Owned snapshot for observers.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        let now = Instant::now();
        let (health, mana, position, alive, facing, moving, statuses, shield) = {
            let state = self.lock();
            (
                state.health(),
                state.mana(),
                state.position(),
                state.is_alive(),
                state.facing(),
                state.is_moving(),
                state.statuses().flags(now),
                state.statuses().shield(now),
            )
        };
        EntitySnapshot {
            id: self.id,
            name: self.name.clone(),
            archetype: self.archetype,
            team: self.team,
            health,
            max_health: self.stats.max_health,
            mana,
            max_mana: self.stats.max_mana,
            position,
            alive,
            facing,
            moving,
            attack_range: self.stats.attack_range,
            statuses,
            shield,
            abilities: self.all_abilities().map(|a| a.snapshot()).collect(),
        }
    }
}
