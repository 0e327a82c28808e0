//! Data-driven archetype templates and the combatant factory.
//!
//! Each [`Archetype`] maps to one [`ArchetypeTemplate`]: a stat block, an
//! ordered list of regular abilities, and an ultimate. [`spawn`] is the only
//! place combatants are built, and it instantiates fresh [`Ability`] values
//! for every combatant so cooldowns are never shared.

use std::sync::Arc;
use std::time::Duration;

use crate::ability::{Ability, AbilityCategory, AbilityDef, AbilityEffect, COOLDOWN_REFRESH};

use super::{Archetype, Combatant, EntityId, Stats, Team};

/// Stat and ability template for one archetype.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeTemplate {
    /// Display name.
    pub name: &'static str,
    /// Stat block.
    pub stats: Stats,
    /// Regular abilities, in slot order.
    pub abilities: Vec<AbilityDef>,
    /// The ultimate.
    pub ultimate: AbilityDef,
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[allow(clippy::too_many_arguments)]
fn def(
    id: &str,
    name: &str,
    category: AbilityCategory,
    mana_cost: f32,
    cooldown_ms: u64,
    damage: f32,
    range: f32,
    effect: AbilityEffect,
) -> AbilityDef {
    AbilityDef {
        id: id.to_string(),
        name: name.to_string(),
        mana_cost,
        cooldown: ms(cooldown_ms),
        damage,
        range,
        category,
        effect,
    }
}

fn area(radius: f32) -> AbilityEffect {
    AbilityEffect::Area { radius }
}

/// Damaging ability striking an area of `radius` around the impact point.
fn attack(
    id: &str,
    name: &str,
    cost: f32,
    cooldown_ms: u64,
    damage: f32,
    range: f32,
    radius: f32,
) -> AbilityDef {
    def(id, name, AbilityCategory::Attack, cost, cooldown_ms, damage, range, area(radius))
}

fn ultimate(
    id: &str,
    name: &str,
    cost: f32,
    cooldown_ms: u64,
    damage: f32,
    range: f32,
    radius: f32,
) -> AbilityDef {
    def(id, name, AbilityCategory::Ultimate, cost, cooldown_ms, damage, range, area(radius))
}

impl ArchetypeTemplate {
    /// Returns the template for `archetype`.
    #[must_use]
    pub fn for_archetype(archetype: Archetype) -> Self {
        use AbilityCategory::{Buff, Debuff, Defense};

        match archetype {
            Archetype::ToiletMan => Self {
                name: "Toilet Man",
                stats: Stats {
                    max_health: 1200.0,
                    max_mana: 400.0,
                    attack_damage: 180.0,
                    movement_speed: 300.0,
                    attack_range: 150.0,
                },
                abilities: vec![
                    attack("toilet_flush", "Toilet Flush", 60.0, 8000, 220.0, 400.0, 100.0),
                    attack("toilet_slam", "Toilet Slam", 80.0, 12000, 280.0, 200.0, 200.0),
                    def(
                        "toilet_shield",
                        "Porcelain Shield",
                        Defense,
                        100.0,
                        20000,
                        0.0,
                        0.0,
                        AbilityEffect::Shield {
                            amount: 400.0,
                            duration: ms(8000),
                        },
                    ),
                ],
                ultimate: ultimate(
                    "toilet_tornado",
                    "Toilet Tornado",
                    200.0,
                    60000,
                    150.0,
                    600.0,
                    300.0,
                ),
            },
            Archetype::CameraMan => Self {
                name: "Camera Man",
                stats: Stats {
                    max_health: 800.0,
                    max_mana: 600.0,
                    attack_damage: 150.0,
                    movement_speed: 400.0,
                    attack_range: 500.0,
                },
                abilities: vec![
                    attack("camera_flash", "Camera Flash", 50.0, 6000, 120.0, 350.0, 150.0),
                    attack("zoom_shot", "Zoom Shot", 80.0, 10000, 350.0, 800.0, 0.0),
                    def(
                        "recording_mode",
                        "Recording Mode",
                        Buff,
                        120.0,
                        25000,
                        0.0,
                        0.0,
                        AbilityEffect::Haste {
                            factor: 1.5,
                            duration: ms(10000),
                        },
                    ),
                ],
                ultimate: ultimate(
                    "surveillance_network",
                    "Surveillance Network",
                    250.0,
                    80000,
                    100.0,
                    1000.0,
                    1000.0,
                ),
            },
            Archetype::SpeakerMan => Self {
                name: "Speaker Man",
                stats: Stats {
                    max_health: 900.0,
                    max_mana: 700.0,
                    attack_damage: 120.0,
                    movement_speed: 350.0,
                    attack_range: 400.0,
                },
                abilities: vec![
                    attack("sonic_wave", "Sonic Wave", 70.0, 8000, 160.0, 600.0, 80.0),
                    def(
                        "volume_boost",
                        "Volume Boost",
                        Buff,
                        100.0,
                        15000,
                        0.0,
                        500.0,
                        AbilityEffect::Empower {
                            multiplier: 1.3,
                            duration: ms(15000),
                        },
                    ),
                    def(
                        "sound_barrier",
                        "Sound Barrier",
                        Defense,
                        120.0,
                        20000,
                        0.0,
                        300.0,
                        AbilityEffect::Shield {
                            amount: 500.0,
                            duration: ms(12000),
                        },
                    ),
                ],
                ultimate: ultimate("bass_drop", "Bass Drop", 300.0, 90000, 400.0, 800.0, 800.0),
            },
            Archetype::TvMan => Self {
                name: "TV Man",
                stats: Stats {
                    max_health: 700.0,
                    max_mana: 800.0,
                    attack_damage: 140.0,
                    movement_speed: 320.0,
                    attack_range: 450.0,
                },
                abilities: vec![
                    attack("static_shock", "Static Shock", 60.0, 7000, 180.0, 400.0, 120.0),
                    attack("screen_flicker", "Screen Flicker", 90.0, 12000, 80.0, 500.0, 200.0),
                    def(
                        "signal_jam",
                        "Signal Jam",
                        Debuff,
                        150.0,
                        25000,
                        0.0,
                        600.0,
                        AbilityEffect::Slow {
                            factor: 0.5,
                            duration: ms(8000),
                        },
                    ),
                ],
                ultimate: ultimate(
                    "broadcast_overload",
                    "Broadcast Overload",
                    350.0,
                    100_000,
                    500.0,
                    1000.0,
                    1000.0,
                ),
            },
        }
    }
}

/// Builds a combatant of `archetype` with the default cooldown publisher
/// refresh.
///
/// # Example
///
/// ```
/// use skirmish_core::entity::{archetype, Archetype, EntityId, Team};
///
/// let cam = archetype::spawn(Archetype::CameraMan, EntityId::new(7), Team::Opposing);
/// assert_eq!(cam.name(), "Camera Man");
/// assert_eq!(cam.abilities().len(), 3);
/// assert_eq!(cam.ultimate().id(), "surveillance_network");
/// ```
#[must_use]
pub fn spawn(archetype: Archetype, id: EntityId, team: Team) -> Arc<Combatant> {
    spawn_with_refresh(archetype, id, team, COOLDOWN_REFRESH)
}

/// Builds a combatant of `archetype` whose cooldown publishers refresh every
/// `refresh`.
#[must_use]
pub fn spawn_with_refresh(
    archetype: Archetype,
    id: EntityId,
    team: Team,
    refresh: Duration,
) -> Arc<Combatant> {
    let template = ArchetypeTemplate::for_archetype(archetype);
    let abilities = template
        .abilities
        .into_iter()
        .map(|d| Arc::new(Ability::with_refresh(d, refresh)))
        .collect();
    let ultimate = Arc::new(Ability::with_refresh(template.ultimate, refresh));

    Arc::new(Combatant::new(
        id,
        template.name,
        archetype,
        team,
        template.stats,
        abilities,
        ultimate,
    ))
}
