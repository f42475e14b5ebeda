//! Rules engine with a Decision/Effect pipeline.
//!
//! This module turns choices into state changes:
//! 1. A need rule, an oracle `Decision` or a location event describes what happens
//! 2. The rules resolve it against the world into a `Resolution`
//! 3. The resolution's `Effect`s are applied to the `World`
//!
//! Resolving never mutates the world, so every rule can be checked by
//! looking at the effects it produces.

use crate::model::{Npc, NpcId, Stat};
use crate::world::World;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hunger above which an NPC eats.
pub const HUNGER_THRESHOLD: i32 = 70;
/// Energy below which an NPC rests.
pub const TIRED_THRESHOLD: i32 = 30;
/// Energy above which an NPC may work.
pub const WORK_THRESHOLD: i32 = 60;
/// Chance that a rested NPC actually works.
pub const WORK_CHANCE: f64 = 0.6;

/// Reason used when the oracle gives none.
pub const DEFAULT_REASON: &str = "unknown reason";

// ============================================================================
// Social decisions
// ============================================================================

/// What an NPC decided to do to a neighbour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SocialAction {
    Chat,
    Help,
    Argue,
    Ignore,
    /// Anything else the oracle said. Has no effect.
    Unrecognized(String),
}

impl SocialAction {
    /// Parse an action word. Case and surrounding whitespace are ignored.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "chat" => SocialAction::Chat,
            "help" => SocialAction::Help,
            "argue" => SocialAction::Argue,
            "ignore" => SocialAction::Ignore,
            _ => SocialAction::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SocialAction::Chat => "chat",
            SocialAction::Help => "help",
            SocialAction::Argue => "argue",
            SocialAction::Ignore => "ignore",
            SocialAction::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for SocialAction {
    fn from(raw: String) -> Self {
        SocialAction::parse(&raw)
    }
}

impl From<SocialAction> for String {
    fn from(action: SocialAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for SocialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A social action suggested by the decision oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: SocialAction,
    pub target: NpcId,
    pub reason: String,
}

impl Decision {
    pub fn new(action: SocialAction, target: impl Into<NpcId>, reason: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn chat(target: impl Into<NpcId>, reason: impl Into<String>) -> Self {
        Self::new(SocialAction::Chat, target, reason)
    }

    pub fn help(target: impl Into<NpcId>, reason: impl Into<String>) -> Self {
        Self::new(SocialAction::Help, target, reason)
    }

    pub fn argue(target: impl Into<NpcId>, reason: impl Into<String>) -> Self {
        Self::new(SocialAction::Argue, target, reason)
    }
}

// ============================================================================
// Effects
// ============================================================================

/// A concrete state change to apply to the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// A stat moved by `delta` (clamped on apply).
    StatChanged { npc: NpcId, stat: Stat, delta: i32 },

    /// `npc`'s opinion of `other` moved by `delta` (clamped on apply).
    RelationshipChanged {
        npc: NpcId,
        other: NpcId,
        delta: i32,
    },

    /// A line was added to an NPC's actions for the day.
    ActionRecorded { npc: NpcId, text: String },

    /// A line was added to a location's events for the day.
    EventRecorded { location: String, text: String },
}

impl Effect {
    fn stat(npc: &NpcId, stat: Stat, delta: i32) -> Self {
        Effect::StatChanged {
            npc: npc.clone(),
            stat,
            delta,
        }
    }

    fn relationship(npc: &NpcId, other: &NpcId, delta: i32) -> Self {
        Effect::RelationshipChanged {
            npc: npc.clone(),
            other: other.clone(),
            delta,
        }
    }

    fn action(npc: &NpcId, text: String) -> Self {
        Effect::ActionRecorded {
            npc: npc.clone(),
            text,
        }
    }
}

/// The result of resolving a need, decision or event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub effects: Vec<Effect>,
}

impl Resolution {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Apply effects to the world in order.
pub fn apply_effects(world: &mut World, effects: &[Effect]) {
    for effect in effects {
        apply_effect(world, effect);
    }
}

/// Apply a single effect. Effects naming unknown NPCs or locations are ignored.
pub fn apply_effect(world: &mut World, effect: &Effect) {
    match effect {
        Effect::StatChanged { npc, stat, delta } => {
            if let Some(npc) = world.npc_mut(npc) {
                npc.adjust_stat(*stat, *delta);
            }
        }
        Effect::RelationshipChanged { npc, other, delta } => {
            if let Some(npc) = world.npc_mut(npc) {
                npc.adjust_relationship(other, *delta);
            }
        }
        Effect::ActionRecorded { npc, text } => {
            if let Some(npc) = world.npc_mut(npc) {
                tracing::debug!(npc = %npc.id, "{text}");
                npc.record_action(text.clone());
            }
        }
        Effect::EventRecorded { location, text } => {
            if let Some(location) = world.location_mut(location) {
                location.record_event(text.clone());
            }
        }
    }
}

/// Resolve an oracle decision for `actor`.
///
/// Produces nothing when the target was not offered, is the actor itself or
/// is unknown, and for `Ignore` and unrecognized actions.
pub fn resolve_decision(
    world: &World,
    actor: &NpcId,
    decision: &Decision,
    candidates: &[NpcId],
) -> Resolution {
    let target_id = &decision.target;
    if target_id == actor || !candidates.contains(target_id) {
        return Resolution::none();
    }
    let (Some(actor_npc), Some(target_npc)) = (world.npc(actor), world.npc(target_id)) else {
        return Resolution::none();
    };
    let (a, b) = (&actor_npc.name, &target_npc.name);
    let reason = &decision.reason;

    match decision.action {
        SocialAction::Chat => Resolution::none().with_effects([
            Effect::relationship(actor, target_id, 10),
            Effect::relationship(target_id, actor, 5),
            Effect::stat(actor, Stat::Mood, 10),
            Effect::action(actor, format!("{a} talked to {b} ({reason})")),
        ]),
        SocialAction::Help => Resolution::none().with_effects([
            Effect::relationship(actor, target_id, 15),
            Effect::relationship(target_id, actor, 20),
            Effect::stat(target_id, Stat::Mood, 15),
            Effect::stat(actor, Stat::Energy, -10),
            Effect::action(actor, format!("{a} helped {b} ({reason})")),
        ]),
        SocialAction::Argue => Resolution::none().with_effects([
            Effect::relationship(actor, target_id, -20),
            Effect::relationship(target_id, actor, -15),
            Effect::stat(actor, Stat::Mood, -10),
            Effect::stat(target_id, Stat::Mood, -15),
            Effect::action(actor, format!("{a} argued with {b} ({reason})")),
        ]),
        SocialAction::Ignore | SocialAction::Unrecognized(_) => Resolution::none(),
    }
}

// ============================================================================
// Needs
// ============================================================================

/// The need an NPC acts on this day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    Eat,
    Rest,
    Work,
}

/// Pick the first matching need rule: hunger, then fatigue, then work.
///
/// The work coin is only flipped when the first two rules do not match and
/// the NPC has energy to spare.
pub fn choose_need<R: Rng>(npc: &Npc, rng: &mut R) -> Option<Need> {
    if npc.stats.hunger > HUNGER_THRESHOLD {
        Some(Need::Eat)
    } else if npc.stats.energy < TIRED_THRESHOLD {
        Some(Need::Rest)
    } else if npc.stats.energy > WORK_THRESHOLD && rng.gen_bool(WORK_CHANCE) {
        Some(Need::Work)
    } else {
        None
    }
}

/// Resolve a need into effects. `work_label` describes the role's work.
pub fn resolve_need(npc: &Npc, need: Need, work_label: &str) -> Resolution {
    let id = &npc.id;
    let name = &npc.name;
    match need {
        Need::Eat => Resolution::none().with_effects([
            Effect::stat(id, Stat::Hunger, -40),
            Effect::stat(id, Stat::Energy, 15),
            Effect::stat(id, Stat::Mood, 10),
            Effect::action(id, format!("{name} ate")),
        ]),
        Need::Rest => Resolution::none().with_effects([
            Effect::stat(id, Stat::Energy, 50),
            Effect::stat(id, Stat::Mood, 15),
            Effect::action(id, format!("{name} rested")),
        ]),
        Need::Work => Resolution::none().with_effects([
            Effect::action(id, format!("{name} {work_label}")),
            Effect::stat(id, Stat::Energy, -15),
            Effect::stat(id, Stat::Mood, 5),
        ]),
    }
}

// ============================================================================
// Location events
// ============================================================================

/// How a location event affects the people present, chosen by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// feast, wedding, festival
    Celebration,
    /// anything mentioning an attack
    Attack,
    Treasure,
    Harvest,
    /// no keyword matched
    Mundane,
}

impl EventKind {
    /// Classify an event. Keyword groups are checked in a fixed order.
    pub fn classify(event: &str) -> Self {
        if ["feast", "wedding", "festival"]
            .iter()
            .any(|word| event.contains(word))
        {
            EventKind::Celebration
        } else if event.contains("attack") {
            EventKind::Attack
        } else if event.contains("treasure") {
            EventKind::Treasure
        } else if event.contains("harvest") {
            EventKind::Harvest
        } else {
            EventKind::Mundane
        }
    }

    /// Stat deltas applied to each alive occupant.
    pub fn deltas(&self) -> &'static [(Stat, i32)] {
        match self {
            EventKind::Celebration => &[(Stat::Mood, 20)],
            EventKind::Attack => &[(Stat::Health, -15), (Stat::Mood, -20)],
            EventKind::Treasure => &[(Stat::Mood, 30)],
            EventKind::Harvest => &[(Stat::Mood, 15)],
            EventKind::Mundane => &[],
        }
    }
}

/// Resolve an event at a location: effects on every alive occupant, then
/// the event itself recorded on the location.
pub fn resolve_event(world: &World, location: &str, event: &str) -> Resolution {
    let deltas = EventKind::classify(event).deltas();
    let effects = world.alive_occupants(location).flat_map(|id| {
        deltas
            .iter()
            .map(move |(stat, delta)| Effect::stat(id, *stat, *delta))
    });

    Resolution::none()
        .with_effects(effects.collect::<Vec<_>>())
        .with_effect(Effect::EventRecorded {
            location: location.to_string(),
            text: event.to_string(),
        })
}
