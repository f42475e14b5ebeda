//! Entity types for the simulation: NPCs, their stats and relationships,
//! and the locations they occupy.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lower and upper bound of every stat.
pub const STAT_MIN: i32 = 0;
pub const STAT_MAX: i32 = 100;

/// Lower and upper bound of every relationship score.
pub const RELATIONSHIP_MIN: i32 = -100;
pub const RELATIONSHIP_MAX: i32 = 100;

// ============================================================================
// ID Types
// ============================================================================

/// Stable identifier of an NPC, taken from the roster (e.g. `"king_1"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpcId(pub String);

impl NpcId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NpcId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NpcId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Social role of an NPC. Unknown role strings deserialize as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    King,
    Guard,
    Peasant,
    Merchant,
    Hunter,
    Sage,
    Child,
    #[serde(other)]
    Other,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::King => "king",
            Role::Guard => "guard",
            Role::Peasant => "peasant",
            Role::Merchant => "merchant",
            Role::Hunter => "hunter",
            Role::Sage => "sage",
            Role::Child => "child",
            Role::Other => "other",
        }
    }

    /// Lenient parse used for LLM-generated rosters.
    pub fn parse(raw: &str) -> Role {
        match raw.trim().to_lowercase().as_str() {
            "king" => Role::King,
            "guard" => Role::Guard,
            "peasant" => Role::Peasant,
            "merchant" => Role::Merchant,
            "hunter" => Role::Hunter,
            "sage" => Role::Sage,
            "child" => Role::Child,
            _ => Role::Other,
        }
    }

    pub fn all() -> [Role; 8] {
        [
            Role::King,
            Role::Guard,
            Role::Peasant,
            Role::Merchant,
            Role::Hunter,
            Role::Sage,
            Role::Child,
            Role::Other,
        ]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Stats
// ============================================================================

/// One of the four bounded NPC stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Health,
    Energy,
    Hunger,
    Mood,
}

impl Stat {
    pub fn name(&self) -> &'static str {
        match self {
            Stat::Health => "health",
            Stat::Energy => "energy",
            Stat::Hunger => "hunger",
            Stat::Mood => "mood",
        }
    }

    pub fn from_name(name: &str) -> Option<Stat> {
        match name {
            "health" => Some(Stat::Health),
            "energy" => Some(Stat::Energy),
            "hunger" => Some(Stat::Hunger),
            "mood" => Some(Stat::Mood),
            _ => None,
        }
    }

    pub fn all() -> [Stat; 4] {
        [Stat::Health, Stat::Energy, Stat::Hunger, Stat::Mood]
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stat block of an NPC. Every field stays within `STAT_MIN..=STAT_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub health: i32,
    pub energy: i32,
    pub hunger: i32,
    pub mood: i32,
}

impl Stats {
    /// Build a stat block, clamping each value into range.
    pub fn new(health: i32, energy: i32, hunger: i32, mood: i32) -> Self {
        Self {
            health: clamp_stat(health),
            energy: clamp_stat(energy),
            hunger: clamp_stat(hunger),
            mood: clamp_stat(mood),
        }
    }

    /// Roll starting stats: health 70-100, energy 40-100, hunger 20-80, mood 30-90.
    pub fn roll<R: Rng>(rng: &mut R) -> Self {
        Self {
            health: rng.gen_range(70..=100),
            energy: rng.gen_range(40..=100),
            hunger: rng.gen_range(20..=80),
            mood: rng.gen_range(30..=90),
        }
    }

    pub fn get(&self, stat: Stat) -> i32 {
        match stat {
            Stat::Health => self.health,
            Stat::Energy => self.energy,
            Stat::Hunger => self.hunger,
            Stat::Mood => self.mood,
        }
    }

    fn slot(&mut self, stat: Stat) -> &mut i32 {
        match stat {
            Stat::Health => &mut self.health,
            Stat::Energy => &mut self.energy,
            Stat::Hunger => &mut self.hunger,
            Stat::Mood => &mut self.mood,
        }
    }

    /// Add `delta` to a stat and clamp. Returns the new value.
    pub fn adjust(&mut self, stat: Stat, delta: i32) -> i32 {
        let slot = self.slot(stat);
        *slot = clamp_stat(slot.saturating_add(delta));
        *slot
    }
}

fn clamp_stat(value: i32) -> i32 {
    value.clamp(STAT_MIN, STAT_MAX)
}

// ============================================================================
// NPC
// ============================================================================

/// A simulated character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    pub role: Role,
    /// Name of the current location. Kept as the last known value after death.
    pub location: String,
    pub age: f64,
    pub stats: Stats,
    pub relationships: BTreeMap<NpcId, i32>,
    pub alive: bool,
    #[serde(default)]
    pub actions_today: Vec<String>,
}

impl Npc {
    /// Create an NPC with a random age (18-60) and random starting stats.
    pub fn new<R: Rng>(
        id: impl Into<NpcId>,
        name: impl Into<String>,
        role: Role,
        location: impl Into<String>,
        rng: &mut R,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            location: location.into(),
            age: f64::from(rng.gen_range(18..=60_i32)),
            stats: Stats::roll(rng),
            relationships: BTreeMap::new(),
            alive: true,
            actions_today: Vec::new(),
        }
    }

    pub fn stat(&self, stat: Stat) -> i32 {
        self.stats.get(stat)
    }

    /// Clamped stat update. Returns the new value.
    pub fn adjust_stat(&mut self, stat: Stat, delta: i32) -> i32 {
        self.stats.adjust(stat, delta)
    }

    /// Stat update addressed by name; unknown names are ignored and return `false`.
    pub fn adjust_stat_named(&mut self, stat_name: &str, delta: i32) -> bool {
        match Stat::from_name(stat_name) {
            Some(stat) => {
                self.adjust_stat(stat, delta);
                true
            }
            None => false,
        }
    }

    /// Score towards another NPC, 0 if they have never interacted.
    pub fn relationship(&self, other: &NpcId) -> i32 {
        self.relationships.get(other).copied().unwrap_or(0)
    }

    /// Clamped relationship update. Returns the new score.
    pub fn adjust_relationship(&mut self, other: &NpcId, delta: i32) -> i32 {
        let current = self.relationship(other);
        let updated = current
            .saturating_add(delta)
            .clamp(RELATIONSHIP_MIN, RELATIONSHIP_MAX);
        self.relationships.insert(other.clone(), updated);
        updated
    }

    pub fn set_relationship(&mut self, other: &NpcId, score: i32) {
        self.relationships.insert(
            other.clone(),
            score.clamp(RELATIONSHIP_MIN, RELATIONSHIP_MAX),
        );
    }

    pub fn record_action(&mut self, text: impl Into<String>) {
        self.actions_today.push(text.into());
    }

    /// Relationships restricted to the given ids, in the order given.
    pub fn relationships_with<'a>(
        &'a self,
        ids: &'a [NpcId],
    ) -> impl Iterator<Item = (&'a NpcId, i32)> + 'a {
        ids.iter().map(move |id| (id, self.relationship(id)))
    }
}

// ============================================================================
// Location
// ============================================================================

/// A named place holding zero or more living NPCs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: String,
    pub description: String,
    /// Occupants in arrival order.
    pub npc_ids: Vec<NpcId>,
    #[serde(default)]
    pub events_today: Vec<String>,
}

impl Location {
    pub fn new(
        name: impl Into<String>,
        location_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location_type: location_type.into(),
            description: description.into(),
            npc_ids: Vec::new(),
            events_today: Vec::new(),
        }
    }

    /// Add an occupant. Adding an id that is already present does nothing.
    pub fn add_occupant(&mut self, id: &NpcId) {
        if !self.npc_ids.contains(id) {
            self.npc_ids.push(id.clone());
        }
    }

    /// Remove an occupant. Removing an absent id does nothing.
    pub fn remove_occupant(&mut self, id: &NpcId) {
        self.npc_ids.retain(|occupant| occupant != id);
    }

    pub fn has_occupant(&self, id: &NpcId) -> bool {
        self.npc_ids.contains(id)
    }

    pub fn record_event(&mut self, event: impl Into<String>) {
        self.events_today.push(event.into());
    }

    /// Occupants whose NPC record is alive, in occupancy order.
    ///
    /// Ids with no matching record are skipped.
    pub fn alive_occupants<'a>(
        &'a self,
        npcs: &'a BTreeMap<NpcId, Npc>,
    ) -> impl Iterator<Item = &'a NpcId> + 'a {
        self.npc_ids
            .iter()
            .filter(move |id| npcs.get(*id).is_some_and(|npc| npc.alive))
    }
}
