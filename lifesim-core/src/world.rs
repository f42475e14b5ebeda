//! World state: every NPC and location, the day counter and the day log.

use crate::config::{ConfigError, SimConfig};
use crate::model::{Location, Npc, NpcId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Range of the random relationship score every NPC pair starts with.
pub const INITIAL_RELATIONSHIP_MIN: i32 = -30;
pub const INITIAL_RELATIONSHIP_MAX: i32 = 50;

/// Summary of one location at the end of a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationLog {
    /// Alive occupants at the end of the day.
    pub npc_count: usize,
    pub events: Vec<String>,
    pub actions: Vec<String>,
}

/// Summary of one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayLog {
    pub day: u32,
    pub alive_npcs: usize,
    pub locations: BTreeMap<String, LocationLog>,
}

impl DayLog {
    /// Every action recorded anywhere on this day.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.locations
            .values()
            .flat_map(|loc| loc.actions.iter().map(String::as_str))
    }

    /// Every event recorded anywhere on this day.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.locations
            .values()
            .flat_map(|loc| loc.events.iter().map(String::as_str))
    }
}

/// Headcount snapshot, cheap to compute at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldStatus {
    pub day: u32,
    pub alive_npcs: usize,
    pub total_npcs: usize,
    /// Alive occupants per location.
    pub locations: BTreeMap<String, usize>,
}

/// The complete simulation state.
///
/// NPCs are iterated in id order and locations in name order; every phase
/// applies its mutations in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub current_day: u32,
    pub npcs: BTreeMap<NpcId, Npc>,
    pub locations: BTreeMap<String, Location>,
    pub daily_logs: Vec<DayLog>,
}

impl World {
    /// An empty world at day 0.
    pub fn new() -> Self {
        Self {
            current_day: 0,
            npcs: BTreeMap::new(),
            locations: BTreeMap::new(),
            daily_logs: Vec::new(),
        }
    }

    /// Build the world described by a config: locations, NPCs with random
    /// stats, and a random starting relationship for every NPC pair.
    pub fn from_config<R: Rng>(config: &SimConfig, rng: &mut R) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut world = Self::new();
        for spec in &config.locations {
            world.add_location(Location::new(
                &spec.name,
                &spec.location_type,
                &spec.description,
            ));
        }
        for spec in &config.npcs {
            let npc = Npc::new(
                spec.id.as_str(),
                &spec.name,
                spec.role,
                &spec.location,
                rng,
            );
            world.add_npc(npc);
        }
        world.init_relationships(rng);

        tracing::info!(
            npcs = world.npcs.len(),
            locations = world.locations.len(),
            "world created"
        );
        Ok(world)
    }

    pub fn add_location(&mut self, location: Location) {
        self.locations.insert(location.name.clone(), location);
    }

    /// Insert an NPC and register it as an occupant of its location.
    pub fn add_npc(&mut self, npc: Npc) {
        if let Some(location) = self.locations.get_mut(&npc.location) {
            location.add_occupant(&npc.id);
        }
        self.npcs.insert(npc.id.clone(), npc);
    }

    fn init_relationships<R: Rng>(&mut self, rng: &mut R) {
        let ids: Vec<NpcId> = self.npcs.keys().cloned().collect();
        for id in &ids {
            for other in &ids {
                if id == other {
                    continue;
                }
                let base = rng.gen_range(INITIAL_RELATIONSHIP_MIN..=INITIAL_RELATIONSHIP_MAX);
                if let Some(npc) = self.npcs.get_mut(id) {
                    npc.set_relationship(other, base);
                }
            }
        }
    }

    pub fn npc(&self, id: &NpcId) -> Option<&Npc> {
        self.npcs.get(id)
    }

    pub fn npc_mut(&mut self, id: &NpcId) -> Option<&mut Npc> {
        self.npcs.get_mut(id)
    }

    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.get(name)
    }

    pub fn location_mut(&mut self, name: &str) -> Option<&mut Location> {
        self.locations.get_mut(name)
    }

    pub fn alive_count(&self) -> usize {
        self.npcs.values().filter(|npc| npc.alive).count()
    }

    /// Alive occupants of a location in occupancy order. Empty for unknown names.
    pub fn alive_occupants<'a>(&'a self, location: &str) -> impl Iterator<Item = &'a NpcId> + 'a {
        self.locations
            .get(location)
            .into_iter()
            .flat_map(move |loc| loc.alive_occupants(&self.npcs))
    }

    /// Ids of every alive NPC, in iteration order.
    pub fn alive_ids(&self) -> Vec<NpcId> {
        self.npcs
            .values()
            .filter(|npc| npc.alive)
            .map(|npc| npc.id.clone())
            .collect()
    }

    /// Mark an NPC dead and record it. Returns `false` if it was already dead
    /// or does not exist. Occupancy is not touched; see [`World::vacate`].
    pub fn mark_dead(&mut self, id: &NpcId) -> bool {
        let Some(npc) = self.npcs.get_mut(id) else {
            return false;
        };
        if !npc.alive {
            return false;
        }
        npc.alive = false;
        let text = format!("{} died", npc.name);
        npc.record_action(text);
        tracing::info!(npc = %npc.id, name = %npc.name, age = npc.age, "npc died");
        true
    }

    /// Remove a dead NPC from its location's occupancy. The NPC keeps its
    /// `location` field as the last known place.
    pub fn vacate(&mut self, id: &NpcId) {
        let Some(location) = self.npcs.get(id).map(|npc| npc.location.clone()) else {
            return;
        };
        if let Some(loc) = self.locations.get_mut(&location) {
            loc.remove_occupant(id);
        }
    }

    /// Clear every NPC's actions and every location's events.
    pub fn clear_daily(&mut self) {
        for npc in self.npcs.values_mut() {
            npc.actions_today.clear();
        }
        for location in self.locations.values_mut() {
            location.events_today.clear();
        }
    }

    /// Summarize the current day.
    ///
    /// Actions are collected from every NPC whose last known location is the
    /// location, so an NPC that died today still contributes its death.
    pub fn summarize_day(&self) -> DayLog {
        let locations = self
            .locations
            .iter()
            .map(|(name, location)| {
                let actions = self
                    .npcs
                    .values()
                    .filter(|npc| &npc.location == name)
                    .flat_map(|npc| npc.actions_today.iter().cloned())
                    .collect();
                let log = LocationLog {
                    npc_count: location.alive_occupants(&self.npcs).count(),
                    events: location.events_today.clone(),
                    actions,
                };
                (name.clone(), log)
            })
            .collect();

        DayLog {
            day: self.current_day,
            alive_npcs: self.alive_count(),
            locations,
        }
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            day: self.current_day,
            alive_npcs: self.alive_count(),
            total_npcs: self.npcs.len(),
            locations: self
                .locations
                .iter()
                .map(|(name, loc)| (name.clone(), loc.alive_occupants(&self.npcs).count()))
                .collect(),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> SimConfig {
        SimConfig::empty()
            .with_location("Village", "settlement", "Cozy")
            .with_location("Forest", "wilderness", "Dark")
            .with_npc("a", "Anna", Role::Peasant, "Village")
            .with_npc("b", "Bob", Role::Hunter, "Forest")
            .with_npc("c", "Cid", Role::Merchant, "Village")
    }

    #[test]
    fn test_from_config_places_npcs() {
        let mut rng = StdRng::seed_from_u64(3);
        let world = World::from_config(&small_config(), &mut rng).unwrap();

        assert_eq!(world.current_day, 0);
        assert_eq!(world.npcs.len(), 3);
        let village: Vec<_> = world.alive_occupants("Village").map(NpcId::as_str).collect();
        assert_eq!(village, vec!["a", "c"]);
        assert!(world.daily_logs.is_empty());
    }

    #[test]
    fn test_relationships_initialized_pairwise() {
        let mut rng = StdRng::seed_from_u64(3);
        let world = World::from_config(&small_config(), &mut rng).unwrap();

        for npc in world.npcs.values() {
            assert_eq!(npc.relationships.len(), 2);
            assert!(!npc.relationships.contains_key(&npc.id));
            for score in npc.relationships.values() {
                assert!((INITIAL_RELATIONSHIP_MIN..=INITIAL_RELATIONSHIP_MAX).contains(score));
            }
        }
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = World::from_config(&SimConfig::empty(), &mut rng).unwrap_err();
        assert!(matches!(err, ConfigError::NoLocations));
    }

    #[test]
    fn test_death_bookkeeping() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut world = World::from_config(&small_config(), &mut rng).unwrap();
        let a = NpcId::from("a");

        assert!(world.mark_dead(&a));
        world.vacate(&a);
        assert!(!world.mark_dead(&a));

        let npc = world.npc(&a).unwrap();
        assert!(!npc.alive);
        assert_eq!(npc.actions_today, vec!["Anna died"]);
        // Last known location is retained.
        assert_eq!(npc.location, "Village");
        assert!(!world.location("Village").unwrap().has_occupant(&a));
        assert_eq!(world.alive_count(), 2);
    }

    #[test]
    fn test_summarize_day_includes_death_of_removed_npc() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut world = World::from_config(&small_config(), &mut rng).unwrap();
        world.current_day = 1;
        let a = NpcId::from("a");
        world.mark_dead(&a);
        world.vacate(&a);
        world.npc_mut(&NpcId::from("c")).unwrap().record_action("Cid traded");
        world.location_mut("Forest").unwrap().record_event("wolf attack");

        let log = world.summarize_day();
        assert_eq!(log.day, 1);
        assert_eq!(log.alive_npcs, 2);
        let village = &log.locations["Village"];
        assert_eq!(village.npc_count, 1);
        assert_eq!(village.actions, vec!["Anna died", "Cid traded"]);
        assert_eq!(log.locations["Forest"].events, vec!["wolf attack"]);
        assert_eq!(log.events().count(), 1);
        assert_eq!(log.actions().count(), 2);
    }

    #[test]
    fn test_clear_daily() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut world = World::from_config(&small_config(), &mut rng).unwrap();
        world.npc_mut(&NpcId::from("b")).unwrap().record_action("Bob hunted");
        world.location_mut("Forest").unwrap().record_event("harvest");

        world.clear_daily();
        assert!(world.npcs.values().all(|npc| npc.actions_today.is_empty()));
        assert!(world.locations.values().all(|loc| loc.events_today.is_empty()));
    }

    #[test]
    fn test_status() {
        let mut rng = StdRng::seed_from_u64(3);
        let world = World::from_config(&small_config(), &mut rng).unwrap();
        let status = world.status();
        assert_eq!(status.alive_npcs, 3);
        assert_eq!(status.total_npcs, 3);
        assert_eq!(status.locations["Village"], 2);
        assert_eq!(status.locations["Forest"], 1);
    }

    #[test]
    fn test_unknown_location_has_no_occupants() {
        let world = World::new();
        assert_eq!(world.alive_occupants("Nowhere").count(), 0);
    }
}
