//! Simulation configuration.
//!
//! `SimConfig::default()` is the medieval preset: a castle, a village and a
//! forest with ten inhabitants. A config file only needs the fields it wants
//! to override; everything else falls back to the preset.

use crate::model::Role;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Event used when a location has no configured vocabulary.
pub const FALLBACK_EVENT: &str = "strange event";

/// Work label used when a role has no configured action.
pub const FALLBACK_WORK: &str = "worked";

/// Errors found while loading or validating a configuration.
///
/// All of these are fatal: the world cannot be built from such a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No locations defined")]
    NoLocations,

    #[error("No NPCs defined")]
    NoNpcs,

    #[error("Duplicate location name: {0}")]
    DuplicateLocation(String),

    #[error("Duplicate NPC id: {0}")]
    DuplicateNpc(String),

    #[error("NPC {npc} is placed in unknown location {location}")]
    UnknownLocation { npc: String, location: String },

    #[error("{name} must be within [0, 1], got {value}")]
    InvalidChance { name: &'static str, value: f64 },

    #[error("max_days must be at least 1")]
    InvalidMaxDays,
}

/// A location entry of the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: String,
    pub description: String,
}

/// An NPC entry of the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSpec {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub location: String,
}

/// Settings for the LLM-backed oracle and narrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Model for per-NPC social decisions. `None` uses the client's default model.
    pub decision_model: Option<String>,

    /// Model for the end-of-run chronicle. `None` uses the client's default model.
    pub chronicle_model: Option<String>,

    /// Timeout of one decision or roster call, in seconds.
    pub timeout_secs: u64,

    /// Timeout of the chronicle call, in seconds. A chronicle is a much
    /// longer completion than a decision.
    pub chronicle_timeout_secs: u64,

    /// Ask the model for a fresh roster instead of the configured one.
    pub generate_roster: bool,

    /// Number of locations requested when generating a roster.
    pub location_count: usize,

    /// Number of NPCs requested when generating a roster.
    pub npc_count: usize,
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn chronicle_timeout(&self) -> Duration {
        Duration::from_secs(self.chronicle_timeout_secs.max(1))
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            decision_model: Some("claude-3-5-haiku-20241022".to_string()),
            chronicle_model: None,
            timeout_secs: 20,
            chronicle_timeout_secs: 120,
            generate_roster: false,
            location_count: 3,
            npc_count: 10,
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of days to simulate.
    pub max_days: u32,

    /// Chance per NPC per day of consulting the decision oracle.
    pub llm_decision_chance: f64,

    /// Chance per location per day of a random event.
    pub random_event_chance: f64,

    /// RNG seed. `None` seeds from entropy.
    pub seed: Option<u64>,

    pub locations: Vec<LocationSpec>,

    pub npcs: Vec<NpcSpec>,

    /// Event vocabulary per location name.
    pub location_events: BTreeMap<String, Vec<String>>,

    /// Work label per role, e.g. hunter -> "hunted".
    pub role_actions: BTreeMap<Role, String>,

    /// Where the world snapshot is written after each day.
    pub state_path: Option<PathBuf>,

    /// Where the final chronicle is written.
    pub chronicle_path: Option<PathBuf>,

    pub oracle: OracleConfig,
}

impl SimConfig {
    /// A config with no roster and no vocabularies, for building worlds by hand.
    pub fn empty() -> Self {
        Self {
            locations: Vec::new(),
            npcs: Vec::new(),
            location_events: BTreeMap::new(),
            role_actions: BTreeMap::new(),
            state_path: None,
            chronicle_path: None,
            ..Self::default()
        }
    }

    /// Load a config from a JSON file and validate it.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the world builder relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_days == 0 {
            return Err(ConfigError::InvalidMaxDays);
        }
        check_chance("llm_decision_chance", self.llm_decision_chance)?;
        check_chance("random_event_chance", self.random_event_chance)?;

        if self.locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }
        if self.npcs.is_empty() {
            return Err(ConfigError::NoNpcs);
        }

        let mut location_names = HashSet::new();
        for location in &self.locations {
            if !location_names.insert(location.name.as_str()) {
                return Err(ConfigError::DuplicateLocation(location.name.clone()));
            }
        }

        let mut npc_ids = HashSet::new();
        for npc in &self.npcs {
            if !npc_ids.insert(npc.id.as_str()) {
                return Err(ConfigError::DuplicateNpc(npc.id.clone()));
            }
            if !location_names.contains(npc.location.as_str()) {
                return Err(ConfigError::UnknownLocation {
                    npc: npc.id.clone(),
                    location: npc.location.clone(),
                });
            }
        }

        Ok(())
    }

    /// Events that can happen at a location.
    pub fn events_for(&self, location: &str) -> Vec<&str> {
        match self.location_events.get(location) {
            Some(events) if !events.is_empty() => events.iter().map(String::as_str).collect(),
            _ => vec![FALLBACK_EVENT],
        }
    }

    /// Work label for a role.
    pub fn work_label(&self, role: Role) -> &str {
        self.role_actions
            .get(&role)
            .map(String::as_str)
            .unwrap_or(FALLBACK_WORK)
    }

    pub fn with_max_days(mut self, days: u32) -> Self {
        self.max_days = days;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_decision_chance(mut self, chance: f64) -> Self {
        self.llm_decision_chance = chance;
        self
    }

    pub fn with_event_chance(mut self, chance: f64) -> Self {
        self.random_event_chance = chance;
        self
    }

    pub fn with_location(
        mut self,
        name: impl Into<String>,
        location_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.locations.push(LocationSpec {
            name: name.into(),
            location_type: location_type.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_npc(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        role: Role,
        location: impl Into<String>,
    ) -> Self {
        self.npcs.push(NpcSpec {
            id: id.into(),
            name: name.into(),
            role,
            location: location.into(),
        });
        self
    }

    pub fn with_location_events(
        mut self,
        location: impl Into<String>,
        events: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.location_events.insert(
            location.into(),
            events.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_role_action(mut self, role: Role, label: impl Into<String>) -> Self {
        self.role_actions.insert(role, label.into());
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn with_chronicle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chronicle_path = Some(path.into());
        self
    }
}

fn check_chance(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidChance { name, value })
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        let config = Self {
            max_days: 10,
            llm_decision_chance: 0.3,
            random_event_chance: 0.25,
            seed: None,
            locations: Vec::new(),
            npcs: Vec::new(),
            location_events: BTreeMap::new(),
            role_actions: BTreeMap::new(),
            state_path: Some(PathBuf::from("world_state.json")),
            chronicle_path: Some(PathBuf::from("chronicles.md")),
            oracle: OracleConfig::default(),
        };

        config
            .with_location("Castle", "royal", "Majestic castle with stone walls")
            .with_location("Village", "settlement", "Cozy village with houses and workshops")
            .with_location("Forest", "wilderness", "Dark forest full of game and dangers")
            .with_npc("king_1", "King Aldric", Role::King, "Castle")
            .with_npc("guard_1", "Sir Marcus", Role::Guard, "Castle")
            .with_npc("peasant_1", "Farmer John", Role::Peasant, "Village")
            .with_npc("peasant_2", "Baker Anna", Role::Peasant, "Village")
            .with_npc("peasant_3", "Smith Tom", Role::Peasant, "Village")
            .with_npc("merchant_1", "Trader Paul", Role::Merchant, "Village")
            .with_npc("hunter_1", "Hunter Bob", Role::Hunter, "Forest")
            .with_npc("hunter_2", "Ranger Kate", Role::Hunter, "Forest")
            .with_npc("sage_1", "Wise Elena", Role::Sage, "Castle")
            .with_npc("child_1", "Little Tim", Role::Child, "Village")
            .with_location_events(
                "Castle",
                ["royal feast", "ambassador visit", "knight tournament"],
            )
            .with_location_events("Village", ["market day", "harvest", "wedding", "festival"])
            .with_location_events(
                "Forest",
                ["wolf attack", "treasure discovery", "stranger encounter"],
            )
            .with_role_action(Role::King, "ruled the kingdom")
            .with_role_action(Role::Guard, "patrolled")
            .with_role_action(Role::Peasant, "worked in the field")
            .with_role_action(Role::Merchant, "traded")
            .with_role_action(Role::Hunter, "hunted")
            .with_role_action(Role::Sage, "studied books")
            .with_role_action(Role::Child, "played")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_is_valid() {
        let config = SimConfig::default();
        config.validate().unwrap();
        assert_eq!(config.locations.len(), 3);
        assert_eq!(config.npcs.len(), 10);
        assert_eq!(config.max_days, 10);
        assert_eq!(config.work_label(Role::Hunter), "hunted");
        assert_eq!(config.work_label(Role::Other), FALLBACK_WORK);
    }

    #[test]
    fn test_events_fallback() {
        let config = SimConfig::default();
        assert_eq!(config.events_for("Forest").len(), 3);
        assert_eq!(config.events_for("Swamp"), vec![FALLBACK_EVENT]);

        let config = config.with_location_events("Swamp", Vec::<String>::new());
        assert_eq!(config.events_for("Swamp"), vec![FALLBACK_EVENT]);
    }

    #[test]
    fn test_no_locations_is_fatal() {
        let config = SimConfig::empty();
        assert!(matches!(config.validate(), Err(ConfigError::NoLocations)));
    }

    #[test]
    fn test_unknown_location_is_fatal() {
        let config = SimConfig::empty()
            .with_location("Village", "settlement", "")
            .with_npc("a", "A", Role::Peasant, "Castle");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownLocation { .. })
        ));
    }

    #[test]
    fn test_duplicates_are_fatal() {
        let config = SimConfig::empty()
            .with_location("Village", "settlement", "")
            .with_location("Village", "settlement", "");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateLocation(_))
        ));

        let config = SimConfig::empty()
            .with_location("Village", "settlement", "")
            .with_npc("a", "A", Role::Peasant, "Village")
            .with_npc("a", "Another A", Role::Peasant, "Village");
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateNpc(_))));
    }

    #[test]
    fn test_bad_chance_and_days() {
        let config = SimConfig::default().with_event_chance(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChance {
                name: "random_event_chance",
                ..
            })
        ));

        let config = SimConfig::default().with_decision_chance(f64::NAN);
        assert!(config.validate().is_err());

        let config = SimConfig::default().with_max_days(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMaxDays)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"max_days": 3, "role_actions": {"sage": "pondered"}}"#)
                .unwrap();
        assert_eq!(config.max_days, 3);
        assert_eq!(config.llm_decision_chance, 0.3);
        assert_eq!(config.locations.len(), 3);
        assert_eq!(config.work_label(Role::Sage), "pondered");
        assert_eq!(config.oracle.timeout_secs, 20);
        assert_eq!(config.oracle.chronicle_timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "max_days": 2,
                "locations": [{"name": "Hut", "type": "home", "description": "Small"}],
                "npcs": [{"id": "a", "name": "A", "role": "bard", "location": "Hut"}]
            }"#,
        )
        .unwrap();

        let config = SimConfig::load(&path).await.unwrap();
        assert_eq!(config.max_days, 2);
        assert_eq!(config.npcs[0].role, Role::Other);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"locations": []}"#).unwrap();

        let err = SimConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::NoLocations));
    }
}
