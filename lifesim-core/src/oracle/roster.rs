//! Generated rosters: a fresh set of locations and inhabitants supplied by
//! a model instead of the configured preset.

use crate::config::{LocationSpec, NpcSpec, SimConfig};
use crate::model::Role;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Reasons a generated roster is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("Roster has no locations")]
    NoLocations,

    #[error("Roster has no NPCs")]
    NoNpcs,

    #[error("Duplicate location name in roster: {0}")]
    DuplicateLocation(String),

    #[error("Duplicate NPC id in roster: {0}")]
    DuplicateNpc(String),
}

/// Supplies a generated roster.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// `None` means the configured roster should be used.
    async fn generate_roster(&self, location_count: usize, npc_count: usize) -> Option<Roster>;
}

/// A validated set of locations and NPCs.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    pub locations: Vec<LocationSpec>,
    pub npcs: Vec<NpcSpec>,
}

impl Roster {
    /// Validate a roster and repair NPC placements.
    ///
    /// NPCs placed in a location that is not part of the roster are
    /// reassigned to the roster's locations round robin.
    pub fn new(locations: Vec<LocationSpec>, mut npcs: Vec<NpcSpec>) -> Result<Self, RosterError> {
        if locations.is_empty() {
            return Err(RosterError::NoLocations);
        }
        if npcs.is_empty() {
            return Err(RosterError::NoNpcs);
        }

        let mut names = HashSet::new();
        for location in &locations {
            if !names.insert(location.name.as_str()) {
                return Err(RosterError::DuplicateLocation(location.name.clone()));
            }
        }

        let mut ids = HashSet::new();
        for npc in &npcs {
            if !ids.insert(npc.id.as_str()) {
                return Err(RosterError::DuplicateNpc(npc.id.clone()));
            }
        }

        let mut next = 0;
        for npc in &mut npcs {
            if !names.contains(npc.location.as_str()) {
                let assigned = &locations[next % locations.len()].name;
                tracing::debug!(
                    npc = %npc.id,
                    from = %npc.location,
                    to = %assigned,
                    "reassigned npc location"
                );
                npc.location = assigned.clone();
                next += 1;
            }
        }

        Ok(Self { locations, npcs })
    }

    /// A copy of `config` populated with this roster.
    ///
    /// Event vocabularies follow location position: the first generated
    /// location gets the events of the first configured location, and so on.
    pub fn apply_to(self, config: &SimConfig) -> SimConfig {
        let mut applied = config.clone();
        applied.location_events = self
            .locations
            .iter()
            .zip(&config.locations)
            .filter_map(|(generated, configured)| {
                config
                    .location_events
                    .get(&configured.name)
                    .map(|events| (generated.name.clone(), events.clone()))
            })
            .collect();
        applied.locations = self.locations;
        applied.npcs = self.npcs;
        applied
    }
}

/// Roster as returned by a model, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRoster {
    #[serde(default)]
    locations: Vec<RawLocation>,
    #[serde(default)]
    npcs: Vec<RawNpc>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    name: String,
    #[serde(rename = "type", default)]
    location_type: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawNpc {
    id: String,
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    location: String,
}

impl RawRoster {
    pub(crate) fn into_roster(self) -> Result<Roster, RosterError> {
        let locations = self
            .locations
            .into_iter()
            .map(|loc| LocationSpec {
                name: loc.name.trim().to_string(),
                location_type: loc.location_type,
                description: loc.description,
            })
            .collect();
        let npcs = self
            .npcs
            .into_iter()
            .map(|npc| NpcSpec {
                id: npc.id.trim().to_string(),
                name: npc.name,
                role: Role::parse(&npc.role),
                location: npc.location.trim().to_string(),
            })
            .collect();
        Roster::new(locations, npcs)
    }
}
