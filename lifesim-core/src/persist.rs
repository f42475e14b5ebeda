//! World snapshots.
//!
//! The simulation writes a `SavedWorld` as pretty JSON after every day so a
//! run can be inspected while it progresses.

use crate::world::World;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot file version.
pub const SAVE_VERSION: u32 = 1;

/// A snapshot of the whole world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedWorld {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the snapshot was taken (seconds since the Unix epoch).
    pub saved_at: String,

    pub world: World,

    pub metadata: SaveMetadata,
}

/// Headline numbers, readable without parsing the whole world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub day: u32,
    pub alive_npcs: usize,
    pub total_npcs: usize,
}

impl SavedWorld {
    pub fn new(world: World) -> Self {
        let metadata = SaveMetadata {
            day: world.current_day,
            alive_npcs: world.alive_count(),
            total_npcs: world.npcs.len(),
        };
        Self {
            version: SAVE_VERSION,
            saved_at: timestamp_now(),
            world,
            metadata,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;
        check_version(saved.version)?;
        Ok(saved)
    }

    /// Read only the metadata of a snapshot.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        check_version(partial.version)?;
        Ok(partial.metadata)
    }
}

fn check_version(found: u32) -> Result<(), PersistError> {
    if found != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found,
        });
    }
    Ok(())
}

/// Snapshot a world to `path`.
pub async fn save_world(world: &World, path: impl AsRef<Path>) -> Result<(), PersistError> {
    SavedWorld::new(world.clone()).save_json(path).await
}

fn timestamp_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn world() -> World {
        let mut rng = StdRng::seed_from_u64(21);
        World::from_config(&SimConfig::default(), &mut rng).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world_state.json");
        let mut world = world();
        world.current_day = 4;
        world.daily_logs.push(world.summarize_day());

        save_world(&world, &path).await.unwrap();
        let loaded = SavedWorld::load_json(&path).await.unwrap();

        assert_eq!(loaded.version, SAVE_VERSION);
        assert_eq!(loaded.world, world);
        assert_eq!(loaded.metadata.day, 4);
        assert_eq!(loaded.metadata.total_npcs, 10);
    }

    #[tokio::test]
    async fn test_peek_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world_state.json");
        save_world(&world(), &path).await.unwrap();

        let metadata = SavedWorld::peek_metadata(&path).await.unwrap();
        assert_eq!(
            metadata,
            SaveMetadata {
                day: 0,
                alive_npcs: 10,
                total_npcs: 10
            }
        );
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world_state.json");
        let mut saved = SavedWorld::new(world());
        saved.version = SAVE_VERSION + 1;
        saved.save_json(&path).await.unwrap();

        let err = SavedWorld::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch { expected: 1, found: 2 }
        ));
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("world_state.json");
        let err = save_world(&world(), &path).await.unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }

    #[test]
    fn test_snapshot_shape() {
        let json = serde_json::to_value(SavedWorld::new(world())).unwrap();
        assert!(json["world"]["current_day"].is_number());
        assert!(json["world"]["npcs"]["king_1"]["stats"]["health"].is_number());
        assert!(json["world"]["locations"]["Castle"]["npc_ids"].is_array());
        assert!(json["world"]["daily_logs"].is_array());
    }
}
