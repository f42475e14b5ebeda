//! Village life simulation with LLM-driven NPC decisions.
//!
//! This crate provides:
//! - NPCs with bounded stats and relationships living in named locations
//! - A day-step engine running aging, needs, social and event phases
//! - Decision/Effect rules so every state change is inspectable
//! - A pluggable decision oracle (Claude, scripted, or none)
//! - World snapshots and an end-of-run chronicle
//!
//! # Quick Start
//!
//! ```ignore
//! use lifesim_core::{ClaudeOracle, SimConfig, Simulation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SimConfig::default().with_max_days(5).with_seed(42);
//!
//!     let mut sim = Simulation::new(config)?.with_oracle(ClaudeOracle::from_env()?);
//!     let report = sim.run().await;
//!     println!("simulated {} days", report.days);
//!
//!     lifesim_core::write_chronicle(sim.world(), None, "chronicles.md").await?;
//!     Ok(())
//! }
//! ```

pub mod chronicle;
pub mod config;
pub mod engine;
pub mod model;
pub mod oracle;
pub mod persist;
pub mod rules;
pub mod testing;
pub mod world;

// Primary public API
pub use chronicle::{write_chronicle, ChronicleInput, ClaudeNarrator, Narrator, NarratorError};
pub use config::{ConfigError, SimConfig};
pub use engine::{RunReport, SimError, Simulation};
pub use model::{Location, Npc, NpcId, Role, Stat, Stats};
pub use oracle::{ClaudeOracle, DecisionOracle, NoOracle, Roster, RosterSource};
pub use persist::{PersistError, SavedWorld};
pub use rules::{Decision, Effect, SocialAction};
pub use testing::{ScriptedNarrator, ScriptedOracle, TestHarness};
pub use world::{DayLog, World, WorldStatus};
