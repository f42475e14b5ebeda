//! Day-step engine.
//!
//! A day runs five phases in a fixed order: reset, aging, needs, social and
//! random events. Each phase finishes for every NPC (in id order) or every
//! location (in name order) before the next one starts.
//!
//! `step_day` works on a staged copy of the world and RNG and commits both
//! only when the whole day is done, so dropping the future mid-day leaves
//! the simulation at the last completed day.

use crate::config::{ConfigError, SimConfig, FALLBACK_EVENT};
use crate::model::{NpcId, Stat};
use crate::oracle::{DecisionOracle, NoOracle};
use crate::persist::{save_world, PersistError};
use crate::rules::{self, apply_effects};
use crate::world::{DayLog, World, WorldStatus};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Age added per simulated day.
pub const AGE_PER_DAY: f64 = 0.1;

/// Age above which health declines every day.
pub const OLD_AGE: f64 = 65.0;

/// Maximum number of neighbours offered to the oracle.
pub const MAX_NEARBY: usize = 3;

/// Top-level errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A snapshot that could not be written.
#[derive(Debug)]
pub struct PersistFailure {
    pub day: u32,
    pub error: PersistError,
}

/// Outcome of [`Simulation::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Days simulated by this call.
    pub days: u32,
    pub persist_failures: Vec<PersistFailure>,
}

/// The running simulation.
pub struct Simulation {
    world: World,
    config: SimConfig,
    rng: StdRng,
    oracle: Box<dyn DecisionOracle>,
    state_path: Option<PathBuf>,
}

impl Simulation {
    /// Build the world from a config. Seeds from `config.seed` when present.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let world = World::from_config(&config, &mut rng)?;
        Ok(Self::from_parts(world, config, rng))
    }

    /// Wrap an existing world, e.g. one loaded from a snapshot.
    pub fn from_world(world: World, config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self::from_parts(world, config, rng))
    }

    fn from_parts(world: World, config: SimConfig, rng: StdRng) -> Self {
        let state_path = config.state_path.clone();
        Self {
            world,
            config,
            rng,
            oracle: Box::new(NoOracle),
            state_path,
        }
    }

    pub fn with_oracle(mut self, oracle: impl DecisionOracle + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    pub fn with_boxed_oracle(mut self, oracle: Box<dyn DecisionOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Where snapshots are written. `None` disables snapshots.
    pub fn with_state_path(mut self, path: Option<PathBuf>) -> Self {
        self.state_path = path;
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    pub fn status(&self) -> WorldStatus {
        self.world.status()
    }

    /// Whether `max_days` days have been simulated.
    pub fn is_finished(&self) -> bool {
        self.world.current_day >= self.config.max_days
    }

    /// Simulate one day and return its log.
    pub async fn step_day(&mut self) -> DayLog {
        let mut world = self.world.clone();
        let mut rng = self.rng.clone();
        let day = world.current_day + 1;

        world.clear_daily();
        age_npcs(&mut world, &mut rng);
        satisfy_needs(&mut world, &self.config, &mut rng);
        self.social(&mut world, &mut rng).await;
        random_events(&mut world, &self.config, &mut rng);

        world.current_day = day;
        let log = world.summarize_day();
        world.daily_logs.push(log.clone());

        self.world = world;
        self.rng = rng;

        tracing::info!(
            day,
            alive = log.alive_npcs,
            events = log.events().count(),
            actions = log.actions().count(),
            "day complete"
        );
        log
    }

    /// Write a snapshot of the current world, if a state path is set.
    pub async fn snapshot(&self) -> Result<(), PersistError> {
        match &self.state_path {
            Some(path) => save_world(&self.world, path).await,
            None => Ok(()),
        }
    }

    /// Run until `max_days` days have been simulated, snapshotting after
    /// every day. Snapshot failures are logged and reported, never fatal.
    pub async fn run(&mut self) -> RunReport {
        let mut report = RunReport::default();
        while !self.is_finished() {
            let log = self.step_day().await;
            report.days += 1;

            if let Err(error) = self.snapshot().await {
                tracing::warn!(day = log.day, error = %error, "failed to write snapshot");
                report.persist_failures.push(PersistFailure {
                    day: log.day,
                    error,
                });
            }
        }
        report
    }

    /// Social phase: each alive NPC may ask the oracle for one action.
    ///
    /// The chance roll is drawn for every alive NPC, oracle or not, so the
    /// RNG stream does not depend on which oracle is installed.
    async fn social(&self, world: &mut World, rng: &mut StdRng) {
        let chance = self.config.llm_decision_chance;
        for id in world.alive_ids() {
            if !rng.gen_bool(chance) {
                continue;
            }
            let Some(npc) = world.npc(&id) else {
                continue;
            };
            let nearby: Vec<NpcId> = world
                .alive_occupants(&npc.location)
                .filter(|other| **other != id)
                .take(MAX_NEARBY)
                .cloned()
                .collect();
            if nearby.is_empty() {
                continue;
            }

            let Some(decision) = self.oracle.propose_action(npc, &nearby).await else {
                continue;
            };
            let resolution = rules::resolve_decision(world, &id, &decision, &nearby);
            if resolution.is_empty() {
                tracing::debug!(
                    npc = %id,
                    action = %decision.action,
                    target = %decision.target,
                    "decision had no effect"
                );
            }
            apply_effects(world, &resolution.effects);
        }
    }
}

/// Aging phase. Deaths are collected during the pass and vacated after it.
fn age_npcs(world: &mut World, rng: &mut StdRng) {
    let mut dead = Vec::new();
    for npc in world.npcs.values_mut().filter(|npc| npc.alive) {
        npc.age += AGE_PER_DAY;
        npc.adjust_stat(Stat::Energy, -rng.gen_range(10..=25_i32));
        npc.adjust_stat(Stat::Hunger, rng.gen_range(15..=30_i32));
        if npc.age > OLD_AGE {
            npc.adjust_stat(Stat::Health, -rng.gen_range(1..=3_i32));
        }
        if npc.stats.health <= 0 {
            dead.push(npc.id.clone());
        }
    }
    bury(world, &dead);
}

/// Needs phase: eat, rest or work, first matching rule wins.
fn satisfy_needs(world: &mut World, config: &SimConfig, rng: &mut StdRng) {
    for id in world.alive_ids() {
        let Some(npc) = world.npc(&id) else {
            continue;
        };
        let Some(need) = rules::choose_need(npc, rng) else {
            continue;
        };
        let resolution = rules::resolve_need(npc, need, config.work_label(npc.role));
        apply_effects(world, &resolution.effects);
    }
}

/// Random events phase. Occupants killed by an event die immediately.
fn random_events(world: &mut World, config: &SimConfig, rng: &mut StdRng) {
    let names: Vec<String> = world.locations.keys().cloned().collect();
    for name in names {
        if !rng.gen_bool(config.random_event_chance) {
            continue;
        }
        let event = config
            .events_for(&name)
            .choose(rng)
            .copied()
            .unwrap_or(FALLBACK_EVENT)
            .to_string();

        let occupants: Vec<NpcId> = world.alive_occupants(&name).cloned().collect();
        let resolution = rules::resolve_event(world, &name, &event);
        apply_effects(world, &resolution.effects);
        tracing::info!(location = %name, event = %event, "random event");

        let dead: Vec<NpcId> = occupants
            .into_iter()
            .filter(|id| world.npc(id).is_some_and(|npc| npc.stats.health <= 0))
            .collect();
        bury(world, &dead);
    }
}

fn bury(world: &mut World, dead: &[NpcId]) {
    for id in dead {
        if world.mark_dead(id) {
            world.vacate(id);
        }
    }
}
