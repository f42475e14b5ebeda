//! Testing utilities for the simulation.
//!
//! This module provides tools for deterministic scenario tests:
//! - `ScriptedOracle` returns queued decisions without API calls
//! - `ScriptedNarrator` returns a fixed chronicle or a failure
//! - `TestHarness` drives a seeded simulation day by day
//! - Assertion helpers for verifying NPC state

use crate::chronicle::{ChronicleInput, Narrator, NarratorError};
use crate::config::SimConfig;
use crate::engine::{RunReport, Simulation};
use crate::model::{Npc, NpcId, Role, Stat, Stats};
use crate::oracle::DecisionOracle;
use crate::rules::{Decision, SocialAction};
use crate::world::{DayLog, World};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Seed used by the harness when the config does not set one.
pub const DEFAULT_TEST_SEED: u64 = 7;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Scripted oracle
// ============================================================================

/// One call made to a [`ScriptedOracle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleCall {
    pub npc: NpcId,
    pub nearby: Vec<NpcId>,
}

#[derive(Default)]
struct ScriptState {
    queue: VecDeque<Option<Decision>>,
    always: Option<(SocialAction, String)>,
    calls: Vec<OracleCall>,
}

/// An oracle that replays scripted decisions.
///
/// Queued decisions are returned in order. Once the queue is empty the
/// oracle falls back to its `always` action (aimed at the first nearby
/// NPC), or to no decision. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct ScriptedOracle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle that always picks `action` towards the first nearby NPC.
    pub fn always(action: SocialAction, reason: impl Into<String>) -> Self {
        let oracle = Self::new();
        lock(&oracle.state).always = Some((action, reason.into()));
        oracle
    }

    /// Queue a decision.
    pub fn queue(&self, decision: Decision) -> &Self {
        lock(&self.state).queue.push_back(Some(decision));
        self
    }

    /// Queue a "no decision".
    pub fn queue_none(&self) -> &Self {
        lock(&self.state).queue.push_back(None);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<OracleCall> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn propose_action(&self, npc: &Npc, nearby: &[NpcId]) -> Option<Decision> {
        let mut state = lock(&self.state);
        state.calls.push(OracleCall {
            npc: npc.id.clone(),
            nearby: nearby.to_vec(),
        });
        if let Some(next) = state.queue.pop_front() {
            return next;
        }
        let (action, reason) = state.always.clone()?;
        let target = nearby.first()?.clone();
        Some(Decision {
            action,
            target,
            reason,
        })
    }
}

// ============================================================================
// Scripted narrator
// ============================================================================

/// A narrator that returns a fixed chronicle, or fails.
pub struct ScriptedNarrator {
    text: Option<String>,
}

impl ScriptedNarrator {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn narrate(&self, _input: &ChronicleInput) -> Result<String, NarratorError> {
        self.text.clone().ok_or(NarratorError::Empty)
    }
}

// ============================================================================
// Test harness
// ============================================================================

/// Two locations, two NPCs, three days, no oracle calls and no events.
pub fn small_config() -> SimConfig {
    SimConfig::empty()
        .with_location("Forest", "wilderness", "Dark forest")
        .with_location("Village", "settlement", "Cozy village")
        .with_npc("hunter_1", "Hunter Bob", Role::Hunter, "Forest")
        .with_npc("peasant_1", "Farmer John", Role::Peasant, "Village")
        .with_location_events("Forest", ["wolf attack", "treasure discovery"])
        .with_location_events("Village", ["market day", "harvest", "wedding"])
        .with_role_action(Role::Hunter, "hunted")
        .with_role_action(Role::Peasant, "worked in the field")
        .with_max_days(3)
        .with_decision_chance(0.0)
        .with_event_chance(0.0)
}

/// Test harness for running simulation scenarios.
pub struct TestHarness {
    /// The simulation under test. Snapshots are disabled.
    pub sim: Simulation,
    /// The oracle installed in `sim`.
    pub oracle: ScriptedOracle,
}

impl TestHarness {
    /// A harness around [`small_config`].
    pub fn new() -> Self {
        Self::with_config(small_config())
    }

    /// A harness around any valid config. Panics on an invalid config.
    pub fn with_config(mut config: SimConfig) -> Self {
        if config.seed.is_none() {
            config.seed = Some(DEFAULT_TEST_SEED);
        }
        let oracle = ScriptedOracle::new();
        let sim = match Simulation::new(config) {
            Ok(sim) => sim.with_state_path(None).with_oracle(oracle.clone()),
            Err(e) => panic!("invalid test config: {e}"),
        };
        Self { sim, oracle }
    }

    /// Replace the oracle.
    pub fn with_oracle(mut self, oracle: ScriptedOracle) -> Self {
        self.sim = self.sim.with_oracle(oracle.clone());
        self.oracle = oracle;
        self
    }

    pub fn world(&self) -> &World {
        self.sim.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.sim.world_mut()
    }

    /// Look up an NPC. Panics if it does not exist.
    #[track_caller]
    pub fn npc(&self, id: &str) -> &Npc {
        match self.world().npc(&NpcId::from(id)) {
            Some(npc) => npc,
            None => panic!("no NPC with id '{id}'"),
        }
    }

    /// Overwrite an NPC's stats.
    #[track_caller]
    pub fn set_stats(&mut self, id: &str, stats: Stats) -> &mut Self {
        match self.world_mut().npc_mut(&NpcId::from(id)) {
            Some(npc) => npc.stats = stats,
            None => panic!("no NPC with id '{id}'"),
        }
        self
    }

    /// Set one NPC's opinion of another.
    #[track_caller]
    pub fn set_relationship(&mut self, id: &str, other: &str, score: i32) -> &mut Self {
        match self.world_mut().npc_mut(&NpcId::from(id)) {
            Some(npc) => npc.set_relationship(&NpcId::from(other), score),
            None => panic!("no NPC with id '{id}'"),
        }
        self
    }

    /// Kill an NPC the way the engine does.
    pub fn kill(&mut self, id: &str) -> &mut Self {
        let id = NpcId::from(id);
        let world = self.world_mut();
        if world.mark_dead(&id) {
            world.vacate(&id);
        }
        self
    }

    /// Simulate one day.
    pub async fn day(&mut self) -> DayLog {
        self.sim.step_day().await
    }

    /// Simulate `n` days and return their logs.
    pub async fn days(&mut self, n: u32) -> Vec<DayLog> {
        let mut logs = Vec::new();
        for _ in 0..n {
            logs.push(self.sim.step_day().await);
        }
        logs
    }

    /// Run to `max_days`.
    pub async fn run(&mut self) -> RunReport {
        self.sim.run().await
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.npc(id).alive
    }

    pub fn actions(&self, id: &str) -> &[String] {
        &self.npc(id).actions_today
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

#[track_caller]
pub fn assert_alive(harness: &TestHarness, id: &str) {
    assert!(harness.is_alive(id), "Expected '{id}' to be alive");
}

#[track_caller]
pub fn assert_dead(harness: &TestHarness, id: &str) {
    assert!(!harness.is_alive(id), "Expected '{id}' to be dead");
}

/// Assert an NPC's stat value.
#[track_caller]
pub fn assert_stat(harness: &TestHarness, id: &str, stat: Stat, expected: i32) {
    let actual = harness.npc(id).stat(stat);
    assert_eq!(
        actual, expected,
        "Expected {id} {stat} to be {expected}, got {actual}"
    );
}

/// Assert one NPC's opinion of another.
#[track_caller]
pub fn assert_relationship(harness: &TestHarness, id: &str, other: &str, expected: i32) {
    let actual = harness.npc(id).relationship(&NpcId::from(other));
    assert_eq!(
        actual, expected,
        "Expected {id} -> {other} to be {expected}, got {actual}"
    );
}

/// Assert an NPC recorded an action containing `needle` today.
#[track_caller]
pub fn assert_action(harness: &TestHarness, id: &str, needle: &str) {
    let actions = harness.actions(id);
    assert!(
        actions.iter().any(|a| a.contains(needle)),
        "Expected an action of {id} containing '{needle}', got {actions:?}"
    );
}
