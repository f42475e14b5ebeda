//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p lifesim-core --test api_integration -- --ignored`

use claude::Claude;
use lifesim_core::chronicle::{ChronicleInput, ClaudeNarrator, Narrator};
use lifesim_core::oracle::{ClaudeOracle, RosterSource};
use lifesim_core::testing::TestHarness;
use lifesim_core::{SimConfig, Simulation};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_simulation_with_claude_oracle() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let config = SimConfig::default()
        .with_max_days(2)
        .with_seed(17)
        .with_decision_chance(1.0);
    let oracle = ClaudeOracle::from_env()
        .expect("Failed to create oracle")
        .with_config(&config.oracle);
    let mut sim = Simulation::new(config)
        .expect("Failed to build simulation")
        .with_state_path(None)
        .with_oracle(oracle);

    let report = sim.run().await;

    assert_eq!(report.days, 2);
    for log in &sim.world().daily_logs {
        for action in log.actions() {
            println!("Day {}: {action}", log.day);
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_generated_roster_builds_a_world() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let oracle = ClaudeOracle::from_env().expect("Failed to create oracle");
    let roster = oracle
        .generate_roster(3, 6)
        .await
        .expect("Roster generation failed");
    println!("Roster: {roster:#?}");

    let config = roster.apply_to(&SimConfig::default()).with_seed(1);
    let sim = Simulation::new(config).expect("Generated roster should be valid");
    assert!(!sim.world().npcs.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_claude_narrator() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let mut harness = TestHarness::new();
    harness.run().await;
    let input = ChronicleInput::compile(harness.world());

    let narrator = ClaudeNarrator::new(Claude::from_env().expect("Failed to create client"));
    let text = narrator.narrate(&input).await.expect("Narration failed");
    println!("{text}");
    assert!(!text.trim().is_empty());
}
