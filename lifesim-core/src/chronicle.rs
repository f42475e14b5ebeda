//! End-of-run chronicle.
//!
//! The world's logs are boiled down into a [`ChronicleInput`] (key events,
//! deaths, notable relationships). A [`Narrator`] turns that into prose;
//! without one, or when it fails, a plain report is written instead. A
//! statistics block is always appended.

use crate::config::OracleConfig;
use crate::world::World;
use async_trait::async_trait;
use claude::{Claude, Message, Request};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Words that make a log line a key event.
pub const KEY_EVENT_WORDS: [&str; 4] = ["died", "talked", "helped", "argued"];

/// Relationship score above which two NPCs count as friends.
pub const FRIEND_THRESHOLD: i32 = 50;

/// Relationship score below which two NPCs count as enemies.
pub const ENEMY_THRESHOLD: i32 = -30;

/// Key events listed by the fallback report.
const FALLBACK_EVENT_LIMIT: usize = 10;

/// Key events and relationships handed to the narrator.
const PROMPT_EVENT_LIMIT: usize = 20;
const PROMPT_RELATIONSHIP_LIMIT: usize = 10;

const CHRONICLE_MAX_TOKENS: usize = 1500;

/// Errors from a narrator. Always recovered by the fallback report.
#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("API error: {0}")]
    Api(#[from] claude::Error),

    #[error("Narrator timed out after {0:?}")]
    Timeout(Duration),

    #[error("Narrator returned an empty chronicle")]
    Empty,
}

/// Everything a chronicle is written from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChronicleInput {
    /// "Day N: text" lines, oldest first.
    pub key_events: Vec<String>,
    pub deaths: Vec<String>,
    pub relationships: Vec<String>,
    pub alive_count: usize,
    pub total_count: usize,
    pub current_day: u32,
}

impl ChronicleInput {
    pub fn compile(world: &World) -> Self {
        let key_events = world
            .daily_logs
            .iter()
            .flat_map(|log| {
                log.events()
                    .chain(log.actions())
                    .filter(|text| is_key_event(text))
                    .map(move |text| format!("Day {}: {text}", log.day))
            })
            .collect();

        let deaths = world
            .npcs
            .values()
            .filter(|npc| !npc.alive)
            .map(|npc| format!("{} ({}), age {:.1}", npc.name, npc.role, npc.age))
            .collect();

        Self {
            key_events,
            deaths,
            relationships: notable_relationships(world),
            alive_count: world.alive_count(),
            total_count: world.npcs.len(),
            current_day: world.current_day,
        }
    }
}

fn is_key_event(text: &str) -> bool {
    KEY_EVENT_WORDS.iter().any(|word| text.contains(word))
}

/// Each alive NPC's strongest friendship and enmity, when past the thresholds.
fn notable_relationships(world: &World) -> Vec<String> {
    let mut lines = Vec::new();
    for npc in world.npcs.values().filter(|npc| npc.alive) {
        let mut best: Option<(&_, i32)> = None;
        let mut worst: Option<(&_, i32)> = None;
        for (other, &score) in &npc.relationships {
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((other, score));
            }
            if worst.map_or(true, |(_, w)| score < w) {
                worst = Some((other, score));
            }
        }

        if let Some((other, score)) = best {
            if score > FRIEND_THRESHOLD {
                if let Some(friend) = world.npc(other) {
                    lines.push(format!("{} is friends with {}", npc.name, friend.name));
                }
            }
        }
        if let Some((other, score)) = worst {
            if score < ENEMY_THRESHOLD {
                if let Some(enemy) = world.npc(other) {
                    lines.push(format!("{} is enemies with {}", npc.name, enemy.name));
                }
            }
        }
    }
    lines
}

/// Turns a chronicle input into prose.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, input: &ChronicleInput) -> Result<String, NarratorError>;
}

/// Narrator backed by the Claude API.
pub struct ClaudeNarrator {
    client: Claude,
    model: Option<String>,
    timeout: Duration,
}

impl ClaudeNarrator {
    /// Uses the client's default model unless [`ClaudeNarrator::with_model`] is called.
    pub fn new(client: Claude) -> Self {
        let timeout = client.timeout();
        Self {
            client,
            model: None,
            timeout,
        }
    }

    /// Apply the chronicle model and timeout from the oracle config.
    pub fn with_config(self, config: &OracleConfig) -> Self {
        let narrator = self.with_timeout(config.chronicle_timeout());
        match &config.chronicle_model {
            Some(model) => narrator.with_model(model),
            None => narrator,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Bound each chronicle call. The HTTP client is rebuilt with the same limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Narrator for ClaudeNarrator {
    async fn narrate(&self, input: &ChronicleInput) -> Result<String, NarratorError> {
        let mut request = Request::new(vec![Message::user(chronicle_prompt(input))])
            .with_max_tokens(CHRONICLE_MAX_TOKENS)
            .with_temperature(0.8);
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }

        let response = tokio::time::timeout(self.timeout, self.client.complete(request))
            .await
            .map_err(|_| NarratorError::Timeout(self.timeout))??;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(NarratorError::Empty);
        }
        Ok(text)
    }
}

fn chronicle_prompt(input: &ChronicleInput) -> String {
    let events = input
        .key_events
        .iter()
        .take(PROMPT_EVENT_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    let deaths = if input.deaths.is_empty() {
        "Nobody died".to_string()
    } else {
        input.deaths.join(", ")
    };
    let relationships = input
        .relationships
        .iter()
        .take(PROMPT_RELATIONSHIP_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Write an epic chronicle of a medieval world life simulation covering {days} days.

KEY EVENTS:
{events}

DEATHS: {deaths}

RELATIONSHIPS:
{relationships}

ALIVE NPCs: {alive}/{total}

Write the story in the style of a medieval chronicle, in markdown. Be creative but base it on the data."#,
        days = input.current_day,
        alive = input.alive_count,
        total = input.total_count,
    )
}

/// Deterministic report used when no narrator is available.
pub fn fallback_chronicle(input: &ChronicleInput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Simulation Chronicle");
    let _ = writeln!(out);
    let _ = writeln!(out, "## Simulation days: {}", input.current_day);
    let _ = writeln!(
        out,
        "## Surviving NPCs: {}/{}",
        input.alive_count, input.total_count
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "### Key events of recent days:");

    let skip = input.key_events.len().saturating_sub(FALLBACK_EVENT_LIMIT);
    for (i, event) in input.key_events.iter().skip(skip).enumerate() {
        let _ = writeln!(out, "{}. {event}", i + 1);
    }
    let _ = writeln!(out);
    out.push_str("*Chronicle generated locally*");
    out
}

/// Statistics appended to every chronicle.
pub fn statistics_block(world: &World) -> String {
    let alive = world.alive_count();
    let total = world.npcs.len();

    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out);
    let _ = writeln!(out, "## Simulation Statistics");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Days simulated**: {}", world.current_day);
    let _ = writeln!(out, "**Alive NPCs**: {alive}/{total}");
    let _ = writeln!(out, "**Dead**: {}", total - alive);
    let _ = writeln!(out);
    let _ = writeln!(out, "### NPCs by location:");
    for (name, count) in world.status().locations {
        let _ = writeln!(out, "- **{name}**: {count} NPC");
    }
    out
}

/// Narrative (or fallback) followed by the statistics block.
pub async fn compose_chronicle(world: &World, narrator: Option<&dyn Narrator>) -> String {
    let input = ChronicleInput::compile(world);
    let narrative = match narrator {
        Some(narrator) => match narrator.narrate(&input).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "narrator failed, using local chronicle");
                fallback_chronicle(&input)
            }
        },
        None => fallback_chronicle(&input),
    };
    narrative + &statistics_block(world)
}

/// Compose the chronicle and write it to `path`. Returns the written text.
pub async fn write_chronicle(
    world: &World,
    narrator: Option<&dyn Narrator>,
    path: impl AsRef<Path>,
) -> Result<String, std::io::Error> {
    let chronicle = compose_chronicle(world, narrator).await;
    fs::write(path.as_ref(), &chronicle).await?;
    tracing::info!(path = %path.as_ref().display(), "chronicle written");
    Ok(chronicle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::model::{NpcId, Role};
    use crate::world::{DayLog, LocationLog};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn world() -> World {
        let config = SimConfig::empty()
            .with_location("Village", "settlement", "Cozy")
            .with_location("Forest", "wilderness", "Dark")
            .with_npc("a", "Anna", Role::Peasant, "Village")
            .with_npc("b", "Bob", Role::Hunter, "Forest")
            .with_npc("c", "Cid", Role::Merchant, "Village");
        let mut rng = StdRng::seed_from_u64(8);
        let mut world = World::from_config(&config, &mut rng).unwrap();
        for npc in world.npcs.values_mut() {
            for score in npc.relationships.values_mut() {
                *score = 0;
            }
        }
        world
    }

    fn log(day: u32, location: &str, events: &[&str], actions: &[&str]) -> DayLog {
        let mut locations = BTreeMap::new();
        locations.insert(
            location.to_string(),
            LocationLog {
                npc_count: 1,
                events: events.iter().map(|s| s.to_string()).collect(),
                actions: actions.iter().map(|s| s.to_string()).collect(),
            },
        );
        DayLog {
            day,
            alive_npcs: 3,
            locations,
        }
    }

    #[test]
    fn test_key_events_are_filtered_and_prefixed() {
        let mut world = world();
        world.daily_logs.push(log(
            1,
            "Village",
            &["market day"],
            &["Anna ate", "Anna talked to Cid (bored)", "Cid helped Anna (kind)"],
        ));
        world.daily_logs.push(log(2, "Forest", &["wolf attack"], &["Bob died", "Bob hunted"]));

        let input = ChronicleInput::compile(&world);
        assert_eq!(
            input.key_events,
            vec![
                "Day 1: Anna talked to Cid (bored)",
                "Day 1: Cid helped Anna (kind)",
                "Day 2: Bob died",
            ]
        );
    }

    #[test]
    fn test_deaths_and_counts() {
        let mut world = world();
        world.current_day = 7;
        let b = NpcId::from("b");
        world.npc_mut(&b).unwrap().age = 41.23;
        world.mark_dead(&b);
        world.vacate(&b);

        let input = ChronicleInput::compile(&world);
        assert_eq!(input.deaths, vec!["Bob (hunter), age 41.2"]);
        assert_eq!(input.alive_count, 2);
        assert_eq!(input.total_count, 3);
        assert_eq!(input.current_day, 7);
    }

    #[test]
    fn test_notable_relationships() {
        let mut world = world();
        let (a, b, c) = (NpcId::from("a"), NpcId::from("b"), NpcId::from("c"));
        world.npc_mut(&a).unwrap().set_relationship(&c, 51);
        world.npc_mut(&a).unwrap().set_relationship(&b, -31);
        world.npc_mut(&c).unwrap().set_relationship(&a, 50);
        world.npc_mut(&c).unwrap().set_relationship(&b, -30);
        // Dead NPCs are not reported.
        world.npc_mut(&b).unwrap().set_relationship(&a, 90);
        world.mark_dead(&b);

        let input = ChronicleInput::compile(&world);
        assert_eq!(
            input.relationships,
            vec!["Anna is friends with Cid", "Anna is enemies with Bob"]
        );
    }

    #[test]
    fn test_fallback_lists_last_ten_events() {
        let input = ChronicleInput {
            key_events: (1..=12).map(|i| format!("Day {i}: Anna talked to Cid (x)")).collect(),
            deaths: vec![],
            relationships: vec![],
            alive_count: 2,
            total_count: 3,
            current_day: 12,
        };

        let text = fallback_chronicle(&input);
        assert!(text.contains("## Simulation days: 12"));
        assert!(text.contains("## Surviving NPCs: 2/3"));
        assert!(text.contains("1. Day 3: Anna talked to Cid (x)"));
        assert!(text.contains("10. Day 12: Anna talked to Cid (x)"));
        assert!(!text.contains("Day 2:"));
    }

    #[test]
    fn test_statistics_block() {
        let mut world = world();
        world.current_day = 5;
        let b = NpcId::from("b");
        world.mark_dead(&b);
        world.vacate(&b);

        let stats = statistics_block(&world);
        assert!(stats.contains("**Days simulated**: 5"));
        assert!(stats.contains("**Alive NPCs**: 2/3"));
        assert!(stats.contains("**Dead**: 1"));
        assert!(stats.contains("- **Forest**: 0 NPC"));
        assert!(stats.contains("- **Village**: 2 NPC"));
    }

    struct FailingNarrator;

    #[async_trait]
    impl Narrator for FailingNarrator {
        async fn narrate(&self, _input: &ChronicleInput) -> Result<String, NarratorError> {
            Err(NarratorError::Empty)
        }
    }

    #[tokio::test]
    async fn test_narrator_failure_falls_back() {
        let world = world();
        let narrator = FailingNarrator;
        let text = compose_chronicle(&world, Some(&narrator)).await;
        assert!(text.starts_with("# Simulation Chronicle"));
        assert!(text.contains("## Simulation Statistics"));
    }

    #[tokio::test]
    async fn test_write_chronicle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chronicles.md");
        let written = write_chronicle(&world(), None, &path).await.unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, on_disk);
    }

    #[test]
    fn test_narrator_timeout_overrides_client_limit() {
        let decision_client = Claude::new("test-key").with_timeout(Duration::from_secs(20));
        let config = OracleConfig {
            chronicle_model: Some("chronicle-model".to_string()),
            chronicle_timeout_secs: 120,
            ..OracleConfig::default()
        };

        let narrator = ClaudeNarrator::new(decision_client).with_config(&config);

        assert_eq!(narrator.timeout, Duration::from_secs(120));
        assert_eq!(narrator.client.timeout(), Duration::from_secs(120));
        assert_eq!(narrator.model.as_deref(), Some("chronicle-model"));
    }

    #[test]
    fn test_narrator_without_chronicle_model_keeps_client_default() {
        let narrator =
            ClaudeNarrator::new(Claude::new("test-key")).with_config(&OracleConfig::default());
        assert!(narrator.model.is_none());
        assert_eq!(narrator.client.timeout(), OracleConfig::default().chronicle_timeout());
    }

    #[test]
    fn test_prompt_mentions_deaths() {
        let mut input = ChronicleInput::compile(&world());
        assert!(chronicle_prompt(&input).contains("DEATHS: Nobody died"));
        input.deaths.push("Bob (hunter), age 40.1".to_string());
        assert!(chronicle_prompt(&input).contains("DEATHS: Bob (hunter), age 40.1"));
    }
}
