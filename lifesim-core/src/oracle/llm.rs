//! Claude-backed decision oracle.
//!
//! Uses a fast, cheap model to pick one social action per NPC. Requests are
//! bounded by a timeout, and any API, timeout or parse failure degrades to
//! "no decision".

use super::roster::{RawRoster, Roster, RosterSource};
use super::{extract_json, DecisionOracle};
use crate::config::OracleConfig;
use crate::model::{Npc, NpcId};
use crate::rules::{Decision, SocialAction, DEFAULT_REASON};
use async_trait::async_trait;
use claude::{Claude, Message, Request};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Default model for social decisions.
const DECISION_MODEL: &str = "claude-3-5-haiku-20241022";

/// Maximum tokens for a decision response.
const DECISION_MAX_TOKENS: usize = 200;

/// Maximum tokens for a roster response.
const ROSTER_MAX_TOKENS: usize = 2000;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors inside the Claude oracle. They never leave the adapter.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API error: {0}")]
    Api(#[from] claude::Error),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse oracle response: {0}")]
    Parse(String),
}

/// Response format we expect for a decision.
#[derive(Debug, Deserialize)]
struct DecisionResponse {
    action: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Decision oracle backed by the Claude API.
pub struct ClaudeOracle {
    client: Claude,
    model: String,
    timeout: Duration,
}

impl ClaudeOracle {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            model: DECISION_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from environment (ANTHROPIC_API_KEY).
    pub fn from_env() -> Result<Self, claude::Error> {
        Ok(Self::new(Claude::from_env()?))
    }

    /// Apply the oracle section of the simulation config.
    pub fn with_config(mut self, config: &OracleConfig) -> Self {
        if let Some(model) = &config.decision_model {
            self.model = model.clone();
        }
        self.with_timeout(config.timeout())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Bound each call. The HTTP client is rebuilt with the same limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self.timeout = timeout;
        self
    }

    /// Send a single-message request, bounded by the oracle timeout.
    async fn ask(
        &self,
        prompt: String,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, OracleError> {
        let request = Request::new(vec![Message::user(prompt)])
            .with_model(&self.model)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);

        let response = tokio::time::timeout(self.timeout, self.client.complete(request))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;
        Ok(response.text())
    }

    async fn request_decision(&self, npc: &Npc, nearby: &[NpcId]) -> Result<Decision, OracleError> {
        let text = self
            .ask(decision_prompt(npc, nearby), DECISION_MAX_TOKENS, 0.7)
            .await?;
        parse_decision(&text)
    }

    async fn request_roster(
        &self,
        location_count: usize,
        npc_count: usize,
    ) -> Result<Roster, OracleError> {
        let text = self
            .ask(roster_prompt(location_count, npc_count), ROSTER_MAX_TOKENS, 1.0)
            .await?;
        let json_str = extract_json(&text);
        let raw: RawRoster = serde_json::from_str(json_str)
            .map_err(|e| OracleError::Parse(format!("{e}: {json_str}")))?;
        raw.into_roster()
            .map_err(|e| OracleError::Parse(e.to_string()))
    }
}

#[async_trait]
impl DecisionOracle for ClaudeOracle {
    async fn propose_action(&self, npc: &Npc, nearby: &[NpcId]) -> Option<Decision> {
        match self.request_decision(npc, nearby).await {
            Ok(decision) => {
                tracing::debug!(
                    npc = %npc.id,
                    action = %decision.action,
                    target = %decision.target,
                    "oracle decision"
                );
                Some(decision)
            }
            Err(e) => {
                tracing::warn!(npc = %npc.id, error = %e, "oracle gave no decision");
                None
            }
        }
    }
}

#[async_trait]
impl RosterSource for ClaudeOracle {
    async fn generate_roster(&self, location_count: usize, npc_count: usize) -> Option<Roster> {
        match self.request_roster(location_count, npc_count).await {
            Ok(roster) => {
                tracing::info!(
                    locations = roster.locations.len(),
                    npcs = roster.npcs.len(),
                    "generated roster"
                );
                Some(roster)
            }
            Err(e) => {
                tracing::warn!(error = %e, "roster generation failed");
                None
            }
        }
    }
}

/// Build the decision prompt. Only relationships with `nearby` are shown.
pub(crate) fn decision_prompt(npc: &Npc, nearby: &[NpcId]) -> String {
    let relationships = npc
        .relationships_with(nearby)
        .map(|(id, score)| format!("{id}: {score}"))
        .collect::<Vec<_>>()
        .join(", ");
    let stats = npc.stats;

    format!(
        r#"You are a {role} named {name} in {location}.
Your stats: health={health}, energy={energy}, mood={mood}.
Your relationships with nearby people: {{{relationships}}}

Make ONE social decision towards one of the nearby people. Reply with ONLY a JSON object:
{{"action": "chat/help/argue/ignore", "target": "other_npc_id", "reason": "brief reason"}}"#,
        role = npc.role,
        name = npc.name,
        location = npc.location,
        health = stats.health,
        energy = stats.energy,
        mood = stats.mood,
    )
}

fn roster_prompt(location_count: usize, npc_count: usize) -> String {
    format!(
        r#"Generate a small medieval fantasy world with {location_count} locations and {npc_count} inhabitants.
Each location should be unique and atmospheric. Mix different social classes and professions.
Roles must be one of: king, guard, peasant, merchant, hunter, sage, child.
Every inhabitant's location must be the name of one of the generated locations, and every id must be unique.

Respond with ONLY a JSON object (no markdown, no explanation outside the JSON):
{{
  "locations": [
    {{"name": "Castle Ravencrest", "type": "royal", "description": "Dark fortress on a cliff"}},
    {{"name": "Willowbrook", "type": "settlement", "description": "Peaceful village by a stream"}}
  ],
  "npcs": [
    {{"id": "king_1", "name": "King Aldwin", "role": "king", "location": "Castle Ravencrest"}},
    {{"id": "peasant_1", "name": "Farmer Beck", "role": "peasant", "location": "Willowbrook"}}
  ]
}}"#
    )
}

/// Parse a decision reply. The action word is parsed leniently; a missing
/// target is an error, a missing reason is not.
pub(crate) fn parse_decision(text: &str) -> Result<Decision, OracleError> {
    let json_str = extract_json(text);
    let parsed: DecisionResponse = serde_json::from_str(json_str)
        .map_err(|e| OracleError::Parse(format!("{e}: {json_str}")))?;

    let target = parsed
        .target
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| OracleError::Parse(format!("missing target: {json_str}")))?;
    let reason = parsed
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string());

    Ok(Decision {
        action: SocialAction::parse(&parsed.action),
        target: NpcId::new(target.trim()),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, Stats};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn npc() -> Npc {
        let mut rng = StdRng::seed_from_u64(2);
        let mut npc = Npc::new("guard_1", "Sir Marcus", Role::Guard, "Castle", &mut rng);
        npc.stats = Stats::new(90, 70, 40, 55);
        npc.set_relationship(&NpcId::from("king_1"), 45);
        npc.set_relationship(&NpcId::from("sage_1"), -12);
        npc.set_relationship(&NpcId::from("hunter_1"), 30);
        npc
    }

    #[test]
    fn test_parse_plain_decision() {
        let decision =
            parse_decision(r#"{"action": "help", "target": "king_1", "reason": "loyalty"}"#)
                .unwrap();
        assert_eq!(decision, Decision::help("king_1", "loyalty"));
    }

    #[test]
    fn test_parse_fenced_decision() {
        let text =
            "```json\n{\"action\": \"Chat\", \"target\": \"sage_1\", \"reason\": \"bored\"}\n```";
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.action, SocialAction::Chat);
        assert_eq!(decision.target, NpcId::from("sage_1"));
    }

    #[test]
    fn test_parse_unknown_action() {
        let decision =
            parse_decision(r#"{"action": "chat/help", "target": "king_1", "reason": "?"}"#)
                .unwrap();
        assert_eq!(
            decision.action,
            SocialAction::Unrecognized("chat/help".to_string())
        );
    }

    #[test]
    fn test_parse_missing_fields() {
        let decision = parse_decision(r#"{"action": "argue", "target": "sage_1"}"#).unwrap();
        assert_eq!(decision.reason, DEFAULT_REASON);

        assert!(matches!(
            parse_decision(r#"{"action": "argue"}"#),
            Err(OracleError::Parse(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"target": "sage_1"}"#),
            Err(OracleError::Parse(_))
        ));
        assert!(matches!(
            parse_decision("I would rather not."),
            Err(OracleError::Parse(_))
        ));
    }

    #[test]
    fn test_prompt_restricts_relationships_to_nearby() {
        let nearby = vec![NpcId::from("king_1"), NpcId::from("sage_1")];
        let prompt = decision_prompt(&npc(), &nearby);

        assert!(prompt.contains("You are a guard named Sir Marcus in Castle."));
        assert!(prompt.contains("health=90, energy=70, mood=55"));
        assert!(prompt.contains("{king_1: 45, sage_1: -12}"));
        assert!(!prompt.contains("hunter_1"));
    }

    #[test]
    fn test_with_config() {
        let config = OracleConfig {
            decision_model: Some("custom-model".to_string()),
            timeout_secs: 5,
            ..OracleConfig::default()
        };
        let oracle = ClaudeOracle::new(Claude::new("test-key")).with_config(&config);
        assert_eq!(oracle.model, "custom-model");
        assert_eq!(oracle.timeout, Duration::from_secs(5));
        assert_eq!(oracle.client.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore] // Requires API key
    async fn test_real_decision() {
        dotenvy::dotenv().ok();
        let oracle = ClaudeOracle::from_env().expect("ANTHROPIC_API_KEY not set");
        let nearby = vec![NpcId::from("king_1"), NpcId::from("sage_1")];

        let decision = oracle.request_decision(&npc(), &nearby).await.unwrap();
        println!("Decision: {decision:?}");
        assert!(!decision.target.as_str().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires API key
    async fn test_real_roster() {
        dotenvy::dotenv().ok();
        let oracle = ClaudeOracle::from_env().expect("ANTHROPIC_API_KEY not set");

        let roster = oracle.request_roster(3, 6).await.unwrap();
        println!("Roster: {roster:?}");
        assert!(!roster.locations.is_empty());
        assert!(!roster.npcs.is_empty());
    }
}
