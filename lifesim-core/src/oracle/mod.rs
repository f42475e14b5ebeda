//! Decision oracle: the port the engine asks for optional social actions.
//!
//! The engine never talks to a model directly. It hands an NPC and the ids
//! of up to three neighbours to a [`DecisionOracle`] and folds whatever comes
//! back through the rules. Every failure inside an oracle is "no decision".

mod llm;
pub mod roster;

pub use llm::{ClaudeOracle, OracleError};
pub use roster::{Roster, RosterError, RosterSource};

use crate::model::{Npc, NpcId};
use crate::rules::Decision;
use async_trait::async_trait;

/// Supplies an optional social action for an NPC.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Propose one social action towards one of `nearby`.
    ///
    /// `nearby` is never empty and never contains `npc` itself.
    async fn propose_action(&self, npc: &Npc, nearby: &[NpcId]) -> Option<Decision>;
}

/// Oracle that never decides anything. Used for offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

#[async_trait]
impl DecisionOracle for NoOracle {
    async fn propose_action(&self, _npc: &Npc, _nearby: &[NpcId]) -> Option<Decision> {
        None
    }
}

/// Extract JSON from a reply that might be wrapped in markdown code blocks.
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // ```json ... ```
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // ``` ... ```
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_no_oracle_never_decides() {
        let mut rng = StdRng::seed_from_u64(1);
        let npc = Npc::new("a", "A", Role::Peasant, "Village", &mut rng);
        let oracle: Box<dyn DecisionOracle> = Box::new(NoOracle);
        assert!(oracle.propose_action(&npc, &[NpcId::from("b")]).await.is_none());
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"action": "chat"}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_markdown() {
        let text = "```json\n{\"action\": \"help\"}\n```";
        assert_eq!(extract_json(text), r#"{"action": "help"}"#);
    }

    #[test]
    fn test_extract_json_markdown_no_specifier() {
        let text = "Sure!\n```\n{\"action\": \"argue\"}\n```";
        assert_eq!(extract_json(text), r#"{"action": "argue"}"#);
    }
}
