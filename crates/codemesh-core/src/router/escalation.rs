//! Escalation capability: Tier-2 disambiguation and Tier-3 discovery.
//!
//! The capability is an injected interface, not a required dependency: the
//! router is fully functional (at reduced recall) with no implementation
//! configured. The LLM-backed implementation treats the model as fallible,
//! rate-limited, and latent; every error degrades to "unresolved".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompts::{
    build_disambiguation_prompt, build_discovery_prompt, DISAMBIGUATION_SYSTEM_PROMPT,
    DISCOVERY_SYSTEM_PROMPT,
};
use crate::llm::{Llm, LlmError};

/// Errors raised by an escalation capability.
#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to parse escalation response: {0}")]
    ParseError(String),
}

/// What Tier-2 decided about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisambiguationStatus {
    Verified,
    Corrected,
    Rejected,
}

/// A Tier-2 request: one ambiguous candidate plus surrounding source.
#[derive(Debug, Clone)]
pub struct DisambiguationRequest {
    pub file_path: String,
    pub kind: String,
    pub name: String,
    /// Source lines around the candidate's span.
    pub context: String,
}

/// A Tier-2 response.
#[derive(Debug, Clone, Deserialize)]
pub struct Disambiguation {
    pub status: DisambiguationStatus,
    pub name: String,
    pub kind: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// A Tier-3 request: a whole unrecognized file.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub file_path: String,
    /// Best-effort language hint (usually the file extension).
    pub language_hint: String,
    pub content: String,
}

/// A node proposed by discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredNode {
    pub kind: String,
    pub name: String,
    #[serde(default = "default_line")]
    pub start_line: u32,
    #[serde(default = "default_line")]
    pub end_line: u32,
}

fn default_line() -> u32 {
    1
}

/// An edge proposed by discovery, endpoints named by entity name.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredEdge {
    pub kind: String,
    pub from: String,
    pub to: String,
}

/// A schema-pattern suggestion from discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternSuggestion {
    pub pattern: String,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub detail: String,
}

/// A Tier-3 response.
#[derive(Debug, Clone, Deserialize)]
pub struct Discovery {
    #[serde(default)]
    pub framework: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub nodes: Vec<DiscoveredNode>,
    #[serde(default)]
    pub edges: Vec<DiscoveredEdge>,
    #[serde(default)]
    pub suggestions: Vec<PatternSuggestion>,
}

/// The escalation capability consumed by the router.
#[async_trait]
pub trait Escalation: Send + Sync {
    /// Tier 2: confirm, correct, or reject one extracted candidate.
    async fn disambiguate(
        &self,
        request: DisambiguationRequest,
    ) -> Result<Disambiguation, EscalationError>;

    /// Tier 3: propose a full candidate set for an unrecognized file.
    async fn discover(&self, request: DiscoveryRequest) -> Result<Discovery, EscalationError>;
}

/// LLM-backed escalation.
pub struct LlmEscalation<L: Llm> {
    llm: L,
}

impl<L: Llm> LlmEscalation<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl<L: Llm> Escalation for LlmEscalation<L> {
    async fn disambiguate(
        &self,
        request: DisambiguationRequest,
    ) -> Result<Disambiguation, EscalationError> {
        let prompt = build_disambiguation_prompt(
            &request.kind,
            &request.name,
            &request.file_path,
            &request.context,
        );
        let response = self
            .llm
            .complete_with_system(DISAMBIGUATION_SYSTEM_PROMPT, &prompt)
            .await?;

        let json = extract_json(&response);
        let mut parsed: Disambiguation = serde_json::from_str(json).map_err(|e| {
            EscalationError::ParseError(format!(
                "{e}; response: {}",
                &json[..json.len().min(200)]
            ))
        })?;
        parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
        Ok(parsed)
    }

    async fn discover(&self, request: DiscoveryRequest) -> Result<Discovery, EscalationError> {
        let prompt =
            build_discovery_prompt(&request.file_path, &request.language_hint, &request.content);
        let response = self
            .llm
            .complete_with_system(DISCOVERY_SYSTEM_PROMPT, &prompt)
            .await?;

        let json = extract_json(&response);
        let mut parsed: Discovery = serde_json::from_str(json).map_err(|e| {
            EscalationError::ParseError(format!(
                "{e}; response: {}",
                &json[..json.len().min(200)]
            ))
        })?;
        parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
        Ok(parsed)
    }
}

/// Extracts JSON from a response that might be wrapped in markdown code blocks.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let rest = &trimmed[start + 1..];
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_fenced() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(fenced), r#"{"a": 1}"#);
    }

    #[test]
    fn test_disambiguation_parses() {
        let json = r#"{"status": "corrected", "name": "handleRequest", "kind": "method", "confidence": 0.85, "reasoning": "it is a class method"}"#;
        let parsed: Disambiguation = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, DisambiguationStatus::Corrected);
        assert_eq!(parsed.name, "handleRequest");
    }

    #[test]
    fn test_discovery_parses_with_defaults() {
        let json = r#"{"framework": null, "confidence": 0.7, "nodes": [{"kind": "function", "name": "main"}]}"#;
        let parsed: Discovery = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        assert_eq!(parsed.nodes[0].start_line, 1);
        assert!(parsed.edges.is_empty());
        assert!(parsed.suggestions.is_empty());
    }
}
