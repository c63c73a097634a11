//! Shared contract types between the orchestrator and its collaborators.
//!
//! Payloads that arrive from untrusted sources (planner and reasoner output)
//! are decoded strictly: unknown fields are rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::goal::ActionType;

/// A successful fetch, as returned by the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Immutable view of the run handed to the planner. Contains no raw evidence text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannerSnapshot {
    pub goal: String,
    pub requirements: Vec<String>,
    pub covered_requirements: Vec<String>,
    pub evidence_count: usize,
    pub step_count: u32,
    pub max_steps: u32,
    pub recent_actions: Vec<ActionType>,
}

/// Planner reply. `action` stays a string so the orchestrator can fail closed
/// on values outside the action set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerReply {
    pub action: String,
    pub query: Option<String>,
    pub url: Option<String>,
}

impl PlannerReply {
    pub fn search(query: &str) -> Self {
        Self {
            action: "SEARCH".to_string(),
            query: Some(query.to_string()),
            url: None,
        }
    }

    pub fn fetch(url: &str) -> Self {
        Self {
            action: "FETCH".to_string(),
            query: None,
            url: Some(url.to_string()),
        }
    }

    pub fn bare(action: &str) -> Self {
        Self {
            action: action.to_string(),
            query: None,
            url: None,
        }
    }
}

/// Atomic unit of evidence passed to the reasoner. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBlock {
    pub chunk_id: String,
    pub evidence_id: String,
    pub source_url: String,
    pub chunk_text: String,
    pub integrity_score: f64,
}

/// A claim as proposed by the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claim {
    pub statement: String,
    pub chunk_id: String,
    pub evidence_id: String,
}

/// Raw grounded answer from the language model, before verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftAnswer {
    pub answer: String,
    pub claims: Vec<Claim>,
}

/// A claim that cites a provided chunk and is lexically grounded in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedClaim {
    pub statement: String,
    pub chunk_id: String,
    pub evidence_id: String,
    pub similarity_score: f64,
}

/// Output of the grounded-reasoning collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningOutput {
    pub answer: String,
    pub claims: Vec<VerifiedClaim>,
    pub confidence: f64,
    pub conflicts: Vec<String>,
}

impl ReasoningOutput {
    pub const INSUFFICIENT_EVIDENCE: &'static str = "INSUFFICIENT_EVIDENCE";
    pub const INSUFFICIENT_GROUNDED_CLAIMS: &'static str = "INSUFFICIENT_GROUNDED_CLAIMS";

    pub fn insufficient(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            claims: Vec::new(),
            confidence: 0.0,
            conflicts: Vec::new(),
        }
    }
}
