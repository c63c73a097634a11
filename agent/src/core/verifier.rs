//! Claim verification and confidence scoring for grounded answers.

use std::collections::{BTreeSet, HashMap};

use crate::core::text::tokens;
use crate::core::types::{ContextBlock, DraftAnswer, ReasoningOutput, VerifiedClaim};

/// Minimum lexical containment of a claim inside its cited chunk.
pub const SIMILARITY_THRESHOLD: f64 = 0.82;

const SIMILARITY_WEIGHT: f64 = 0.85;
const DIVERSITY_STEP: f64 = 0.05;
const DIVERSITY_CAP: f64 = 0.15;

/// Keep only claims that cite a provided chunk and are grounded in its text,
/// then derive a confidence from the survivors.
pub fn verify_claims(draft: &DraftAnswer, blocks: &[ContextBlock]) -> ReasoningOutput {
    let by_chunk: HashMap<&str, &ContextBlock> = blocks
        .iter()
        .map(|block| (block.chunk_id.as_str(), block))
        .collect();

    let verified: Vec<VerifiedClaim> = draft
        .claims
        .iter()
        .filter_map(|claim| {
            let block = by_chunk.get(claim.chunk_id.as_str())?;
            let similarity = containment(&claim.statement, &block.chunk_text);
            if similarity < SIMILARITY_THRESHOLD {
                return None;
            }
            Some(VerifiedClaim {
                statement: claim.statement.clone(),
                chunk_id: claim.chunk_id.clone(),
                // The cited chunk, not the model, is authoritative for provenance.
                evidence_id: block.evidence_id.clone(),
                similarity_score: round4(similarity),
            })
        })
        .collect();

    if verified.is_empty() {
        return ReasoningOutput::insufficient(ReasoningOutput::INSUFFICIENT_GROUNDED_CLAIMS);
    }

    let confidence = compute_confidence(&verified);
    ReasoningOutput {
        answer: draft.answer.clone(),
        claims: verified,
        confidence,
        conflicts: Vec::new(),
    }
}

/// Fraction of the statement's tokens that appear in the chunk.
pub fn containment(statement: &str, chunk_text: &str) -> f64 {
    let statement_tokens = tokens(statement);
    if statement_tokens.is_empty() {
        return 0.0;
    }
    let chunk_tokens = tokens(chunk_text);
    let present = statement_tokens.intersection(&chunk_tokens).count();
    present as f64 / statement_tokens.len() as f64
}

fn compute_confidence(claims: &[VerifiedClaim]) -> f64 {
    if claims.is_empty() {
        return 0.0;
    }
    let mean = claims.iter().map(|c| c.similarity_score).sum::<f64>() / claims.len() as f64;
    let distinct_sources: BTreeSet<&str> = claims.iter().map(|c| c.evidence_id.as_str()).collect();
    let diversity = (distinct_sources.len() as f64 * DIVERSITY_STEP).min(DIVERSITY_CAP);
    round4((mean * SIMILARITY_WEIGHT + diversity).min(1.0))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
