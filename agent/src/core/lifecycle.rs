//! Evidence lifecycle tokens and integrity envelopes.
//!
//! An [`IntegrityEnvelope`] is one timestamped judgment, appended to a
//! per-evidence history and never altered. The [`EvidenceState`] is the
//! latest-authoritative token derived from the most recent judgment and is
//! overwritten on each transition.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::integrity::IntegrityResult;

/// Current lifecycle token of an evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceState {
    RawAccepted,
    QuarantinedLowIntegrity,
}

impl EvidenceState {
    pub fn as_token(self) -> &'static str {
        match self {
            EvidenceState::RawAccepted => "RAW_ACCEPTED",
            EvidenceState::QuarantinedLowIntegrity => "QUARANTINED_LOW_INTEGRITY",
        }
    }

    /// Parse a persisted token. Unrecognized tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "RAW_ACCEPTED" => Some(EvidenceState::RawAccepted),
            "QUARANTINED_LOW_INTEGRITY" => Some(EvidenceState::QuarantinedLowIntegrity),
            _ => None,
        }
    }
}

impl fmt::Display for EvidenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Policy decision recorded in an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Quarantine,
}

/// Append-only integrity judgment for one evidence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrityEnvelope {
    pub evidence_id: String,
    pub integrity_score: f64,
    pub usable_for_reasoning: bool,
    pub flags: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub validator_version: String,
    pub decision: Decision,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
}

impl IntegrityEnvelope {
    /// Required-field violations; empty when the envelope is complete.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.evidence_id.trim().is_empty() {
            missing.push("evidence_id");
        }
        if !self.integrity_score.is_finite() || !(0.0..=1.0).contains(&self.integrity_score) {
            missing.push("integrity_score");
        }
        if self.metrics.is_empty() {
            missing.push("metrics");
        }
        if self.validator_version.trim().is_empty() {
            missing.push("validator_version");
        }
        if self.created_at.trim().is_empty() {
            missing.push("created_at");
        }
        missing
    }
}

/// Map an integrity result onto a lifecycle state and envelope, stamped now.
pub fn integrate_integrity(
    evidence_id: &str,
    integrity: &IntegrityResult,
) -> (EvidenceState, IntegrityEnvelope) {
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    integrate_integrity_at(evidence_id, integrity, created_at)
}

/// Same as [`integrate_integrity`] with an explicit timestamp.
///
/// No recomputation: flags and metrics are carried verbatim.
pub fn integrate_integrity_at(
    evidence_id: &str,
    integrity: &IntegrityResult,
    created_at: String,
) -> (EvidenceState, IntegrityEnvelope) {
    let (state, decision) = if integrity.usable_for_reasoning {
        (EvidenceState::RawAccepted, Decision::Allow)
    } else {
        (EvidenceState::QuarantinedLowIntegrity, Decision::Quarantine)
    };

    let envelope = IntegrityEnvelope {
        evidence_id: evidence_id.to_string(),
        integrity_score: integrity.integrity_score,
        usable_for_reasoning: integrity.usable_for_reasoning,
        flags: integrity.flags.clone(),
        metrics: integrity.metrics.clone(),
        validator_version: integrity.validator_version.clone(),
        decision,
        created_at,
    };

    (state, envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integrity::evaluate;

    const TS: &str = "2026-01-01T00:00:00.000Z";

    #[test]
    fn usable_result_is_accepted() {
        let healthy: Vec<u8> = (0..600u32).map(|i| 32 + (i % 95) as u8).collect();
        let result = evaluate(&healthy);
        let (state, envelope) = integrate_integrity_at("abc", &result, TS.to_string());
        assert_eq!(state, EvidenceState::RawAccepted);
        assert_eq!(envelope.decision, Decision::Allow);
        assert_eq!(envelope.metrics, result.metrics);
        assert_eq!(envelope.integrity_score, result.integrity_score);
        assert!(envelope.missing_fields().is_empty());
    }

    #[test]
    fn unusable_result_is_quarantined_with_flags_verbatim() {
        let result = evaluate(b"");
        let (state, envelope) = integrate_integrity_at("abc", &result, TS.to_string());
        assert_eq!(state, EvidenceState::QuarantinedLowIntegrity);
        assert_eq!(envelope.decision, Decision::Quarantine);
        assert_eq!(envelope.flags, vec!["empty_content".to_string()]);
        assert!(!envelope.usable_for_reasoning);
    }

    #[test]
    fn integrate_integrity_stamps_creation_time() {
        let (_, envelope) = integrate_integrity("abc", &evaluate(b"x"));
        assert!(envelope.created_at.ends_with('Z'));
        assert!(envelope.missing_fields().is_empty());
    }

    #[test]
    fn tokens_round_trip_and_reject_unknown() {
        for state in [EvidenceState::RawAccepted, EvidenceState::QuarantinedLowIntegrity] {
            assert_eq!(EvidenceState::from_token(state.as_token()), Some(state));
        }
        assert_eq!(EvidenceState::from_token("RAW_ACCEPTED\n"), Some(EvidenceState::RawAccepted));
        assert_eq!(EvidenceState::from_token("raw_accepted"), None);
        assert_eq!(EvidenceState::from_token(""), None);
    }

    #[test]
    fn envelope_serializes_decision_and_fields() {
        let (_, envelope) = integrate_integrity_at("abc", &evaluate(b"hello"), TS.to_string());
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["decision"], "QUARANTINE");
        assert_eq!(json["evidence_id"], "abc");
        assert_eq!(json["created_at"], TS);
        assert_eq!(json["validator_version"], "integrity_v1");
    }

    #[test]
    fn missing_fields_reports_blank_values() {
        let (_, mut envelope) = integrate_integrity_at("abc", &evaluate(b"hello"), TS.to_string());
        envelope.evidence_id = String::new();
        envelope.created_at = " ".to_string();
        envelope.integrity_score = f64::NAN;
        assert_eq!(
            envelope.missing_fields(),
            vec!["evidence_id", "integrity_score", "created_at"]
        );
    }
}
