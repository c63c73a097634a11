//! The reasoning gate.

use crate::core::lifecycle::EvidenceState;

/// The only place that answers "may this evidence enter a reasoning context?".
///
/// `None` covers both a missing state file and an unrecognized token.
pub fn allow_reasoning(state: Option<EvidenceState>) -> bool {
    matches!(state, Some(EvidenceState::RawAccepted))
}
