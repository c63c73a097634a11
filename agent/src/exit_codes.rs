//! Stable exit codes for the research-agent CLI.

use crate::core::goal::HaltReason;

/// The run halted with its goal satisfied.
pub const OK: i32 = 0;
/// Infrastructure failure: config, evidence store, run log or other errors.
pub const INVALID: i32 = 1;
/// The run halted for any reason other than a satisfied goal.
pub const INCOMPLETE: i32 = 2;

pub fn for_halt_reason(reason: HaltReason) -> i32 {
    match reason {
        HaltReason::GoalSatisfied => OK,
        _ => INCOMPLETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_goal_satisfied_succeeds() {
        assert_eq!(for_halt_reason(HaltReason::GoalSatisfied), OK);
        assert_eq!(for_halt_reason(HaltReason::StagnationDetected), INCOMPLETE);
        assert_eq!(for_halt_reason(HaltReason::FetchHalted), INCOMPLETE);
    }
}
