//! Pure retry decision engine.
//!
//! `decide` reads the live budget and a failure and returns exactly one
//! decision. It never mutates state; the orchestrator applies the matching
//! side effects (retry or quarantine accounting) afterwards.

use serde::{Deserialize, Serialize};

use crate::core::budget::ExecutionContext;
use crate::core::failure::{FailureClass, FailureEvent};

/// What the orchestrator should do with a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryDecision {
    RetryNow,
    RetryBackoff,
    HaltTask,
    QuarantineAndContinue,
}

impl RetryDecision {
    pub fn is_retry(self) -> bool {
        matches!(self, RetryDecision::RetryNow | RetryDecision::RetryBackoff)
    }
}

/// Decide how to handle `failure` given the current budget. First match wins.
pub fn decide(ctx: &ExecutionContext, failure: &FailureEvent) -> RetryDecision {
    if ctx.limits_exceeded() {
        return RetryDecision::HaltTask;
    }

    match failure.failure_class() {
        FailureClass::Semantic => RetryDecision::QuarantineAndContinue,
        FailureClass::RateLimit => {
            if ctx.retry_count_total() >= ctx.limits().max_retries {
                RetryDecision::HaltTask
            } else {
                RetryDecision::RetryBackoff
            }
        }
        FailureClass::Network | FailureClass::ServerError => RetryDecision::RetryBackoff,
        FailureClass::ClientError | FailureClass::Unknown => RetryDecision::HaltTask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::BudgetLimits;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(BudgetLimits {
            max_retries: 2,
            max_quarantines: 1,
            ..BudgetLimits::default()
        })
    }

    fn failure(class: FailureClass) -> FailureEvent {
        FailureEvent::new(class, None, "test failure")
    }

    #[test]
    fn semantic_failures_are_quarantined() {
        assert_eq!(
            decide(&ctx(), &failure(FailureClass::Semantic)),
            RetryDecision::QuarantineAndContinue
        );
    }

    #[test]
    fn transient_failures_back_off() {
        assert_eq!(
            decide(&ctx(), &failure(FailureClass::Network)),
            RetryDecision::RetryBackoff
        );
        assert_eq!(
            decide(&ctx(), &failure(FailureClass::ServerError)),
            RetryDecision::RetryBackoff
        );
        assert_eq!(
            decide(&ctx(), &FailureEvent::rate_limited(429, Some(3))),
            RetryDecision::RetryBackoff
        );
    }

    #[test]
    fn client_and_unknown_failures_halt() {
        assert_eq!(
            decide(&ctx(), &failure(FailureClass::ClientError)),
            RetryDecision::HaltTask
        );
        assert_eq!(
            decide(&ctx(), &failure(FailureClass::Unknown)),
            RetryDecision::HaltTask
        );
    }

    #[test]
    fn rate_limit_halts_once_retries_reach_limit() {
        let mut ctx = ctx();
        ctx.record_retry(FailureClass::RateLimit);
        assert_eq!(
            decide(&ctx, &FailureEvent::rate_limited(429, None)),
            RetryDecision::RetryBackoff
        );
        ctx.record_retry(FailureClass::RateLimit);
        assert!(!ctx.limits_exceeded());
        assert_eq!(
            decide(&ctx, &FailureEvent::rate_limited(429, None)),
            RetryDecision::HaltTask
        );
        // Network failures keep backing off at the same count.
        assert_eq!(
            decide(&ctx, &failure(FailureClass::Network)),
            RetryDecision::RetryBackoff
        );
    }

    #[test]
    fn exceeded_limits_override_every_class() {
        let mut ctx = ctx();
        ctx.record_quarantine();
        ctx.record_quarantine();
        assert!(ctx.limits_exceeded());
        for class in FailureClass::ALL {
            assert_eq!(decide(&ctx, &failure(class)), RetryDecision::HaltTask);
        }
    }

    #[test]
    fn semantic_never_retries() {
        let mut ctx = ctx();
        for _ in 0..3 {
            let decision = decide(&ctx, &failure(FailureClass::Semantic));
            assert!(!decision.is_retry());
            ctx.record_quarantine();
        }
    }

    #[test]
    fn decide_is_deterministic_and_leaves_context_untouched() {
        let ctx = ctx();
        let before = ctx.snapshot();
        let first = decide(&ctx, &failure(FailureClass::Network));
        let second = decide(&ctx, &failure(FailureClass::Network));
        assert_eq!(first, second);
        assert_eq!(ctx.snapshot(), before);
    }
}
