//! Run-wide resource budget (the `ExecutionContext`).
//!
//! The context is the single source of truth for whether a run may continue.
//! It is owned by the orchestrator and mutated only through `&mut self`
//! methods, so the single-writer invariant is enforced by ownership.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::failure::FailureClass;

/// Hard ceilings for a run. Each bound is exceeded only when the matching
/// counter is strictly greater than the limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetLimits {
    pub max_steps: u64,
    pub max_retries: u64,
    pub max_elapsed_time_ms: u64,
    pub max_evidence_bytes: u64,
    pub max_quarantines: u64,
    pub max_cost_units: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_retries: 50,
            max_elapsed_time_ms: 10 * 60 * 1000,
            max_evidence_bytes: 50 * 1024 * 1024,
            max_quarantines: 20,
            max_cost_units: 10.0,
        }
    }
}

/// Mutable run counters checked against immutable [`BudgetLimits`].
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    start_time: Instant,
    elapsed_time_ms: u64,
    step_count: u64,
    retry_count_total: u64,
    retry_count_by_class: BTreeMap<FailureClass, u64>,
    evidence_bytes_written: u64,
    quarantine_count: u64,
    cost_units_spent: f64,
    limits: BudgetLimits,
}

/// Read-only observability view of an [`ExecutionContext`].
///
/// Snapshots are for logs and reports; decisions read the live context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub elapsed_time_ms: u64,
    pub step_count: u64,
    pub retry_count_total: u64,
    pub retry_count_by_class: BTreeMap<FailureClass, u64>,
    pub evidence_bytes_written: u64,
    pub quarantine_count: u64,
    pub cost_units_spent: f64,
}

impl ExecutionContext {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            start_time: Instant::now(),
            elapsed_time_ms: 0,
            step_count: 0,
            retry_count_total: 0,
            retry_count_by_class: FailureClass::ALL.iter().map(|class| (*class, 0)).collect(),
            evidence_bytes_written: 0,
            quarantine_count: 0,
            cost_units_spent: 0.0,
            limits,
        }
    }

    /// Recompute `elapsed_time_ms` from the monotonic clock.
    pub fn update_time(&mut self) {
        let elapsed = self.start_time.elapsed().as_millis();
        self.elapsed_time_ms = u64::try_from(elapsed).unwrap_or(u64::MAX);
    }

    pub fn increment_step(&mut self) {
        self.step_count += 1;
    }

    pub fn record_retry(&mut self, class: FailureClass) {
        self.retry_count_total += 1;
        *self.retry_count_by_class.entry(class).or_insert(0) += 1;
    }

    pub fn record_evidence(&mut self, byte_count: u64) {
        self.evidence_bytes_written = self.evidence_bytes_written.saturating_add(byte_count);
    }

    pub fn record_quarantine(&mut self) {
        self.quarantine_count += 1;
    }

    pub fn record_cost(&mut self, units: f64) {
        self.cost_units_spent += units;
    }

    /// True iff any counter strictly exceeds its limit.
    pub fn limits_exceeded(&self) -> bool {
        let limits = &self.limits;
        self.step_count > limits.max_steps
            || self.retry_count_total > limits.max_retries
            || self.elapsed_time_ms > limits.max_elapsed_time_ms
            || self.evidence_bytes_written > limits.max_evidence_bytes
            || self.quarantine_count > limits.max_quarantines
            || self.cost_units_spent > limits.max_cost_units
    }

    /// Wall-clock deadline derived from `max_elapsed_time_ms`.
    pub fn deadline(&self) -> Instant {
        self.start_time + Duration::from_millis(self.limits.max_elapsed_time_ms)
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            elapsed_time_ms: self.elapsed_time_ms,
            step_count: self.step_count,
            retry_count_total: self.retry_count_total,
            retry_count_by_class: self.retry_count_by_class.clone(),
            evidence_bytes_written: self.evidence_bytes_written,
            quarantine_count: self.quarantine_count,
            cost_units_spent: self.cost_units_spent,
        }
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn retry_count_total(&self) -> u64 {
        self.retry_count_total
    }

    pub fn retry_count(&self, class: FailureClass) -> u64 {
        self.retry_count_by_class.get(&class).copied().unwrap_or(0)
    }

    pub fn evidence_bytes_written(&self) -> u64 {
        self.evidence_bytes_written
    }

    pub fn quarantine_count(&self) -> u64 {
        self.quarantine_count
    }

    pub fn cost_units_spent(&self) -> f64 {
        self.cost_units_spent
    }
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("run deadline exceeded"));
    }
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limits() -> BudgetLimits {
        BudgetLimits {
            max_steps: 2,
            max_retries: 2,
            max_elapsed_time_ms: 1_000,
            max_evidence_bytes: 100,
            max_quarantines: 2,
            max_cost_units: 1.0,
        }
    }

    #[test]
    fn fresh_context_is_within_limits() {
        let ctx = ExecutionContext::new(small_limits());
        assert!(!ctx.limits_exceeded());
        assert_eq!(ctx.retry_count_total(), 0);
    }

    #[test]
    fn retry_count_by_class_is_fully_populated() {
        let ctx = ExecutionContext::new(BudgetLimits::default());
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.retry_count_by_class.len(), FailureClass::ALL.len());
        assert!(snapshot.retry_count_by_class.values().all(|count| *count == 0));
    }

    #[test]
    fn steps_exceed_only_past_limit() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.increment_step();
        ctx.increment_step();
        assert!(!ctx.limits_exceeded(), "equal to limit is not exceeded");
        ctx.increment_step();
        assert!(ctx.limits_exceeded());
    }

    #[test]
    fn retries_exceed_only_past_limit() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.record_retry(FailureClass::Network);
        ctx.record_retry(FailureClass::ServerError);
        assert!(!ctx.limits_exceeded());
        ctx.record_retry(FailureClass::Network);
        assert!(ctx.limits_exceeded());
        assert_eq!(ctx.retry_count(FailureClass::Network), 2);
        assert_eq!(ctx.retry_count(FailureClass::ServerError), 1);
        assert_eq!(ctx.retry_count_total(), 3);
    }

    #[test]
    fn elapsed_exceeds_only_past_limit() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.elapsed_time_ms = 1_000;
        assert!(!ctx.limits_exceeded());
        ctx.elapsed_time_ms = 1_001;
        assert!(ctx.limits_exceeded());
    }

    #[test]
    fn update_time_reads_monotonic_clock() {
        let mut ctx = ExecutionContext::new(BudgetLimits {
            max_elapsed_time_ms: 0,
            ..BudgetLimits::default()
        });
        std::thread::sleep(Duration::from_millis(5));
        ctx.update_time();
        assert!(ctx.snapshot().elapsed_time_ms >= 5);
        assert!(ctx.limits_exceeded());
    }

    #[test]
    fn evidence_bytes_exceed_only_past_limit() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.record_evidence(100);
        assert!(!ctx.limits_exceeded());
        ctx.record_evidence(1);
        assert!(ctx.limits_exceeded());
    }

    #[test]
    fn quarantines_exceed_only_past_limit() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.record_quarantine();
        ctx.record_quarantine();
        assert!(!ctx.limits_exceeded());
        ctx.record_quarantine();
        assert!(ctx.limits_exceeded());
    }

    #[test]
    fn cost_exceeds_only_past_limit() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.record_cost(0.5);
        ctx.record_cost(0.5);
        assert!(!ctx.limits_exceeded());
        ctx.record_cost(0.25);
        assert!(ctx.limits_exceeded());
    }

    #[test]
    fn snapshot_is_detached_from_live_context() {
        let mut ctx = ExecutionContext::new(small_limits());
        let before = ctx.snapshot();
        ctx.record_quarantine();
        assert_eq!(before.quarantine_count, 0);
        assert_eq!(ctx.snapshot().quarantine_count, 1);
    }

    #[test]
    fn snapshot_serializes_class_names() {
        let mut ctx = ExecutionContext::new(small_limits());
        ctx.record_retry(FailureClass::RateLimit);
        let json = serde_json::to_value(ctx.snapshot()).expect("serialize");
        assert_eq!(json["retry_count_by_class"]["rate_limit"], 1);
        assert_eq!(json["retry_count_by_class"]["semantic"], 0);
    }

    #[test]
    fn remaining_budget_errors_after_deadline() {
        let err = remaining_budget(Instant::now()).unwrap_err();
        assert!(err.to_string().contains("deadline"));
        let remaining = remaining_budget(Instant::now() + Duration::from_secs(5)).expect("budget");
        assert!(remaining > Duration::from_secs(4));
    }
}
