//! The research loop: plan, act, check, until a halt condition holds.
//!
//! The agent exclusively owns the [`GoalState`] and [`ExecutionContext`];
//! collaborators are called in sequence and only ever see snapshots.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::agents::planner::Planner;
use crate::agents::reasoner::Reasoner;
use crate::core::budget::{BudgetLimits, ContextSnapshot, ExecutionContext, remaining_budget};
use crate::core::failure::FailureEvent;
use crate::core::goal::{ActionType, EvidenceRef, GoalState, HaltReason};
use crate::core::integrity::evaluate;
use crate::core::lifecycle::{EvidenceState, integrate_integrity};
use crate::core::retry::{RetryDecision, decide};
use crate::core::types::{FetchedPage, PlannerReply, PlannerSnapshot, ReasoningOutput};
use crate::io::config::{AgentConfig, RetryConfig};
use crate::io::evidence_store::EvidenceStore;
use crate::io::fetch::Fetcher;
use crate::io::retrieval::Retriever;
use crate::io::run_log::{RunLog, RunSummary, StepRecord};
use crate::io::search::Searcher;

/// URLs requested from the search collaborator per SEARCH.
pub const SEARCH_RESULTS: usize = 5;
/// Search results fetched per SEARCH.
pub const SEARCH_FETCH_FANOUT: usize = 2;
/// Consecutive no-progress actions that halt the run.
pub const STAGNATION_THRESHOLD: u32 = 3;
/// Confidence above which the goal counts as satisfied.
pub const SATISFACTION_THRESHOLD: f64 = 0.75;
const RECENT_ACTIONS: usize = 5;

/// External collaborators, injected at construction.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub planner: &'a dyn Planner,
    pub fetcher: &'a dyn Fetcher,
    pub searcher: &'a dyn Searcher,
    pub retriever: &'a dyn Retriever,
    pub reasoner: &'a dyn Reasoner,
}

/// Loop settings derived from [`AgentConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub max_steps: u32,
    pub limits: BudgetLimits,
    pub retry: RetryConfig,
    pub planner_cost_units: f64,
    pub reason_cost_units: f64,
}

impl AgentSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            limits: config.limits.clone(),
            retry: config.retry.clone(),
            planner_cost_units: config.llm.planner_cost_units,
            reason_cost_units: config.llm.reason_cost_units,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub halt_reason: HaltReason,
    pub steps_taken: u32,
    pub evidence: Vec<EvidenceRef>,
    /// Latest reasoning pass, if any ran.
    pub reasoning: Option<ReasoningOutput>,
    pub budget: ContextSnapshot,
}

pub struct ResearchAgent<'a> {
    state: GoalState,
    ctx: ExecutionContext,
    settings: AgentSettings,
    store: &'a EvidenceStore,
    collaborators: Collaborators<'a>,
    run_log: RunLog,
    visited_urls: HashSet<String>,
    previous_queries: HashSet<String>,
    last_actions: Vec<ActionType>,
    no_progress_steps: u32,
    reason_attempted: bool,
    last_reasoning: Option<ReasoningOutput>,
}

impl<'a> ResearchAgent<'a> {
    pub fn new(
        goal: &str,
        settings: AgentSettings,
        store: &'a EvidenceStore,
        collaborators: Collaborators<'a>,
        run_log: RunLog,
    ) -> Self {
        Self {
            state: GoalState::new(goal, settings.max_steps),
            ctx: ExecutionContext::new(settings.limits.clone()),
            settings,
            store,
            collaborators,
            run_log,
            visited_urls: HashSet::new(),
            previous_queries: HashSet::new(),
            last_actions: Vec::new(),
            no_progress_steps: 0,
            reason_attempted: false,
            last_reasoning: None,
        }
    }

    pub fn goal_state(&self) -> &GoalState {
        &self.state
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn no_progress_steps(&self) -> u32 {
        self.no_progress_steps
    }

    /// Drive the loop until a halt condition holds.
    ///
    /// Errors are infrastructure failures (evidence store, run log); every
    /// expected failure ends in a named halt reason instead.
    #[instrument(skip_all, fields(run_id = %self.run_log.run_id()))]
    pub fn run(&mut self) -> Result<RunOutcome> {
        info!(
            goal = %self.state.goal,
            steps_log = %self.run_log.steps_path().display(),
            "research run started"
        );
        while !self.state.halted() {
            self.step()?;
        }

        let halt_reason = self
            .state
            .halt_reason()
            .ok_or_else(|| anyhow!("run ended without a halt reason"))?;
        self.ctx.update_time();
        let outcome = RunOutcome {
            run_id: self.run_log.run_id().to_string(),
            halt_reason,
            steps_taken: self.state.step_count,
            evidence: self.state.evidence_summary.clone(),
            reasoning: self.last_reasoning.clone(),
            budget: self.ctx.snapshot(),
        };
        self.run_log.write_summary(&RunSummary {
            run_id: outcome.run_id.clone(),
            goal: self.state.goal.clone(),
            halt_reason,
            steps_taken: outcome.steps_taken,
            evidence: outcome.evidence.clone(),
            answer: outcome.reasoning.as_ref().map(|r| r.answer.clone()),
            confidence: outcome.reasoning.as_ref().map(|r| r.confidence),
            budget: outcome.budget.clone(),
        })?;
        info!(
            %halt_reason,
            steps = outcome.steps_taken,
            summary = %self.run_log.summary_path().display(),
            "research run halted"
        );
        Ok(outcome)
    }

    fn step(&mut self) -> Result<()> {
        if self.state.should_force_halt() {
            self.state.halt(HaltReason::MaxStepsReached);
            return self.log_step(None, false);
        }

        self.ctx.update_time();
        if self.ctx.limits_exceeded() {
            warn!(budget = ?self.ctx.snapshot(), "budget exhausted");
            self.state.halt(HaltReason::BudgetExhausted);
            return self.log_step(None, false);
        }

        let snapshot = self.snapshot();
        let forced = !self.state.evidence_summary.is_empty() && !self.reason_attempted;
        let (action, reply) = if forced {
            info!("forcing a reasoning pass over gathered evidence");
            (ActionType::Reason, None)
        } else {
            self.ctx.record_cost(self.settings.planner_cost_units);
            match self.consult_planner(&snapshot) {
                Some(planned) => planned,
                None => {
                    self.halt_after_failure(HaltReason::InvalidPlannerAction);
                    return self.log_step(None, false);
                }
            }
        };
        self.last_actions.push(action);

        match action {
            ActionType::Halt => {
                self.state.halt(HaltReason::PlannerHalted);
                return self.log_step(Some(action), forced);
            }
            ActionType::Search => {
                let query = reply.and_then(|r| r.query).unwrap_or_default();
                self.execute_search(&query)?;
            }
            ActionType::Fetch => {
                let url = reply.and_then(|r| r.url).unwrap_or_default();
                self.execute_fetch(&url)?;
            }
            ActionType::Reason => self.execute_reason()?,
        }

        self.state.increment_step();
        self.ctx.increment_step();

        if !self.state.halted() && self.no_progress_steps >= STAGNATION_THRESHOLD {
            warn!(no_progress_steps = self.no_progress_steps, "stagnation detected");
            self.state.halt(HaltReason::StagnationDetected);
        }
        self.log_step(Some(action), forced)
    }

    /// Ask the planner for an action. `None` means the reply cannot be trusted.
    fn consult_planner(
        &self,
        snapshot: &PlannerSnapshot,
    ) -> Option<(ActionType, Option<PlannerReply>)> {
        let reply = match self.collaborators.planner.plan(snapshot) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "planner failed");
                return None;
            }
        };
        match reply.action.parse::<ActionType>() {
            Ok(action) => {
                debug!(%action, "planner chose action");
                Some((action, Some(reply)))
            }
            Err(err) => {
                warn!(err = %err, "invalid planner action");
                None
            }
        }
    }

    /// Halt after a failed LLM call. A call that ran past the budget ends
    /// the run as [`HaltReason::BudgetExhausted`], not as untrusted output.
    fn halt_after_failure(&mut self, reason: HaltReason) {
        self.ctx.update_time();
        if self.ctx.limits_exceeded() {
            warn!(budget = ?self.ctx.snapshot(), "budget exhausted during llm call");
            self.state.halt(HaltReason::BudgetExhausted);
        } else {
            self.state.halt(reason);
        }
    }

    fn snapshot(&self) -> PlannerSnapshot {
        let recent_start = self.last_actions.len().saturating_sub(RECENT_ACTIONS);
        PlannerSnapshot {
            goal: self.state.goal.clone(),
            requirements: self.state.requirements.iter().cloned().collect(),
            covered_requirements: self.state.covered_requirements.iter().cloned().collect(),
            evidence_count: self.state.evidence_summary.len(),
            step_count: self.state.step_count,
            max_steps: self.state.max_steps,
            recent_actions: self.last_actions[recent_start..].to_vec(),
        }
    }

    fn execute_search(&mut self, query: &str) -> Result<()> {
        let normalized = query.trim().to_lowercase();
        if normalized.is_empty() {
            info!("empty search query");
            self.no_progress_steps += 1;
            return Ok(());
        }
        if !self.previous_queries.insert(normalized) {
            info!(query = %query.trim(), "duplicate query blocked");
            self.no_progress_steps += 1;
            return Ok(());
        }

        info!(query = %query.trim(), "search");
        let urls = self
            .collaborators
            .searcher
            .search(query.trim(), SEARCH_RESULTS);
        if urls.is_empty() {
            info!("no search results");
            self.no_progress_steps += 1;
            return Ok(());
        }

        for url in urls.iter().take(SEARCH_FETCH_FANOUT) {
            if self.state.halted() {
                break;
            }
            self.execute_fetch(url)?;
        }
        Ok(())
    }

    fn execute_fetch(&mut self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            info!("empty fetch url");
            self.no_progress_steps += 1;
            return Ok(());
        }
        if !self.visited_urls.insert(url.to_string()) {
            info!(%url, "url already visited, blocked");
            self.no_progress_steps += 1;
            return Ok(());
        }

        info!(%url, "fetch");
        match self.fetch_with_retry(url) {
            Some(page) => self.persist(url, &page),
            None => {
                self.no_progress_steps += 1;
                Ok(())
            }
        }
    }

    /// Fetch with retries driven by the retry policy. `None` means the URL was
    /// given up on (and possibly the run halted).
    ///
    /// A retry decision taken on the last allowed attempt
    /// (`retry.max_fetch_attempts`) gives up on the URL without recording a
    /// retry: only retries that actually happen count against `max_retries`.
    fn fetch_with_retry(&mut self, url: &str) -> Option<FetchedPage> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match self.collaborators.fetcher.fetch(url) {
                Ok(page) => return Some(page),
                Err(failure) => failure,
            };

            self.ctx.update_time();
            let decision = decide(&self.ctx, &failure);
            warn!(%url, attempt, %failure, ?decision, "fetch failed");

            if decision.is_retry() {
                if attempt >= self.settings.retry.max_fetch_attempts {
                    info!(%url, attempt, "fetch attempts exhausted");
                    return None;
                }
                self.ctx.record_retry(failure.failure_class());
                if decision == RetryDecision::RetryBackoff && !self.backoff(&failure, attempt) {
                    return None;
                }
                continue;
            }
            if decision == RetryDecision::HaltTask {
                self.state.halt(HaltReason::FetchHalted);
            } else {
                self.ctx.record_quarantine();
            }
            return None;
        }
    }

    /// Sleep before the next attempt. Returns false when no time budget remains.
    fn backoff(&self, failure: &FailureEvent, attempt: u32) -> bool {
        let Ok(remaining) = remaining_budget(self.ctx.deadline()) else {
            return false;
        };
        let delay = failure
            .retry_after_seconds()
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.settings.retry.backoff_for_attempt(attempt))
            .min(remaining);
        debug!(delay_ms = delay.as_millis() as u64, "backing off");
        thread::sleep(delay);
        true
    }

    /// Persist a fetched page, judge its integrity and record the verdict.
    fn persist(&mut self, url: &str, page: &FetchedPage) -> Result<()> {
        let evidence_id = self.store.write(page)?;
        self.ctx.record_evidence(page.body.len() as u64);

        let integrity = evaluate(&page.body);
        let (lifecycle, envelope) = integrate_integrity(&evidence_id, &integrity);
        // The envelope is durable before the state that depends on it.
        self.store.append_envelope(&evidence_id, &envelope)?;
        self.store.write_state(&evidence_id, lifecycle)?;
        if lifecycle == EvidenceState::QuarantinedLowIntegrity {
            self.ctx.record_quarantine();
        }
        info!(
            %evidence_id,
            %lifecycle,
            integrity_score = integrity.integrity_score,
            "evidence stored"
        );

        self.state.evidence_summary.push(EvidenceRef {
            evidence_id,
            source_url: url.to_string(),
        });
        self.no_progress_steps = 0;
        Ok(())
    }

    fn execute_reason(&mut self) -> Result<()> {
        self.reason_attempted = true;

        let blocks = self
            .collaborators
            .retriever
            .retrieve(&self.state.goal, self.store)?;
        if blocks.is_empty() {
            info!("no usable context");
            self.no_progress_steps += 1;
            return Ok(());
        }

        self.ctx.record_cost(self.settings.reason_cost_units);
        let output = match self.collaborators.reasoner.reason(&self.state.goal, &blocks) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "reasoner failed");
                self.halt_after_failure(HaltReason::InvalidReasoningOutput);
                return Ok(());
            }
        };

        let confidence = output.confidence;
        self.last_reasoning = Some(output);
        if confidence > SATISFACTION_THRESHOLD {
            info!(confidence, "goal satisfied");
            self.state.cover_all_requirements();
            self.state.halt(HaltReason::GoalSatisfied);
        } else {
            info!(confidence, "insufficient confidence");
            self.no_progress_steps += 1;
        }
        Ok(())
    }

    fn log_step(&self, action: Option<ActionType>, forced: bool) -> Result<()> {
        self.run_log.append_step(&StepRecord {
            run_id: self.run_log.run_id().to_string(),
            step: self.state.step_count,
            action,
            forced,
            no_progress_steps: self.no_progress_steps,
            evidence_count: self.state.evidence_summary.len(),
            halt_reason: self.state.halt_reason(),
            budget: self.ctx.snapshot(),
        })
    }
}
