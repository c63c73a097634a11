//! Goal state, action types and halt reasons for the research loop.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Actions the loop can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Search,
    Fetch,
    Reason,
    Halt,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Search => "SEARCH",
            ActionType::Fetch => "FETCH",
            ActionType::Reason => "REASON",
            ActionType::Halt => "HALT",
        }
    }
}

impl FromStr for ActionType {
    type Err = anyhow::Error;

    /// Exact, case-sensitive match; planner output is untrusted.
    fn from_str(value: &str) -> Result<Self> {
        match value {
            "SEARCH" => Ok(ActionType::Search),
            "FETCH" => Ok(ActionType::Fetch),
            "REASON" => Ok(ActionType::Reason),
            "HALT" => Ok(ActionType::Halt),
            other => Err(anyhow!("unknown action '{other}'")),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    MaxStepsReached,
    BudgetExhausted,
    InvalidPlannerAction,
    PlannerHalted,
    GoalSatisfied,
    StagnationDetected,
    FetchHalted,
    InvalidReasoningOutput,
}

impl HaltReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HaltReason::MaxStepsReached => "MAX_STEPS_REACHED",
            HaltReason::BudgetExhausted => "BUDGET_EXHAUSTED",
            HaltReason::InvalidPlannerAction => "INVALID_PLANNER_ACTION",
            HaltReason::PlannerHalted => "PLANNER_HALTED",
            HaltReason::GoalSatisfied => "GOAL_SATISFIED",
            HaltReason::StagnationDetected => "STAGNATION_DETECTED",
            HaltReason::FetchHalted => "FETCH_HALTED",
            HaltReason::InvalidReasoningOutput => "INVALID_REASONING_OUTPUT",
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted evidence record gathered during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub evidence_id: String,
    pub source_url: String,
}

/// Goal, requirement coverage and halt status of a run.
///
/// The run is halted exactly when `halt_reason` is set, so a halted state
/// without a reason cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalState {
    pub goal: String,
    pub requirements: BTreeSet<String>,
    pub covered_requirements: BTreeSet<String>,
    pub evidence_summary: Vec<EvidenceRef>,
    pub step_count: u32,
    pub max_steps: u32,
    halt_reason: Option<HaltReason>,
}

impl GoalState {
    /// New state whose single requirement is the goal itself.
    pub fn new(goal: &str, max_steps: u32) -> Self {
        Self {
            goal: goal.to_string(),
            requirements: BTreeSet::from([goal.to_string()]),
            covered_requirements: BTreeSet::new(),
            evidence_summary: Vec::new(),
            step_count: 0,
            max_steps,
            halt_reason: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.covered_requirements == self.requirements
    }

    pub fn increment_step(&mut self) {
        self.step_count += 1;
    }

    pub fn should_force_halt(&self) -> bool {
        self.step_count >= self.max_steps
    }

    pub fn halted(&self) -> bool {
        self.halt_reason.is_some()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt_reason
    }

    /// Halt the run. The first reason wins; later calls are ignored.
    pub fn halt(&mut self, reason: HaltReason) {
        if self.halt_reason.is_none() {
            self.halt_reason = Some(reason);
        }
    }

    pub fn cover_all_requirements(&mut self) {
        self.covered_requirements = self.requirements.clone();
    }
}
