//! Planner agent: picks the next research action from a run snapshot.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::{PlannerReply, PlannerSnapshot};
use crate::io::executor::{ExecRequest, Executor, execute_and_load_json};
use crate::io::prompt::PromptBuilder;

use super::{LlmAgentConfig, write_output_schema};

const PLANNER_OUTPUT_SCHEMA: &str = include_str!("../../schemas/planner_output.schema.json");

/// Advisory source of the next action. Replies are untrusted.
pub trait Planner {
    fn plan(&self, snapshot: &PlannerSnapshot) -> Result<PlannerReply>;
}

/// Planner backed by an [`Executor`] with schema-constrained output.
#[derive(Debug, Clone)]
pub struct LlmPlanner<E> {
    executor: E,
    schema_path: PathBuf,
    config: LlmAgentConfig,
}

impl<E: Executor> LlmPlanner<E> {
    pub fn new(executor: E, config: LlmAgentConfig) -> Self {
        Self {
            executor,
            schema_path: config.work_dir.join("planner_output.schema.json"),
            config,
        }
    }
}

impl<E: Executor> Planner for LlmPlanner<E> {
    #[instrument(skip_all, fields(step = snapshot.step_count))]
    fn plan(&self, snapshot: &PlannerSnapshot) -> Result<PlannerReply> {
        write_output_schema(&self.schema_path, PLANNER_OUTPUT_SCHEMA)?;

        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes).build_planner(snapshot)?;
        let call_dir = self.config.work_dir.join("planner");
        let request = ExecRequest {
            workdir: self.config.work_dir.clone(),
            prompt,
            output_schema_path: self.schema_path.clone(),
            output_path: call_dir.join(format!("step-{}.json", snapshot.step_count)),
            executor_log_path: call_dir.join(format!("step-{}.log", snapshot.step_count)),
            timeout: self.config.call_timeout()?,
            output_limit_bytes: self.config.output_limit_bytes,
        };

        let reply: PlannerReply = execute_and_load_json(&self.executor, &request)?;
        debug!(action = %reply.action, "planner replied");
        Ok(reply)
    }
}
