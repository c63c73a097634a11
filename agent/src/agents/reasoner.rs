//! Grounded reasoner: answers from context blocks and verifies every claim.

use std::cell::Cell;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::{ContextBlock, DraftAnswer, ReasoningOutput};
use crate::core::verifier::verify_claims;
use crate::io::executor::{ExecRequest, Executor, execute_and_load_json};
use crate::io::prompt::PromptBuilder;

use super::{LlmAgentConfig, write_output_schema};

const REASONER_OUTPUT_SCHEMA: &str = include_str!("../../schemas/reasoner_output.schema.json");

/// Question plus context blocks to a verified answer.
///
/// With zero blocks, implementations must return
/// [`ReasoningOutput::INSUFFICIENT_EVIDENCE`] without any external call.
pub trait Reasoner {
    fn reason(&self, question: &str, blocks: &[ContextBlock]) -> Result<ReasoningOutput>;
}

#[derive(Debug)]
pub struct GroundedReasoner<E> {
    executor: E,
    schema_path: PathBuf,
    config: LlmAgentConfig,
    calls: Cell<u32>,
}

impl<E: Executor> GroundedReasoner<E> {
    pub fn new(executor: E, config: LlmAgentConfig) -> Self {
        Self {
            executor,
            schema_path: config.work_dir.join("reasoner_output.schema.json"),
            config,
            calls: Cell::new(0),
        }
    }
}

impl<E: Executor> Reasoner for GroundedReasoner<E> {
    #[instrument(skip_all, fields(blocks = blocks.len()))]
    fn reason(&self, question: &str, blocks: &[ContextBlock]) -> Result<ReasoningOutput> {
        if blocks.is_empty() {
            return Ok(ReasoningOutput::insufficient(
                ReasoningOutput::INSUFFICIENT_EVIDENCE,
            ));
        }

        write_output_schema(&self.schema_path, REASONER_OUTPUT_SCHEMA)?;
        let call = self.calls.get() + 1;
        self.calls.set(call);

        let prompt =
            PromptBuilder::new(self.config.prompt_budget_bytes).build_reasoner(question, blocks)?;
        let call_dir = self.config.work_dir.join("reasoner");
        let request = ExecRequest {
            workdir: self.config.work_dir.clone(),
            prompt,
            output_schema_path: self.schema_path.clone(),
            output_path: call_dir.join(format!("call-{call}.json")),
            executor_log_path: call_dir.join(format!("call-{call}.log")),
            timeout: self.config.call_timeout()?,
            output_limit_bytes: self.config.output_limit_bytes,
        };

        let draft: DraftAnswer = execute_and_load_json(&self.executor, &request)?;
        let proposed = draft.claims.len();
        let output = verify_claims(&draft, blocks);
        debug!(
            proposed,
            verified = output.claims.len(),
            confidence = output.confidence,
            "reasoning verified"
        );
        Ok(output)
    }
}
