//! Language-model backed collaborators: the planner and the grounded reasoner.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::core::budget::remaining_budget;
use crate::io::config::LlmConfig;

pub mod planner;
pub mod reasoner;

/// Shared settings for executor-backed agents.
#[derive(Debug, Clone)]
pub struct LlmAgentConfig {
    /// Directory receiving schemas, outputs and executor logs.
    pub work_dir: PathBuf,
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    /// Per-call ceiling.
    pub timeout: Duration,
    /// Run deadline; calls never outlive it.
    pub deadline: Instant,
}

impl LlmAgentConfig {
    pub fn from_config(llm: &LlmConfig, work_dir: &Path, deadline: Instant) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            prompt_budget_bytes: llm.prompt_budget_bytes,
            output_limit_bytes: llm.output_limit_bytes,
            timeout: Duration::from_secs(llm.timeout_secs),
            deadline,
        }
    }

    fn call_timeout(&self) -> Result<Duration> {
        Ok(remaining_budget(self.deadline)?.min(self.timeout))
    }
}

pub(crate) fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}
