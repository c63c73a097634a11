//! Per-run product logs under the configured run log directory.
//!
//! Each iteration appends one JSON line to `<run_id>.jsonl`; the final
//! outcome is written to `<run_id>.summary.json`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::core::budget::ContextSnapshot;
use crate::core::goal::{ActionType, EvidenceRef, HaltReason};

/// One iteration of the research loop.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub run_id: String,
    pub step: u32,
    pub action: Option<ActionType>,
    /// True when the action was forced rather than chosen by the planner.
    pub forced: bool,
    pub no_progress_steps: u32,
    pub evidence_count: usize,
    pub halt_reason: Option<HaltReason>,
    pub budget: ContextSnapshot,
}

/// Final outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub goal: String,
    pub halt_reason: HaltReason,
    pub steps_taken: u32,
    pub evidence: Vec<EvidenceRef>,
    pub answer: Option<String>,
    pub confidence: Option<f64>,
    pub budget: ContextSnapshot,
}

#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: String,
    steps_path: PathBuf,
    summary_path: PathBuf,
}

impl RunLog {
    pub fn new(dir: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create run log dir {}", dir.display()))?;
        Ok(Self {
            run_id: run_id.to_string(),
            steps_path: dir.join(format!("{run_id}.jsonl")),
            summary_path: dir.join(format!("{run_id}.summary.json")),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn steps_path(&self) -> &Path {
        &self.steps_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    pub fn append_step(&self, record: &StepRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serialize step record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.steps_path)
            .with_context(|| format!("open run log {}", self.steps_path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append run log {}", self.steps_path.display()))?;
        debug!(step = record.step, action = ?record.action, "step logged");
        Ok(())
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(summary).context("serialize run summary")?;
        buf.push('\n');
        fs::write(&self.summary_path, buf)
            .with_context(|| format!("write {}", self.summary_path.display()))
    }
}

/// Run id derived from the current UTC time, e.g. `run-20250101_120000`.
pub fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S"))
}
