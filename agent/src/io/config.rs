//! Agent configuration stored in `research-agent.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::BudgetLimits;

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE_NAME: &str = "research-agent.toml";

/// Agent configuration (TOML).
///
/// Missing fields default, so an empty file and a missing file behave the same.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Root of the evidence store (`blobs/` and `meta/` live beneath it).
    pub evidence_root: PathBuf,

    /// Directory for per-run JSONL logs and summaries.
    pub run_log_dir: PathBuf,

    /// Goal-state step ceiling.
    pub max_steps: u32,

    pub limits: BudgetLimits,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per URL, including the first.
    pub max_fetch_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_fetch_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given 1-based attempt, capped at `backoff_max_ms`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let millis = self.backoff_base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(millis.min(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Response bodies are truncated beyond this many bytes.
    pub max_body_bytes: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: "research-agent/0.1 (+provenance-gated)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Executor argv. Must accept `--output-schema`, `--output-last-message`
    /// and a prompt on stdin (`-`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    pub planner_cost_units: f64,
    pub reason_cost_units: f64,
    pub prompt_budget_bytes: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
            ],
            timeout_secs: 120,
            output_limit_bytes: 100_000,
            planner_cost_units: 0.05,
            reason_cost_units: 0.25,
            prompt_budget_bytes: 40_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            evidence_root: PathBuf::from("./evidence_data"),
            run_log_dir: PathBuf::from("./agent_runs"),
            max_steps: 10,
            limits: BudgetLimits::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.limits.max_steps == 0 {
            return Err(anyhow!("limits.max_steps must be > 0"));
        }
        if self.limits.max_elapsed_time_ms == 0 {
            return Err(anyhow!("limits.max_elapsed_time_ms must be > 0"));
        }
        if !self.limits.max_cost_units.is_finite() || self.limits.max_cost_units < 0.0 {
            return Err(anyhow!("limits.max_cost_units must be a non-negative number"));
        }
        if self.retry.max_fetch_attempts == 0 {
            return Err(anyhow!("retry.max_fetch_attempts must be > 0"));
        }
        if self.retry.backoff_max_ms < self.retry.backoff_base_ms {
            return Err(anyhow!("retry.backoff_max_ms must be >= retry.backoff_base_ms"));
        }
        if self.http.connect_timeout_ms == 0 || self.http.read_timeout_ms == 0 {
            return Err(anyhow!("http timeouts must be > 0"));
        }
        if self.http.max_body_bytes == 0 {
            return Err(anyhow!("http.max_body_bytes must be > 0"));
        }
        if self.llm.command.is_empty() || self.llm.command[0].trim().is_empty() {
            return Err(anyhow!("llm.command must be a non-empty array"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.llm.output_limit_bytes == 0 {
            return Err(anyhow!("llm.output_limit_bytes must be > 0"));
        }
        for (name, value) in [
            ("llm.planner_cost_units", self.llm.planner_cost_units),
            ("llm.reason_cost_units", self.llm.reason_cost_units),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("{name} must be a non-negative number"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let mut cfg = AgentConfig::default();
        cfg.max_steps = 4;
        cfg.limits.max_cost_units = 2.5;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "max_steps = 3\n[limits]\nmax_retries = 7\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_steps, 3);
        assert_eq!(cfg.limits.max_retries, 7);
        assert_eq!(cfg.limits.max_steps, BudgetLimits::default().max_steps);
        assert_eq!(cfg.retry, RetryConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[llm]\ncommand = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("llm.command"));

        let mut cfg = AgentConfig::default();
        cfg.llm.reason_cost_units = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(500));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(1_000));
        assert_eq!(retry.backoff_for_attempt(3), Duration::from_millis(2_000));
        assert_eq!(retry.backoff_for_attempt(10), Duration::from_millis(8_000));
    }
}
