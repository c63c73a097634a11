//! Executor abstraction for language-model invocation.
//!
//! The [`Executor`] trait decouples the planner and reasoner from the actual
//! model backend (an external CLI such as `codex exec`). Tests use scripted
//! executors that write predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Parameters for an executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the executor process.
    pub workdir: PathBuf,
    /// Prompt text fed on stdin.
    pub prompt: String,
    /// JSON Schema constraining the model's final message.
    pub output_schema_path: PathBuf,
    /// Where the executor must write its final message.
    pub output_path: PathBuf,
    /// Where the stdout/stderr transcript is written.
    pub executor_log_path: PathBuf,
    pub timeout: Duration,
    /// Truncate the transcript beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over model execution backends.
pub trait Executor {
    /// Run the model with the given request. Must write output to `request.output_path`.
    fn exec(&self, request: &ExecRequest) -> Result<()>;
}

/// Executor that spawns a configured CLI command.
///
/// The command receives `--output-schema <path> --output-last-message <path> -`
/// and reads the prompt from stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("executor command must be non-empty"));
        }
        Ok(Self { command })
    }

    fn program(&self) -> &str {
        &self.command[0]
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(program = %self.program(), timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting executor");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let mut cmd = Command::new(self.program());
        cmd.args(&self.command[1..])
            .arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.program()))?;

        write_executor_log(
            &request.executor_log_path,
            &output.transcript(),
            request.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "executor timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.program(),
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "executor failed");
            return Err(anyhow!(
                "{} failed with status {:?}",
                self.program(),
                output.status.code()
            ));
        }

        debug!("executor completed successfully");
        Ok(())
    }
}

/// Execute the model, validate its output against the request schema and
/// decode it as `T`.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn execute_and_load_json<E: Executor + ?Sized, T: DeserializeOwned>(
    executor: &E,
    request: &ExecRequest,
) -> Result<T> {
    // A stale file from an earlier call must not be mistaken for fresh output.
    if request.output_path.exists() {
        fs::remove_file(&request.output_path)
            .with_context(|| format!("remove stale output {}", request.output_path.display()))?;
    }
    executor.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing executor output {}",
            request.output_path.display()
        ));
    }

    let contents = fs::read_to_string(&request.output_path)
        .with_context(|| format!("read executor output {}", request.output_path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", request.output_path.display()))?;
    validate_against_schema(&request.output_schema_path, &value)?;
    let decoded = serde_json::from_value(value)
        .with_context(|| format!("decode {}", request.output_path.display()))?;
    Ok(decoded)
}

fn validate_against_schema(schema_path: &Path, instance: &Value) -> Result<()> {
    let schema_contents = fs::read_to_string(schema_path)
        .with_context(|| format!("read schema {}", schema_path.display()))?;
    let schema_value: Value = serde_json::from_str(&schema_contents)
        .with_context(|| format!("parse schema {}", schema_path.display()))?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(instance) {
        let messages = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "executor output schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn write_executor_log(path: &Path, transcript: &str, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create executor log dir {}", parent.display()))?;
    }
    let contents = if transcript.len() > output_limit {
        let mut cut = output_limit;
        while !transcript.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}\n[truncated {} bytes]\n",
            &transcript[..cut],
            transcript.len() - cut
        )
    } else {
        transcript.to_string()
    };
    fs::write(path, contents).with_context(|| format!("write executor log {}", path.display()))
}
