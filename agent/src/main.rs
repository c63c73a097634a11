//! Provenance-gated autonomous research agent CLI.
//!
//! Runs one bounded research loop for the given goal, persisting evidence and
//! a run log, and prints the halt reason and step count.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use research_agent::agents::LlmAgentConfig;
use research_agent::agents::planner::LlmPlanner;
use research_agent::agents::reasoner::GroundedReasoner;
use research_agent::exit_codes;
use research_agent::io::config::{CONFIG_FILE_NAME, load_config, write_config};
use research_agent::io::evidence_store::EvidenceStore;
use research_agent::io::executor::CommandExecutor;
use research_agent::io::fetch::HttpFetcher;
use research_agent::io::retrieval::EvidenceRetriever;
use research_agent::io::run_log::{RunLog, generate_run_id};
use research_agent::io::search::DuckDuckGoSearch;
use research_agent::logging;
use research_agent::research::{AgentSettings, Collaborators, ResearchAgent, RunOutcome};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "research-agent",
    version,
    about = "Provenance-gated autonomous research agent"
)]
struct Cli {
    /// Research goal in natural language.
    #[arg(long)]
    goal: String,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(&cli.goal) {
        Ok(outcome) => {
            println!("halt_reason: {}", outcome.halt_reason);
            println!("steps_taken: {}", outcome.steps_taken);
            std::process::exit(exit_codes::for_halt_reason(outcome.halt_reason));
        }
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(goal: &str) -> Result<RunOutcome> {
    let config = load_config(Path::new(CONFIG_FILE_NAME))?;
    let store = EvidenceStore::open(&config.evidence_root)?;
    let run_id = generate_run_id();
    let run_log = RunLog::new(&config.run_log_dir, &run_id)?;
    let work_dir = config.run_log_dir.join(&run_id);
    // Effective config next to the run's artifacts, for audit.
    write_config(&work_dir.join(CONFIG_FILE_NAME), &config).context("record run config")?;
    info!(%run_id, work_dir = %work_dir.display(), "run initialized");

    let deadline = Instant::now() + Duration::from_millis(config.limits.max_elapsed_time_ms);
    let llm_config = LlmAgentConfig::from_config(&config.llm, &work_dir, deadline);
    let executor = CommandExecutor::new(config.llm.command.clone()).context("llm executor")?;
    let planner = LlmPlanner::new(executor.clone(), llm_config.clone());
    let reasoner = GroundedReasoner::new(executor, llm_config);
    let fetcher = HttpFetcher::new(&config.http);
    let searcher = DuckDuckGoSearch::new(&config.http);
    let retriever = EvidenceRetriever;

    let collaborators = Collaborators {
        planner: &planner,
        fetcher: &fetcher,
        searcher: &searcher,
        retriever: &retriever,
        reasoner: &reasoner,
    };
    let mut agent = ResearchAgent::new(
        goal,
        AgentSettings::from_config(&config),
        &store,
        collaborators,
        run_log,
    );
    agent.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_goal() {
        let cli = Cli::parse_from(["research-agent", "--goal", "how does rust prevent data races"]);
        assert_eq!(cli.goal, "how does rust prevent data races");
    }

    #[test]
    fn goal_is_required() {
        assert!(Cli::try_parse_from(["research-agent"]).is_err());
    }
}
