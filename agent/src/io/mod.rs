//! Side-effecting collaborators: filesystem, network, and process execution.

pub mod config;
pub mod evidence_store;
pub mod executor;
pub mod fetch;
pub mod process;
pub mod prompt;
pub mod retrieval;
pub mod run_log;
pub mod search;
