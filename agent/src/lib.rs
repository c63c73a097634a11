//! Provenance-gated autonomous research agent.
//!
//! A bounded loop asks an untrusted planner for the next action, gathers web
//! evidence, and answers only from claims verified against stored evidence.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (budget, retry policy, integrity,
//!   lifecycle, verification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (filesystem, HTTP, processes).
//!   Each sits behind a trait so tests can script it.
//! - **[`agents`]**: Language-model backed planner and reasoner.
//!
//! [`research`] drives the loop and owns all mutable run state.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod research;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
