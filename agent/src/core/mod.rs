//! Deterministic, pure logic shared by the research agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod chunker;
pub mod failure;
pub mod gate;
pub mod goal;
pub mod integrity;
pub mod lifecycle;
pub mod retry;
pub mod robots;
pub mod text;
pub mod types;
pub mod validators;
pub mod verifier;
