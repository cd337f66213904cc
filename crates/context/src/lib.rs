//! Context-reduction engine.
//!
//! Decides when a conversation history has outgrown its budget and
//! shrinks it with one of three strategies: truncation (keep the newest
//! turns), sliding window (keep the newest messages under a token
//! budget), or LLM summarization (collapse old turns into a synthetic
//! system message). Summarization failures always degrade to truncation
//! — a request never fails because its summary did.

pub mod engine;
mod strategies;
mod summarize;

pub use engine::{apply_strategy, should_reduce, ReductionOutcome};
