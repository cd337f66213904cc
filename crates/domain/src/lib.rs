//! Shared domain types for ModelRelay: the resolved configuration model,
//! conversation/session data model, error taxonomy, trace events, and
//! streaming primitives. Every other crate depends on this one.

pub mod chat;
pub mod config;
pub mod error;
pub mod stream;
pub mod trace;
