//! Upstream provider routing for ModelRelay.
//!
//! [`registry::ProviderRegistry`] holds one configured HTTP handle per
//! provider; [`router::ModelRouter`] resolves namespaced display names
//! to `(provider, actual model, context budget)` and performs buffered
//! or streaming dispatch in the OpenAI chat-completions wire format.

pub mod registry;
pub mod router;
pub mod sse;
mod util;
pub mod wire;

pub use registry::{ProviderHandle, ProviderRegistry};
pub use router::{ModelRouter, Resolution, SummaryClient};
pub use wire::{ChatCompletion, ChatCompletionRequest, RequestParams, WireMessage};
