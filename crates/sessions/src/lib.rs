//! Session persistence for ModelRelay.
//!
//! The [`store::SessionStore`] trait is the contract; two backends are
//! provided — an in-process map with a TTL sweep ([`memory`]) and a
//! Redis/Valkey client with native key expiry ([`redis_store`]). The
//! backend is chosen once at startup; dispatch is by construction-time
//! binding, not runtime type inspection.

pub mod memory;
pub mod redis_store;
pub mod session_key;
pub mod store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;
pub use session_key::SessionKeyPolicy;
pub use store::SessionStore;
