//! Redis-backed store provider.
//!
//! Lets several gateway processes share tier configuration and counters. Every
//! counter mutation is a Lua script, so the version check and the write of a
//! conditional update execute atomically on the server.
//!
//! # Requirements
//!
//! - **Redis:** >= 6.2.0 (multi-field `HSET`)
//! - **Runtime:** Tokio (`redis-tokio` feature)

mod common;
pub use common::*;

mod redis_config_store;
pub use redis_config_store::*;

mod redis_counter_store;
pub use redis_counter_store::*;

mod redis_store_provider;
pub use redis_store_provider::*;
