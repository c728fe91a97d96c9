#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod gate;
pub use gate::*;

mod engine;
pub use engine::*;

mod resolver;
pub use resolver::*;

mod scheduler;
pub use scheduler::*;

mod store;
pub use store::*;

mod forwarder;
pub use forwarder::*;

pub mod local;
pub use local::*;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;
#[cfg(feature = "http")]
pub use http::*;

#[cfg(feature = "redis-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
pub mod redis;
#[cfg(feature = "redis-tokio")]
pub use redis::*;

mod error;
pub use error::*;

mod common;
pub use common::*;

mod runtime;

#[cfg(test)]
mod tests;
