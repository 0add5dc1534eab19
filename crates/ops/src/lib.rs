#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transaction orchestration for pkgd
//!
//! [`Engine`] is the entry point a client drives: one method per intent,
//! each running a single transaction from cache load to terminal outcome.
//! The engine owns the cache session and the cancellation gate; a
//! [`CancelHandle`] lets another task stop the transaction in flight.

mod context;
mod engine;
mod maintenance;
mod query;

pub use context::EngineBuilder;
pub use engine::{CancelHandle, Engine};
