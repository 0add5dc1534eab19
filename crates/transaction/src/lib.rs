#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transaction building and execution for pkgd
//!
//! [`TransactionBuilder`] turns requested marks into a policy-checked
//! [`pkgd_types::ChangeSet`]. [`CommitExecutor`] takes the system lock,
//! fetches and checks artifacts, applies them through a supervised native
//! command and verifies the result. [`ErrorClassifier`] decides what every
//! failure means for the transaction's outcome.

mod builder;
mod classify;
mod executor;
pub mod native;
mod verify;

pub use builder::TransactionBuilder;
pub use classify::{Classification, ErrorClassifier, Recovery};
pub use executor::{Artifact, CommitExecutor, CommitSettings, FetchItem};
pub use native::{AptBackend, ApplyStep, NativeBackend, YumBackend};
pub use verify::verify_changes;

/// Phase names shared by the executor and the engine's phase plans
pub mod phase {
    pub const CACHE: &str = "cache";
    pub const FETCH: &str = "fetch";
    pub const APPLY: &str = "apply";
    pub const VERIFY: &str = "verify";
    pub const REOPEN: &str = "reopen";
    pub const COPY: &str = "copy";
    pub const QUERY: &str = "query";
}
