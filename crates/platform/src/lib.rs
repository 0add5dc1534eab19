#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform layer for driving native package managers.
//!
//! This crate provides:
//! - Command building and supervised execution of native commit processes
//! - Parsing of the colon-delimited status channel those processes write
//! - Cooperative cancellation shared between a transaction and its canceller
//! - The exclusive system lock and filesystem timestamp helpers

pub mod cancel;
pub mod fs;
pub mod lock;
pub mod process;
pub mod status;

pub use cancel::{CancelState, CancellationGate};
pub use lock::{LockGuard, SystemLock};
pub use process::supervisor::{
    PollEvent, ProcessSupervisor, SupervisedProcess, SupervisorSettings, SupervisorState,
    STATUS_FD,
};
pub use process::PlatformCommand;
pub use status::{parse_status_line, MalformedStatus, StatusLine};
