#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the pkgd transaction engine
//!
//! This crate provides the vocabulary shared by every other crate: package
//! identity, change sets, transaction status and terminal outcomes.

pub mod change;
pub mod outcome;
pub mod package;
pub mod role;
pub mod status;

pub use change::{Action, ChangeSet};
pub use outcome::TransactionOutcome;
pub use package::PackageRef;
pub use role::{Filter, Role};
pub use status::{MessageKind, PackageInfo, Percentage, RestartKind, TransactionStatus};

use serde::{Deserialize, Serialize};

/// Native package manager flavour driven by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// APT cache with dpkg as the native committer
    #[default]
    Apt,
    /// Yum metadata with rpm as the native committer
    Yum,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apt => write!(f, "apt"),
            Self::Yum => write!(f, "yum"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "apt" | "dpkg" => Ok(Self::Apt),
            "yum" | "rpm" => Ok(Self::Yum),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    #[default]
    Tty,
    Json,
}
