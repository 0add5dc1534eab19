//! Client-visible transaction notifications

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed set of statuses a transaction reports while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    Query,
    DepResolve,
    Download,
    Install,
    Remove,
    Update,
    Cleanup,
    SigCheck,
    TestCommit,
    Cancel,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::DepResolve => "dep-resolve",
            Self::Download => "download",
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Cleanup => "cleanup",
            Self::SigCheck => "sig-check",
            Self::TestCommit => "test-commit",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Per-package notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageInfo {
    Installed,
    Available,
    Installing,
    Removing,
    Updating,
    Downloading,
    Obsoleting,
}

impl fmt::Display for PackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::Available => "available",
            Self::Installing => "installing",
            Self::Removing => "removing",
            Self::Updating => "updating",
            Self::Downloading => "downloading",
            Self::Obsoleting => "obsoleting",
        };
        f.write_str(s)
    }
}

/// Global percentage, or the absence of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Percentage {
    Value(u8),
    Indeterminate,
}

impl Percentage {
    /// Clamp into 0..=100
    #[must_use]
    pub fn value(v: u8) -> Self {
        Self::Value(v.min(100))
    }

    #[must_use]
    pub fn as_value(self) -> Option<u8> {
        match self {
            Self::Value(v) => Some(v),
            Self::Indeterminate => None,
        }
    }
}

/// Scope of the restart a transaction requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartKind {
    Application,
    Session,
    System,
}

/// Informational messages attached to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Configuration files were kept at their current version during apply
    ConfigFilesChanged,
    /// Output of the native tool that is worth showing after a failure
    BackendError,
}

impl fmt::Display for RestartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Application => "application",
            Self::Session => "session",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConfigFilesChanged => "config files kept",
            Self::BackendError => "backend output",
        };
        f.write_str(s)
    }
}
