//! Package cache and transaction-building error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheError {
    #[error("package cache could not be opened: {message}")]
    OpenFailed { message: String },

    #[error("package cache is not open")]
    NotOpen,

    #[error("there are {count} broken dependencies on this system")]
    BrokenDependencies { count: usize },

    #[error("package not found: {package}")]
    PackageNotFound { package: String },

    #[error("package is not installed: {package}")]
    NotInstalled { package: String },

    #[error("package is already installed: {package}")]
    AlreadyInstalled { package: String },

    #[error("package {package} cannot be removed, it is essential to the system")]
    EssentialPackage { package: String },

    #[error("resolution requires removing other packages: {packages}")]
    ImplicitRemoval { packages: String },

    #[error("packages would be left in an inconsistent state: {packages}")]
    AmbiguousResolution { packages: String },

    #[error("package {package} could not be marked: {message}")]
    MarkFailed { package: String, message: String },

    #[error("package {package} appears with conflicting actions")]
    ConflictingActions { package: String },

    #[error("other packages depend on {package}")]
    HasDependents { package: String },

    #[error("invalid package id: {id}")]
    InvalidPackageId { id: String },
}

impl UserFacingError for CacheError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::BrokenDependencies { .. } | Self::AmbiguousResolution { .. } => Some(
                "Please use an advanced package manager e.g. Synaptic or aptitude to resolve this situation.",
            ),
            Self::ImplicitRemoval { .. } => {
                Some("Remove the conflicting packages first, then retry the installation.")
            }
            Self::OpenFailed { .. } => Some("Refresh the package cache and retry."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::OpenFailed { .. } | Self::NotOpen => "cache.open_failed",
            Self::BrokenDependencies { .. } => "cache.broken_dependencies",
            Self::PackageNotFound { .. } | Self::InvalidPackageId { .. } => "cache.not_found",
            Self::NotInstalled { .. } => "cache.not_installed",
            Self::AlreadyInstalled { .. } => "cache.already_installed",
            Self::EssentialPackage { .. } => "cache.essential_package",
            Self::ImplicitRemoval { .. } | Self::HasDependents { .. } => "cache.implicit_removal",
            Self::AmbiguousResolution { .. } => "cache.ambiguous_resolution",
            Self::MarkFailed { .. } => "cache.mark_failed",
            Self::ConflictingActions { .. } => "cache.conflicting_actions",
        })
    }
}
