//! The bounded failure taxonomy reported to clients

use std::fmt;

/// Every failure the engine can surface maps onto exactly one of these kinds.
///
/// `MalformedStatus` exists so that the classifier can name what it absorbs;
/// it is never the kind of a terminal outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ErrorKind {
    SpawnError,
    CacheOpenError,
    DependencyResolutionFailed,
    PackageNotFound,
    PackageNotInstalled,
    PackageAlreadyInstalled,
    EssentialPackageProtected,
    LockUnavailable,
    DownloadFailed,
    Killed,
    SignatureFailed,
    VerificationFailed,
    MalformedStatus,
    Internal,
}

impl ErrorKind {
    /// Stable identifier used on the client protocol.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpawnError => "spawn-error",
            Self::CacheOpenError => "no-cache",
            Self::DependencyResolutionFailed => "dep-resolution-failed",
            Self::PackageNotFound => "package-not-found",
            Self::PackageNotInstalled => "package-not-installed",
            Self::PackageAlreadyInstalled => "package-already-installed",
            Self::EssentialPackageProtected => "cannot-remove-system-package",
            Self::LockUnavailable => "cannot-get-lock",
            Self::DownloadFailed => "package-download-failed",
            Self::Killed => "transaction-killed",
            Self::SignatureFailed => "bad-gpg-signature",
            Self::VerificationFailed => "verification-failed",
            Self::MalformedStatus => "malformed-status",
            Self::Internal => "internal-error",
        }
    }

    /// Whether the failure leaves the system untouched (nothing was committed).
    #[must_use]
    pub fn is_pre_commit(self) -> bool {
        matches!(
            self,
            Self::LockUnavailable
                | Self::PackageNotFound
                | Self::PackageNotInstalled
                | Self::PackageAlreadyInstalled
                | Self::EssentialPackageProtected
                | Self::DependencyResolutionFailed
                | Self::CacheOpenError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
