//! Integration tests for error types

#[cfg(test)]
mod tests {
    use pkgd_errors::*;

    #[test]
    fn test_error_conversion() {
        let err: Error = CacheError::EssentialPackage {
            package: "libc6".into(),
        }
        .into();
        assert!(matches!(err, Error::Cache(_)));
        assert_eq!(err.kind(), ErrorKind::EssentialPackageProtected);
    }

    #[test]
    fn test_error_display() {
        let err = TransactionError::VerificationFailed {
            package: "foo".into(),
            expected: "installed".into(),
        };
        assert_eq!(err.to_string(), "foo was not installed");
    }

    #[test]
    fn test_kind_mapping() {
        let cases: Vec<(Error, ErrorKind)> = vec![
            (
                SupervisorError::SpawnFailed {
                    command: "dpkg".into(),
                    message: "not found".into(),
                }
                .into(),
                ErrorKind::SpawnError,
            ),
            (
                SupervisorError::Killed {
                    timeout_secs: 600,
                    output: String::new(),
                }
                .into(),
                ErrorKind::Killed,
            ),
            (
                CacheError::BrokenDependencies { count: 2 }.into(),
                ErrorKind::DependencyResolutionFailed,
            ),
            (
                CacheError::ImplicitRemoval {
                    packages: "bar".into(),
                }
                .into(),
                ErrorKind::DependencyResolutionFailed,
            ),
            (
                CacheError::NotInstalled {
                    package: "foo".into(),
                }
                .into(),
                ErrorKind::PackageNotInstalled,
            ),
            (
                TransactionError::LockUnavailable {
                    path: "/var/lib/dpkg/lock".into(),
                    message: "held".into(),
                }
                .into(),
                ErrorKind::LockUnavailable,
            ),
            (
                NetworkError::Timeout {
                    url: "http://mirror".into(),
                }
                .into(),
                ErrorKind::DownloadFailed,
            ),
            (
                NetworkError::ChecksumMismatch {
                    url: "http://mirror/foo.deb".into(),
                    expected: "aa".into(),
                    actual: "bb".into(),
                }
                .into(),
                ErrorKind::SignatureFailed,
            ),
            (Error::internal("boom"), ErrorKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_only_downloads_are_retryable() {
        let download: Error = TransactionError::DownloadFailed {
            message: "404".into(),
        }
        .into();
        assert!(download.is_retryable());

        let lock: Error = TransactionError::LockUnavailable {
            path: "/tmp/lock".into(),
            message: "held".into(),
        }
        .into();
        assert!(!lock.is_retryable());
        assert!(lock.user_hint().is_some());
    }

    #[test]
    fn test_cancellation_detection() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::from(NetworkError::Cancelled).is_cancelled());
        assert!(!Error::internal("x").is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
        assert_eq!(err.user_code(), Some("error.io"));
    }

    #[test]
    fn test_kind_protocol_names() {
        assert_eq!(ErrorKind::LockUnavailable.as_str(), "cannot-get-lock");
        assert_eq!(
            ErrorKind::DependencyResolutionFailed.to_string(),
            "dep-resolution-failed"
        );
        assert!(ErrorKind::PackageNotFound.is_pre_commit());
        assert!(!ErrorKind::Killed.is_pre_commit());
    }
}
