//! Integration tests for types

#[cfg(test)]
mod tests {
    use pkgd_errors::ErrorKind;
    use pkgd_types::*;

    #[test]
    fn test_outcome_serialization() {
        let outcome = TransactionOutcome::failed(ErrorKind::LockUnavailable, "held by apt-get");
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            r#"{"outcome":"failed","kind":"lock-unavailable","detail":"held by apt-get"}"#
        );
        let back: TransactionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_outcome_error_kind() {
        assert_eq!(TransactionOutcome::Success.error_kind(), None);
        assert_eq!(TransactionOutcome::Cancelled.error_kind(), None);
        assert_eq!(
            TransactionOutcome::Killed {
                detail: "hung".into()
            }
            .error_kind(),
            Some(ErrorKind::Killed)
        );
    }

    #[test]
    fn test_status_names() {
        assert_eq!(TransactionStatus::DepResolve.to_string(), "dep-resolve");
        assert_eq!(
            serde_json::to_string(&TransactionStatus::SigCheck).unwrap(),
            r#""sig-check""#
        );
    }

    #[test]
    fn test_filter_accepts() {
        assert!(Filter::None.accepts(true));
        assert!(Filter::Installed.accepts(true));
        assert!(!Filter::Installed.accepts(false));
        assert!(Filter::NotInstalled.accepts(false));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("APT".parse::<BackendKind>().unwrap(), BackendKind::Apt);
        assert_eq!("rpm".parse::<BackendKind>().unwrap(), BackendKind::Yum);
        assert!("pacman".parse::<BackendKind>().is_err());
        assert!(Role::Resolve.is_query());
        assert!(!Role::RefreshCache.is_query());
    }

    #[test]
    fn test_percentage_clamps() {
        assert_eq!(Percentage::value(140), Percentage::Value(100));
        assert_eq!(Percentage::Indeterminate.as_value(), None);
    }
}
