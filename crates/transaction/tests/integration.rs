//! Integration tests for committing change sets

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pkgd_cache::{CacheSession, CatalogProvider};
    use pkgd_errors::{Error, ErrorKind, NetworkError};
    use pkgd_events::{
        channel, AppEvent, EventReceiver, PhaseProgress, ProgressSink, TransactionEvent,
    };
    use pkgd_net::{FetchRequest, FetchResult, Fetcher, HttpFetcher};
    use pkgd_platform::{CancellationGate, PlatformCommand, SupervisorSettings, SystemLock};
    use pkgd_transaction::*;
    use pkgd_types::{
        ChangeSet, MessageKind, PackageInfo, PackageRef, Percentage, RestartKind,
        TransactionOutcome,
    };
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records every emitted global percentage
    #[derive(Debug, Default)]
    struct Recorder(Vec<u8>);

    impl ProgressSink for Recorder {
        fn on_percent(&mut self, percent: u8) {
            self.0.push(percent);
        }

        fn on_phase_start(&mut self, _name: &str) {}
    }

    struct ScriptBackend {
        apply: String,
        recover: String,
    }

    fn sh(script: &str) -> PlatformCommand {
        let mut cmd = PlatformCommand::new("/bin/sh");
        cmd.args(["-c", script]);
        cmd
    }

    impl NativeBackend for ScriptBackend {
        fn name(&self) -> &str {
            "script"
        }

        fn apply_steps(&self, changes: &ChangeSet, _artifacts: &[Artifact]) -> Vec<ApplyStep> {
            vec![ApplyStep {
                command: sh(&self.apply),
                packages: changes.iter().cloned().collect(),
            }]
        }

        fn recover_command(&self) -> PlatformCommand {
            sh(&self.recover)
        }
    }

    /// Requests a cancel as soon as fetching starts
    struct CancellingFetcher {
        gate: Arc<CancellationGate>,
    }

    #[async_trait]
    impl Fetcher for CancellingFetcher {
        async fn fetch(
            &self,
            _request: &FetchRequest,
            _progress: &mut (dyn FnMut(f64) + Send),
            gate: &CancellationGate,
        ) -> Result<FetchResult, Error> {
            assert!(self.gate.request_cancel());
            assert!(gate.check_cancelled());
            Err(NetworkError::Cancelled.into())
        }
    }

    /// Fails every fetch as a broken mirror would, after the package index
    /// on disk has moved on
    struct FailingFetcher {
        index: PathBuf,
        replacement: PathBuf,
    }

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(
            &self,
            request: &FetchRequest,
            _progress: &mut (dyn FnMut(f64) + Send),
            _gate: &CancellationGate,
        ) -> Result<FetchResult, Error> {
            std::fs::copy(&self.replacement, &self.index).unwrap();
            Err(NetworkError::DownloadFailed(format!("{}: connection reset", request.url)).into())
        }
    }

    struct Fixture {
        dir: TempDir,
        session: CacheSession,
        gate: Arc<CancellationGate>,
    }

    impl Fixture {
        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn foo() -> PackageRef {
            PackageRef::new("foo", "1.0", "amd64", "repoA")
        }

        fn changes(&mut self) -> ChangeSet {
            let cache = self.session.cache_mut().unwrap();
            let mut builder = TransactionBuilder::new(cache);
            builder.mark_install(&Self::foo()).unwrap();
            builder.get_changes().unwrap()
        }

        fn settings(&self, timeout: Duration) -> CommitSettings {
            CommitSettings {
                lock_file: self.path("lock"),
                lock_wait: Duration::ZERO,
                lock_retry: Duration::from_millis(10),
                archives_dir: self.path("archives"),
                reboot_required: self.path("reboot-required"),
                supervisor: SupervisorSettings {
                    inactivity_timeout: timeout,
                    poll_interval: Duration::from_millis(20),
                    terminate_grace: Duration::from_millis(500),
                    output_limit: 4096,
                },
            }
        }

        fn executor(&self, apply: &str, fetcher: Arc<dyn Fetcher>) -> (CommitExecutor, EventReceiver) {
            self.executor_with_timeout(apply, fetcher, Duration::from_secs(10))
        }

        fn executor_with_timeout(
            &self,
            apply: &str,
            fetcher: Arc<dyn Fetcher>,
            timeout: Duration,
        ) -> (CommitExecutor, EventReceiver) {
            let backend = ScriptBackend {
                apply: apply.to_string(),
                recover: format!("touch '{}'", self.path("recovered").display()),
            };
            let (tx, rx) = channel();
            let executor = CommitExecutor::new(
                Arc::new(backend),
                fetcher,
                self.gate.clone(),
                tx,
                self.settings(timeout),
            );
            (executor, rx)
        }

        /// Apply script that marks both packages installed
        fn install_script(&self) -> String {
            format!(
                "echo 'pmstatus:foo:50:Installing foo' >&3; \
                 echo 'pmstatus:libfoo:100:Installing libfoo' >&3; \
                 touch '{}'; cp '{}' '{}'",
                self.path("applied").display(),
                self.path("installed.toml").display(),
                self.path("catalog.toml").display()
            )
        }
    }

    fn file_url(path: &Path) -> String {
        url::Url::from_file_path(path).unwrap().to_string()
    }

    fn catalog(dir: &Path, installed: bool, foo_digest: &str) -> String {
        let installed = if installed { "installed = \"1.0\"\n" } else { "" };
        let libfoo = std::fs::read(dir.join("pool/libfoo.deb")).unwrap();
        format!(
            r#"
[[package]]
name = "foo"
version = "1.0"
arch = "amd64"
origin = "repoA"
depends = ["libfoo"]
url = "{foo_url}"
blake3 = "{foo_digest}"
{installed}
[[package]]
name = "libfoo"
version = "1.0"
arch = "amd64"
origin = "repoA"
url = "{libfoo_url}"
blake3 = "{libfoo_digest}"
{installed}"#,
            foo_url = file_url(&dir.join("pool/foo.deb")),
            libfoo_url = file_url(&dir.join("pool/libfoo.deb")),
            libfoo_digest = blake3::hash(&libfoo).to_hex(),
        )
    }

    fn fixture_with_digest(digest: Option<&str>) -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pool")).unwrap();
        std::fs::write(dir.path().join("pool/foo.deb"), b"foo artifact").unwrap();
        std::fs::write(dir.path().join("pool/libfoo.deb"), b"libfoo artifact").unwrap();

        let real = blake3::hash(b"foo artifact").to_hex().to_string();
        let digest = digest.unwrap_or(&real);
        let catalog_path = dir.path().join("catalog.toml");
        std::fs::write(&catalog_path, catalog(dir.path(), false, digest)).unwrap();
        std::fs::write(
            dir.path().join("installed.toml"),
            catalog(dir.path(), true, digest),
        )
        .unwrap();

        let mut session =
            CacheSession::new(Arc::new(CatalogProvider::new(&catalog_path)), vec![catalog_path]);
        session.open(&mut ()).unwrap();
        let gate = Arc::new(CancellationGate::new());
        gate.begin();
        Fixture { dir, session, gate }
    }

    fn fixture() -> Fixture {
        fixture_with_digest(None)
    }

    fn http() -> Arc<dyn Fetcher> {
        Arc::new(HttpFetcher::with_defaults().unwrap())
    }

    fn planned() -> PhaseProgress<Recorder> {
        let mut progress = PhaseProgress::new(Recorder::default());
        progress.start();
        progress.plan(&[
            (phase::CACHE, 10.0),
            (phase::FETCH, 40.0),
            (phase::APPLY, 40.0),
            (phase::VERIFY, 10.0),
        ]);
        progress.enter(phase::CACHE);
        progress.finish_phase();
        progress
    }

    fn transaction_events(rx: &mut EventReceiver) -> Vec<TransactionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Transaction(event) = event {
                events.push(event);
            }
        }
        events
    }

    #[tokio::test]
    async fn test_commit_installs_and_verifies() {
        let mut fx = fixture();
        let changes = fx.changes();
        let (executor, mut rx) = fx.executor(&fx.install_script(), http());
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert_eq!(outcome, TransactionOutcome::Success);
        assert!(fx.path("applied").exists());
        assert!(fx.path("archives/foo.deb").exists());
        assert_eq!(fx.session.pending_marks(), 0);

        let percents = &progress.sink().0;
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last().copied(), Some(100));

        let events = transaction_events(&mut rx);
        let downloading: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransactionEvent::Package {
                    info: PackageInfo::Downloading,
                    package,
                    ..
                } => Some(package.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(downloading, vec!["foo", "libfoo"]);
        assert!(events.iter().any(|e| matches!(
            e,
            TransactionEvent::Package { info: PackageInfo::Installing, package, .. } if package.name == "foo"
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, TransactionEvent::AllowCancel { allowed: false })));
    }

    #[tokio::test]
    async fn test_held_lock_fails_without_progress() {
        let mut fx = fixture();
        let changes = fx.changes();
        let _held = SystemLock::acquire(&fx.path("lock"), Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap();
        let (executor, mut rx) = fx.executor(&fx.install_script(), http());
        let mut progress = PhaseProgress::new(Recorder::default());
        progress.start();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::LockUnavailable));
        assert_eq!(progress.sink().0, vec![0]);
        assert!(!fx.path("applied").exists());
        assert!(!transaction_events(&mut rx)
            .iter()
            .any(|e| matches!(e, TransactionEvent::PercentageChanged { percentage } if *percentage != Percentage::Value(0))));
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_skips_apply() {
        let mut fx = fixture();
        let changes = fx.changes();
        let fetcher = Arc::new(CancellingFetcher {
            gate: fx.gate.clone(),
        });
        let (executor, _rx) = fx.executor(&fx.install_script(), fetcher);
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert_eq!(outcome, TransactionOutcome::Cancelled);
        assert!(!fx.path("applied").exists());
        assert_eq!(fx.session.pending_marks(), 0);
        SystemLock::acquire(&fx.path("lock"), Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_download_failure_reopens_cache() {
        let mut fx = fixture();
        let changes = fx.changes();
        assert!(fx.session.pending_marks() > 0);
        let fetcher = Arc::new(FailingFetcher {
            index: fx.path("catalog.toml"),
            replacement: fx.path("installed.toml"),
        });
        let (executor, mut rx) = fx.executor(&fx.install_script(), fetcher);
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::DownloadFailed));
        assert!(!fx.path("applied").exists());
        assert!(!fx.path("recovered").exists());
        assert_eq!(fx.session.pending_marks(), 0);
        // Only a reopen picks up the index that changed during the fetch
        assert_eq!(
            fx.session
                .cache()
                .unwrap()
                .installed_version("foo", "amd64")
                .as_deref(),
            Some("1.0")
        );
        assert!(!transaction_events(&mut rx)
            .iter()
            .any(|e| matches!(e, TransactionEvent::Package { info: PackageInfo::Installing, .. })));
        SystemLock::acquire(&fx.path("lock"), Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hung_apply_is_killed_and_recovered() {
        let mut fx = fixture();
        let changes = fx.changes();
        let (executor, _rx) =
            fx.executor_with_timeout("sleep 5", http(), Duration::from_millis(300));
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert!(matches!(outcome, TransactionOutcome::Killed { .. }));
        assert!(fx.path("recovered").exists());
        assert!(progress.sink().0.last().copied().unwrap_or(0) < 100);
    }

    #[tokio::test]
    async fn test_error_line_triggers_recovery() {
        let mut fx = fixture();
        let changes = fx.changes();
        let (executor, _rx) = fx.executor(
            "echo 'pmerror:foo:50:subprocess installed post-installation script returned error' >&3; exit 1",
            http(),
        );
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Internal));
        assert!(fx.path("recovered").exists());
    }

    #[tokio::test]
    async fn test_digest_mismatch_is_signature_failure() {
        let mut fx = fixture_with_digest(Some(
            "0000000000000000000000000000000000000000000000000000000000000000",
        ));
        let changes = fx.changes();
        let (executor, _rx) = fx.executor(&fx.install_script(), http());
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::SignatureFailed));
        assert!(!fx.path("applied").exists());
    }

    #[tokio::test]
    async fn test_unapplied_change_fails_verification() {
        let mut fx = fixture();
        let changes = fx.changes();
        let (executor, _rx) = fx.executor("true", http());
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;

        match outcome {
            TransactionOutcome::Failed { kind, detail } => {
                assert_eq!(kind, ErrorKind::VerificationFailed);
                assert_eq!(detail, "foo was not installed");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_conffile_and_restart_are_reported() {
        let mut fx = fixture();
        let changes = fx.changes();
        let script = format!(
            "echo \"pmconffile:/etc/foo.conf:40:'/etc/foo.conf' '/etc/foo.conf.dpkg-new' 1 1\" >&3; \
             read answer; touch '{}'; {}",
            fx.path("reboot-required").display(),
            fx.install_script()
        );
        let (executor, mut rx) = fx.executor(&script, http());
        let mut progress = planned();

        let outcome = executor.commit(&mut fx.session, &changes, &mut progress).await;
        assert_eq!(outcome, TransactionOutcome::Success);

        let events = transaction_events(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            TransactionEvent::Message { kind: MessageKind::ConfigFilesChanged, details } if details == "/etc/foo.conf"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            TransactionEvent::RequireRestart {
                kind: RestartKind::System,
                ..
            }
        )));
    }
}
