//! Lock, fetch, apply and verify one change set

use crate::classify::{ErrorClassifier, Recovery};
use crate::native::{ApplyStep, NativeBackend};
use crate::phase;
use crate::verify::verify_changes;
use pkgd_cache::{CacheSession, PackageCache};
use pkgd_config::Config;
use pkgd_errors::{CacheError, Error, NetworkError, SupervisorError, TransactionError};
use pkgd_events::{
    EventEmitter, EventSender, PhaseProgress, PhaseRange, ProgressSink, SteppedProgress,
    SupervisorEvent,
};
use pkgd_net::{verify_file, FetchRequest, Fetcher};
use pkgd_platform::fs::modified_after;
use pkgd_platform::{
    CancellationGate, LockGuard, PlatformCommand, PollEvent, ProcessSupervisor, StatusLine,
    SupervisorSettings, SystemLock,
};
use pkgd_types::{
    Action, ChangeSet, MessageKind, PackageInfo, PackageRef, Percentage, RestartKind,
    TransactionOutcome, TransactionStatus,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Paths and limits the executor works with
#[derive(Debug, Clone)]
pub struct CommitSettings {
    pub lock_file: PathBuf,
    pub lock_wait: Duration,
    pub lock_retry: Duration,
    pub archives_dir: PathBuf,
    pub reboot_required: PathBuf,
    pub supervisor: SupervisorSettings,
}

impl CommitSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock_file: config.lock_file(),
            lock_wait: config.lock.wait(),
            lock_retry: config.lock.retry_interval(),
            archives_dir: config.archives_dir(),
            reboot_required: config.reboot_required(),
            supervisor: SupervisorSettings::from(&config.supervisor),
        }
    }
}

/// A fetched file ready for apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub package: Option<PackageRef>,
    pub path: PathBuf,
    /// Expected hex BLAKE3 digest, checked before apply
    pub digest: Option<String>,
}

/// One file to fetch during a fetch phase
#[derive(Debug, Clone)]
pub struct FetchItem {
    pub package: Option<PackageRef>,
    pub summary: Option<String>,
    pub request: FetchRequest,
    pub digest: Option<String>,
}

pub struct CommitExecutor {
    backend: Arc<dyn NativeBackend>,
    fetcher: Arc<dyn Fetcher>,
    gate: Arc<CancellationGate>,
    events: EventSender,
    supervisor: ProcessSupervisor,
    settings: CommitSettings,
}

impl CommitExecutor {
    #[must_use]
    pub fn new(
        backend: Arc<dyn NativeBackend>,
        fetcher: Arc<dyn Fetcher>,
        gate: Arc<CancellationGate>,
        events: EventSender,
        settings: CommitSettings,
    ) -> Self {
        Self {
            backend,
            fetcher,
            gate,
            events,
            supervisor: ProcessSupervisor::new(settings.supervisor.clone()),
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CommitSettings {
        &self.settings
    }

    /// Take the system lock with the configured bounded wait.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::LockUnavailable` if another package manager
    /// holds the lock past the wait.
    pub async fn lock(&self) -> Result<LockGuard, Error> {
        let guard = SystemLock::acquire(
            &self.settings.lock_file,
            self.settings.lock_wait,
            self.settings.lock_retry,
        )
        .await?;
        debug!(path = %guard.path().display(), "system lock acquired");
        Ok(guard)
    }

    /// Lock, fetch, apply and verify `changes`.
    pub async fn commit<S: ProgressSink + Send>(
        &self,
        session: &mut CacheSession,
        changes: &ChangeSet,
        progress: &mut PhaseProgress<S>,
    ) -> TransactionOutcome {
        match self.lock().await {
            Ok(lock) => self.commit_locked(lock, session, changes, progress).await,
            Err(e) => self.fail(session, &e),
        }
    }

    /// Commit under a lock the caller already holds; the lock is released
    /// before returning.
    pub async fn commit_locked<S: ProgressSink + Send>(
        &self,
        lock: LockGuard,
        session: &mut CacheSession,
        changes: &ChangeSet,
        progress: &mut PhaseProgress<S>,
    ) -> TransactionOutcome {
        let result = self.run(session, changes, progress).await;
        drop(lock);
        debug!("system lock released");

        match result {
            Ok(()) => TransactionOutcome::Success,
            Err(e) => self.fail(session, &e),
        }
    }

    /// Run the recovery the failure calls for and turn it into an outcome.
    ///
    /// Database repair has already happened inside the apply phase; this
    /// only reopens the cache when needed.
    pub fn fail(&self, session: &mut CacheSession, error: &Error) -> TransactionOutcome {
        let class = ErrorClassifier::classify(error);
        if let Error::Supervisor(
            SupervisorError::PackageFailed { output, .. }
            | SupervisorError::ExitFailure { output, .. }
            | SupervisorError::Killed { output, .. },
        ) = error
        {
            if !output.trim().is_empty() {
                self.events
                    .emit_message(MessageKind::BackendError, output.trim());
            }
        }
        if class.recovery == Recovery::ReopenCache {
            if let Err(e) = session.reload(&mut ()) {
                warn!(error = %e, "reopening the cache after failure failed");
                self.events
                    .emit_warning_with_context("could not reopen the package cache", e.to_string());
            }
        }
        if class.surface {
            error!(kind = %class.kind, error = %error, "transaction failed");
        } else {
            info!("transaction cancelled");
        }
        ErrorClassifier::outcome(error)
    }

    async fn run<S: ProgressSink + Send>(
        &self,
        session: &mut CacheSession,
        changes: &ChangeSet,
        progress: &mut PhaseProgress<S>,
    ) -> Result<(), Error> {
        if changes.is_empty() {
            return Err(TransactionError::EmptyTransaction.into());
        }

        let items = self.download_items(session.cache()?, changes, &self.settings.archives_dir)?;
        progress.enter(phase::FETCH);
        let artifacts = self.fetch(&items, progress).await?;
        progress.finish_phase();
        self.check_signatures(&artifacts).await?;

        if self.gate.check_cancelled() {
            return Err(Error::Cancelled);
        }

        progress.enter(phase::APPLY);
        let started = SystemTime::now();
        let prompts = self.apply(changes, &artifacts, progress).await?;
        progress.finish_phase();
        self.report_after_apply(&prompts, started);

        progress.enter(phase::VERIFY);
        {
            let mut stepped = SteppedProgress::for_cache_open(progress);
            session.reload(&mut stepped)?;
        }
        verify_changes(session.cache()?, changes)?;
        progress.finish_phase();
        Ok(())
    }

    /// Artifacts `changes` needs, placed under `dest`.
    ///
    /// # Errors
    ///
    /// Returns `PackageNotFound` for packages the cache does not know and
    /// `DownloadFailed` for packages without a download location.
    pub fn download_items(
        &self,
        cache: &dyn PackageCache,
        changes: &ChangeSet,
        dest: &Path,
    ) -> Result<Vec<FetchItem>, Error> {
        changes
            .downloads()
            .map(|package| -> Result<FetchItem, Error> {
                let cached = cache.find(package).ok_or_else(|| CacheError::PackageNotFound {
                    package: package.package_id(),
                })?;
                let url = cached.url.ok_or_else(|| TransactionError::DownloadFailed {
                    message: format!("no download location for {package}"),
                })?;
                let destination = dest.join(artifact_name(&url, package));
                Ok(FetchItem {
                    package: Some(package.clone()),
                    summary: Some(cached.summary),
                    request: FetchRequest::new(url, destination),
                    digest: cached.digest,
                })
            })
            .collect()
    }

    /// Fetch `items` across the current phase, one equal share per item.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` when cancelled between or inside items and
    /// the fetcher's error otherwise.
    pub async fn fetch<S: ProgressSink + Send>(
        &self,
        items: &[FetchItem],
        progress: &mut PhaseProgress<S>,
    ) -> Result<Vec<Artifact>, Error> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.events.emit_status(TransactionStatus::Download);
        self.events.emit_allow_cancel(true);

        let floor = f64::from(progress.last_emitted());
        let range = progress
            .current_range()
            .unwrap_or(PhaseRange::new(floor, floor));
        let slots = range.split(&vec![1.0; items.len()]);

        let mut artifacts = Vec::with_capacity(items.len());
        for (item, slot) in items.iter().zip(slots) {
            if self.gate.check_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(package) = &item.package {
                self.events
                    .emit_package(PackageInfo::Downloading, package, item.summary.clone());
            }
            self.events.emit_sub_percentage(Percentage::value(0));

            let events = &self.events;
            let mut last_sub = 0u8;
            let fetched = {
                let mut report = |inner: f64| {
                    progress.update_in(slot, inner);
                    let sub = whole_percent(inner);
                    if sub > last_sub {
                        last_sub = sub;
                        events.emit_sub_percentage(Percentage::value(sub));
                    }
                };
                self.fetcher
                    .fetch(&item.request, &mut report, &self.gate)
                    .await?
            };
            progress.update_in(slot, 100.0);
            debug!(path = %fetched.path.display(), size = fetched.size, "fetched");

            artifacts.push(Artifact {
                package: item.package.clone(),
                path: fetched.path,
                digest: item.digest.clone(),
            });
        }
        Ok(artifacts)
    }

    /// Verify every artifact that carries an expected digest.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::SignatureFailed` on the first mismatch.
    pub async fn check_signatures(&self, artifacts: &[Artifact]) -> Result<(), Error> {
        let signed: Vec<(&Artifact, &str)> = artifacts
            .iter()
            .filter_map(|a| a.digest.as_deref().map(|d| (a, d)))
            .collect();
        if signed.is_empty() {
            return Ok(());
        }

        self.events.emit_status(TransactionStatus::SigCheck);
        for (artifact, expected) in signed {
            verify_file(&artifact.path, expected)
                .await
                .map_err(|e| match e {
                    Error::Network(NetworkError::ChecksumMismatch {
                        expected, actual, ..
                    }) => TransactionError::SignatureFailed {
                        package: artifact
                            .package
                            .as_ref()
                            .map_or_else(|| artifact.path.display().to_string(), ToString::to_string),
                        message: format!("expected digest {expected}, got {actual}"),
                    }
                    .into(),
                    other => other,
                })?;
        }
        Ok(())
    }

    async fn apply<S: ProgressSink + Send>(
        &self,
        changes: &ChangeSet,
        artifacts: &[Artifact],
        progress: &mut PhaseProgress<S>,
    ) -> Result<Vec<String>, Error> {
        let steps = self.backend.apply_steps(changes, artifacts);
        self.events.emit_allow_cancel(false);

        let floor = f64::from(progress.last_emitted());
        let range = progress
            .current_range()
            .unwrap_or(PhaseRange::new(floor, floor));
        #[allow(clippy::cast_precision_loss)]
        let weights: Vec<f64> = steps
            .iter()
            .map(|s| s.packages.len().max(1) as f64)
            .collect();
        let slots = range.split(&weights);

        let mut prompts = Vec::new();
        for (step, slot) in steps.iter().zip(slots) {
            match self.supervise(step, slot, progress).await {
                Ok(step_prompts) => prompts.extend(step_prompts),
                Err(e) => {
                    if ErrorClassifier::classify(&e).recovery == Recovery::RepairDatabase {
                        self.recover().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(prompts)
    }

    /// Run one apply step to completion, returning the conffile prompts it
    /// answered.
    async fn supervise<S: ProgressSink + Send>(
        &self,
        step: &ApplyStep,
        slot: PhaseRange,
        progress: &mut PhaseProgress<S>,
    ) -> Result<Vec<String>, Error> {
        let mut child = self.supervisor.start(&step.command)?;
        self.events.emit_supervisor(SupervisorEvent::Spawned {
            command: child.command().to_string(),
            pid: child.pid(),
        });

        let mut seen = HashSet::new();
        let mut status = None;
        let mut cancel_noted = false;

        loop {
            if !cancel_noted && self.gate.check_cancelled() {
                cancel_noted = true;
                info!("cancel requested while applying, finishing the native operation first");
            }

            match child.poll().await {
                PollEvent::Idle | PollEvent::Active => {}
                PollEvent::Status(StatusLine::Ok {
                    package,
                    percent,
                    description,
                }) => {
                    if let Some((target, action)) =
                        step.packages.iter().find(|(p, _)| names_package(p, &package))
                    {
                        let (next, info) = apply_status(*action);
                        if status != Some(next) {
                            self.events.emit_status(next);
                            status = Some(next);
                        }
                        if seen.insert(target.package_id()) {
                            self.events.emit_package(info, target, None);
                        }
                    }
                    if let Some(percent) = percent {
                        progress.update_in(slot, percent);
                    }
                    self.events.emit_supervisor(SupervisorEvent::StatusLine {
                        package,
                        percent: percent.unwrap_or(0.0),
                        description,
                    });
                }
                PollEvent::Status(StatusLine::Error { package, message }) => {
                    self.events
                        .emit_supervisor(SupervisorEvent::PackageError { package, message });
                }
                PollEvent::Status(StatusLine::ConffilePrompt { current, new }) => {
                    self.events
                        .emit_supervisor(SupervisorEvent::ConffilePrompt { current, new });
                }
                PollEvent::Exited(code) => {
                    self.events.emit_supervisor(SupervisorEvent::Exited {
                        command: child.command().to_string(),
                        code,
                    });
                    if let Some((package, message)) = child.package_errors().first() {
                        return Err(SupervisorError::PackageFailed {
                            package: package.clone(),
                            message: message.clone(),
                            output: child.output().to_string(),
                        }
                        .into());
                    }
                    if code != Some(0) {
                        return Err(SupervisorError::ExitFailure {
                            command: child.command().to_string(),
                            code,
                            output: child.output().to_string(),
                        }
                        .into());
                    }
                    progress.update_in(slot, 100.0);
                    return Ok(child.conffile_prompts().to_vec());
                }
                PollEvent::Killed => {
                    let timeout_secs = child.inactivity_timeout().as_secs();
                    self.events
                        .emit_supervisor(SupervisorEvent::InactivityTimeout { timeout_secs });
                    return Err(SupervisorError::Killed {
                        timeout_secs,
                        output: child.output().to_string(),
                    }
                    .into());
                }
            }
        }
    }

    /// Forced repair pass after a failed or killed apply. A failing repair is
    /// reported but never replaces the original failure.
    async fn recover(&self) {
        let command = self.backend.recover_command();
        self.events.emit_status(TransactionStatus::Cleanup);
        self.events.emit_allow_cancel(false);
        self.events.emit_supervisor(SupervisorEvent::RecoveryStarted {
            command: command.to_string(),
        });
        warn!(command = %command, "repairing the package database");

        if let Err(message) = self.run_recovery(&command).await {
            error!(command = %command, message = %message, "package database repair failed");
            self.events.emit_supervisor(SupervisorEvent::RecoveryFailed {
                command: command.to_string(),
                message,
            });
        }
    }

    async fn run_recovery(&self, command: &PlatformCommand) -> Result<(), String> {
        let mut child = self.supervisor.start(command).map_err(|e| e.to_string())?;
        loop {
            match child.poll().await {
                PollEvent::Exited(Some(0)) => return Ok(()),
                PollEvent::Exited(code) => return Err(format!("exited with status {code:?}")),
                PollEvent::Killed => return Err("no activity, interrupted".to_string()),
                PollEvent::Idle | PollEvent::Active | PollEvent::Status(_) => {}
            }
        }
    }

    fn report_after_apply(&self, prompts: &[String], started: SystemTime) {
        if !prompts.is_empty() {
            self.events
                .emit_message(MessageKind::ConfigFilesChanged, kept_config_files(prompts));
        }
        if modified_after(&self.settings.reboot_required, started) {
            info!("system restart required");
            self.events.emit_require_restart(RestartKind::System, None);
        }
    }
}

/// Status and per-package info while applying `action`
fn apply_status(action: Action) -> (TransactionStatus, PackageInfo) {
    match action {
        Action::Install => (TransactionStatus::Install, PackageInfo::Installing),
        Action::Upgrade => (TransactionStatus::Update, PackageInfo::Updating),
        Action::Remove => (TransactionStatus::Remove, PackageInfo::Removing),
        Action::Obsolete => (TransactionStatus::Cleanup, PackageInfo::Obsoleting),
    }
}

/// Status lines name packages as `name` or `name:arch`
fn names_package(package: &PackageRef, field: &str) -> bool {
    let name = field.split_once(':').map_or(field, |(name, _)| name);
    name == package.name
}

fn artifact_name(url: &str, package: &PackageRef) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}_{}_{}", package.name, package.version, package.arch))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_percent(inner: f64) -> u8 {
    inner.clamp(0.0, 100.0).round() as u8
}

/// Each prompted file once, in path order
fn kept_config_files(prompts: &[String]) -> String {
    let files: BTreeSet<&str> = prompts.iter().map(String::as_str).collect();
    files.into_iter().collect::<Vec<_>>().join("\n")
}
