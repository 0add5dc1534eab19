//! The per-backend transaction orchestrator

use pkgd_cache::CacheSession;
use pkgd_errors::{Error, ErrorKind};
use pkgd_events::{
    AppEvent, EventEmitter, EventSender, PhaseProgress, SteppedProgress, TransactionEvent,
};
use pkgd_platform::CancellationGate;
use pkgd_transaction::{phase, CommitExecutor, TransactionBuilder};
use pkgd_types::{ChangeSet, PackageRef, Role, TransactionOutcome, TransactionStatus};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) type Progress = PhaseProgress<EventSender>;

pub(crate) const INSTALL_PLAN: [(&str, f64); 4] = [
    (phase::CACHE, 10.0),
    (phase::FETCH, 40.0),
    (phase::APPLY, 40.0),
    (phase::VERIFY, 10.0),
];

pub(crate) const REMOVE_PLAN: [(&str, f64); 4] = [
    (phase::CACHE, 10.0),
    (phase::FETCH, 0.0),
    (phase::APPLY, 80.0),
    (phase::VERIFY, 10.0),
];

pub(crate) const SYSTEM_PLAN: [(&str, f64); 4] = [
    (phase::CACHE, 5.0),
    (phase::FETCH, 45.0),
    (phase::APPLY, 40.0),
    (phase::VERIFY, 10.0),
];

/// What a change transaction was asked to do
enum Intent<'a> {
    Install(&'a [PackageRef]),
    Remove {
        packages: &'a [PackageRef],
        allow_deps: bool,
    },
    Update(&'a [PackageRef]),
    System,
}

/// One running transaction
pub(crate) struct Transaction {
    pub(crate) id: Uuid,
    pub(crate) role: Role,
    pub(crate) started: Instant,
    pub(crate) progress: Progress,
}

/// Runs one transaction at a time against the native package manager.
///
/// The engine owns the cache session and the cancellation gate. Every intent
/// method returns exactly one [`TransactionOutcome`] and emits exactly one
/// `Finished` event, whatever happens in between.
pub struct Engine {
    pub(crate) session: CacheSession,
    pub(crate) gate: Arc<CancellationGate>,
    pub(crate) executor: CommitExecutor,
    pub(crate) events: EventSender,
}

impl EventEmitter for Engine {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.events)
    }
}

/// Requests cancellation of whatever transaction the engine is running
#[derive(Debug, Clone)]
pub struct CancelHandle {
    gate: Arc<CancellationGate>,
    events: EventSender,
}

impl CancelHandle {
    /// Ask the running transaction to stop at its next poll point.
    ///
    /// Returns `false` if nothing was running.
    pub fn cancel(&self) -> bool {
        if self.gate.request_cancel() {
            self.events.emit_status(TransactionStatus::Cancel);
            true
        } else {
            false
        }
    }

    /// Cancel and wait until the transaction has unwound
    pub async fn cancel_and_wait(&self) -> bool {
        let accepted = self.cancel();
        if accepted {
            self.gate.wait_for_acknowledge().await;
        }
        accepted
    }
}

impl Engine {
    pub(crate) fn from_parts(
        session: CacheSession,
        gate: Arc<CancellationGate>,
        executor: CommitExecutor,
        events: EventSender,
    ) -> Self {
        Self {
            session,
            gate,
            executor,
            events,
        }
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            gate: Arc::clone(&self.gate),
            events: self.events.clone(),
        }
    }

    /// Whether a transaction is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.is_active()
    }

    #[must_use]
    pub fn session(&self) -> &CacheSession {
        &self.session
    }

    /// Tear the engine down after its last transaction
    pub fn shutdown(mut self) {
        self.gate.acknowledge();
        self.session.close();
        info!("engine shut down");
    }

    /// Install `packages` and whatever they depend on.
    ///
    /// Fails with `DependencyResolutionFailed` if the installation would
    /// remove anything.
    pub async fn install_packages(&mut self, packages: &[PackageRef]) -> TransactionOutcome {
        let mut tx = self.begin(Role::InstallPackages);
        let outcome = self
            .change(&mut tx.progress, &INSTALL_PLAN, Intent::Install(packages))
            .await;
        self.finish(tx, outcome)
    }

    /// Remove `packages`. With `allow_deps` unset, a removal that takes
    /// dependent packages along fails instead.
    pub async fn remove_packages(
        &mut self,
        packages: &[PackageRef],
        allow_deps: bool,
    ) -> TransactionOutcome {
        let mut tx = self.begin(Role::RemovePackages);
        let intent = Intent::Remove {
            packages,
            allow_deps,
        };
        let outcome = self.change(&mut tx.progress, &REMOVE_PLAN, intent).await;
        self.finish(tx, outcome)
    }

    /// Upgrade installed `packages` to the given candidates
    pub async fn update_packages(&mut self, packages: &[PackageRef]) -> TransactionOutcome {
        let mut tx = self.begin(Role::UpdatePackages);
        let outcome = self
            .change(&mut tx.progress, &INSTALL_PLAN, Intent::Update(packages))
            .await;
        self.finish(tx, outcome)
    }

    /// Upgrade everything that has a newer candidate
    pub async fn update_system(&mut self) -> TransactionOutcome {
        let mut tx = self.begin(Role::UpdateSystem);
        let outcome = self
            .change(&mut tx.progress, &SYSTEM_PLAN, Intent::System)
            .await;
        self.finish(tx, outcome)
    }

    pub(crate) fn begin(&self, role: Role) -> Transaction {
        self.gate.begin();
        let id = Uuid::new_v4();
        self.emit(AppEvent::Transaction(TransactionEvent::Started { id, role }));
        info!(%id, %role, "transaction started");

        let mut progress = PhaseProgress::new(self.events.clone());
        progress.start();
        Transaction {
            id,
            role,
            started: Instant::now(),
            progress,
        }
    }

    /// Emit the terminal signal and leave the engine clean for the next
    /// transaction.
    pub(crate) fn finish(
        &mut self,
        mut tx: Transaction,
        outcome: TransactionOutcome,
    ) -> TransactionOutcome {
        match &outcome {
            TransactionOutcome::Success => tx.progress.complete(),
            TransactionOutcome::Failed { kind, detail } => {
                self.events.emit_error_code(*kind, detail.clone());
            }
            TransactionOutcome::Killed { detail } => {
                self.events.emit_error_code(ErrorKind::Killed, detail.clone());
            }
            TransactionOutcome::Cancelled => {}
        }

        self.session.clear();
        self.gate.acknowledge();
        let runtime = tx.started.elapsed();
        info!(
            id = %tx.id,
            role = %tx.role,
            outcome = %outcome,
            runtime_ms = runtime.as_millis(),
            "transaction finished"
        );
        self.events.emit_finished(outcome.clone(), runtime);
        outcome
    }

    pub(crate) fn failed(&mut self, error: &Error) -> TransactionOutcome {
        self.executor.fail(&mut self.session, error)
    }

    /// Open the cache if needed, inside the current phase
    pub(crate) fn ensure_cache(&mut self, progress: &mut Progress) -> Result<(), Error> {
        progress.enter(phase::CACHE);
        {
            let mut stepped = SteppedProgress::for_cache_open(progress);
            self.session.ensure_fresh(&mut stepped)?;
        }
        progress.finish_phase();
        Ok(())
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), Error> {
        if self.gate.check_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn change(
        &mut self,
        progress: &mut Progress,
        plan: &[(&str, f64)],
        intent: Intent<'_>,
    ) -> TransactionOutcome {
        // Taken before anything else so a busy system reports nothing past 0%
        let lock = match self.executor.lock().await {
            Ok(lock) => lock,
            Err(e) => return self.failed(&e),
        };

        progress.plan(plan);
        let changes = match self.resolve_intent(progress, &intent) {
            Ok(changes) => changes,
            Err(e) => return self.failed(&e),
        };
        if changes.is_empty() {
            info!("nothing to change");
            return TransactionOutcome::Success;
        }
        debug!(changes = changes.len(), "change set resolved");

        if !changes.needs_download() {
            let rest: Vec<(&str, f64)> = plan
                .iter()
                .filter(|(name, _)| *name == phase::APPLY || *name == phase::VERIFY)
                .copied()
                .collect();
            let mut replanned = vec![(phase::FETCH, 0.0)];
            replanned.extend(rest);
            progress.replan(&replanned);
        }

        self.executor
            .commit_locked(lock, &mut self.session, &changes, progress)
            .await
    }

    fn resolve_intent(&mut self, progress: &mut Progress, intent: &Intent<'_>) -> Result<ChangeSet, Error> {
        self.ensure_cache(progress)?;
        self.check_cancelled()?;
        self.events.emit_status(TransactionStatus::DepResolve);

        let allow_deps = match intent {
            Intent::Remove { allow_deps, .. } => *allow_deps,
            _ => true,
        };
        let mut builder = TransactionBuilder::new(self.session.cache_mut()?).allow_deps(allow_deps);

        match intent {
            Intent::Install(packages) => {
                for package in *packages {
                    if self.gate.check_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    builder.mark_install(package)?;
                }
            }
            Intent::Remove { packages, .. } => {
                for package in *packages {
                    if self.gate.check_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    builder.mark_remove(package)?;
                }
            }
            Intent::Update(packages) => {
                for package in *packages {
                    if self.gate.check_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    builder.mark_upgrade(package)?;
                }
            }
            Intent::System => builder.mark_system_upgrade()?,
        }

        Ok(builder.get_changes()?)
    }
}
