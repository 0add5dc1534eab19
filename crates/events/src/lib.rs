#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in pkgd
//!
//! Every client-visible notification of a transaction travels as an
//! [`AppEvent`] over an unbounded channel, in the order it was produced.
//! The progress engine that turns phase-local progress into one monotonic
//! global percentage lives in [`progress`].

pub mod progress;
pub use progress::{
    allocate, OperationProgress, PhaseProgress, PhaseRange, ProgressSink, SteppedProgress,
    OPEN_CACHE_STEPS,
};

pub mod events;
pub use events::{AppEvent, GeneralEvent, ProgressEvent, SupervisorEvent, TransactionEvent};

use pkgd_errors::ErrorKind;
use pkgd_types::{
    MessageKind, PackageInfo, PackageRef, Percentage, RestartKind, TransactionOutcome,
    TransactionStatus,
};
use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender using the `AppEvent` system
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver using the `AppEvent` system
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel with the `AppEvent` system
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout pkgd
///
/// Works the same whether you hold a raw `EventSender` or a struct that
/// contains one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(event);
        }
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message, None)));
    }

    fn emit_warning_with_context(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(
            message,
            Some(context.into()),
        )));
    }

    fn emit_status(&self, status: TransactionStatus) {
        self.emit(AppEvent::Transaction(TransactionEvent::StatusChanged {
            status,
        }));
    }

    fn emit_percentage(&self, percentage: Percentage) {
        self.emit(AppEvent::Transaction(TransactionEvent::PercentageChanged {
            percentage,
        }));
    }

    fn emit_sub_percentage(&self, percentage: Percentage) {
        self.emit(AppEvent::Transaction(
            TransactionEvent::SubPercentageChanged { percentage },
        ));
    }

    fn emit_allow_cancel(&self, allowed: bool) {
        self.emit(AppEvent::Transaction(TransactionEvent::AllowCancel {
            allowed,
        }));
    }

    /// Emit a per-package notification
    fn emit_package(&self, info: PackageInfo, package: &PackageRef, summary: Option<String>) {
        self.emit(AppEvent::Transaction(TransactionEvent::Package {
            info,
            package: package.clone(),
            summary,
        }));
    }

    fn emit_error_code(&self, kind: ErrorKind, details: impl Into<String>) {
        self.emit(AppEvent::Transaction(TransactionEvent::ErrorCode {
            kind,
            details: details.into(),
        }));
    }

    fn emit_message(&self, kind: MessageKind, details: impl Into<String>) {
        self.emit(AppEvent::Transaction(TransactionEvent::Message {
            kind,
            details: details.into(),
        }));
    }

    fn emit_require_restart(&self, kind: RestartKind, package: Option<PackageRef>) {
        self.emit(AppEvent::Transaction(TransactionEvent::RequireRestart {
            kind,
            package,
        }));
    }

    /// Emit the terminal notification of a transaction
    fn emit_finished(&self, outcome: TransactionOutcome, runtime: std::time::Duration) {
        self.emit(AppEvent::Transaction(TransactionEvent::Finished {
            outcome,
            runtime_ms: u64::try_from(runtime.as_millis()).unwrap_or(u64::MAX),
        }));
    }

    fn emit_supervisor(&self, event: SupervisorEvent) {
        self.emit(AppEvent::Supervisor(event));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
/// This allows `EventSender` to be used directly where `EventEmitter` is expected
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

/// Progress lands on the transaction's event stream
impl ProgressSink for EventSender {
    fn on_percent(&mut self, percent: u8) {
        self.emit_percentage(Percentage::Value(percent));
    }

    fn on_phase_start(&mut self, name: &str) {
        self.emit(AppEvent::Progress(ProgressEvent::PhaseStarted {
            phase: name.to_string(),
        }));
    }

    fn on_plan(&mut self, phases: &[(String, PhaseRange)]) {
        self.emit(AppEvent::Progress(ProgressEvent::Planned {
            phases: phases.to_vec(),
        }));
    }

    fn on_step_overrun(&mut self, phase: &str, step: usize) {
        self.emit(AppEvent::Progress(ProgressEvent::StepOverrun {
            phase: phase.to_string(),
            step,
        }));
    }
}
