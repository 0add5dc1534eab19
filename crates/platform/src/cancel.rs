//! Cooperative cancellation
//!
//! One gate per engine instance. The transaction polls
//! [`CancellationGate::check_cancelled`] at its loop heads and calls
//! [`CancellationGate::acknowledge`] once it has unwound; a canceller can block
//! in [`CancellationGate::wait_for_acknowledge`] until that happens.

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    Clear,
    Requested,
    /// The last request was observed and the transaction has unwound
    Acknowledged,
}

#[derive(Debug, Clone, Copy, Default)]
struct Inner {
    active: bool,
    requested: bool,
    acknowledged: bool,
}

#[derive(Debug)]
pub struct CancellationGate {
    inner: watch::Sender<Inner>,
}

impl Default for CancellationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: watch::Sender::new(Inner::default()),
        }
    }

    /// Open the gate for a new transaction, dropping any stale request
    pub fn begin(&self) {
        self.inner.send_replace(Inner {
            active: true,
            requested: false,
            acknowledged: false,
        });
    }

    /// Ask the in-flight transaction to stop at its next poll point.
    ///
    /// Returns `false` when no transaction is running; the request is then
    /// dropped.
    pub fn request_cancel(&self) -> bool {
        let mut accepted = false;
        self.inner.send_modify(|inner| {
            if inner.active {
                inner.requested = true;
                accepted = true;
            }
        });
        if !accepted {
            debug!("cancel requested with no transaction in flight");
        }
        accepted
    }

    /// Non-blocking check used at every poll point
    #[must_use]
    pub fn check_cancelled(&self) -> bool {
        self.inner.borrow().requested
    }

    /// Mark the transaction as unwound. Always leaves the gate clear.
    pub fn acknowledge(&self) {
        self.inner.send_modify(|inner| {
            inner.acknowledged = inner.requested;
            inner.requested = false;
            inner.active = false;
        });
    }

    /// Block until a pending request has been acknowledged.
    ///
    /// Returns immediately when nothing is pending.
    pub async fn wait_for_acknowledge(&self) {
        let mut rx = self.inner.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|inner| !inner.requested || !inner.active).await;
    }

    /// Resolve once cancellation is requested.
    ///
    /// For racing against waits that cannot poll the gate themselves, such
    /// as a stalled network request. Pends forever when nothing is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.subscribe();
        if rx.wait_for(|inner| inner.requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    #[must_use]
    pub fn state(&self) -> CancelState {
        let inner = *self.inner.borrow();
        if inner.requested {
            CancelState::Requested
        } else if inner.acknowledged {
            CancelState::Acknowledged
        } else {
            CancelState::Clear
        }
    }

    /// Whether a transaction currently holds the gate open
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.borrow().active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn request_without_transaction_is_dropped() {
        let gate = CancellationGate::new();
        assert!(!gate.request_cancel());
        assert!(!gate.check_cancelled());
        assert_eq!(gate.state(), CancelState::Clear);
    }

    #[test]
    fn acknowledge_clears_the_gate() {
        let gate = CancellationGate::new();
        gate.begin();
        assert!(gate.request_cancel());
        assert_eq!(gate.state(), CancelState::Requested);
        assert!(gate.check_cancelled());

        gate.acknowledge();
        assert!(!gate.check_cancelled());
        assert_eq!(gate.state(), CancelState::Acknowledged);

        gate.begin();
        assert_eq!(gate.state(), CancelState::Clear);
    }

    #[tokio::test]
    async fn wait_returns_once_acknowledged() {
        let gate = Arc::new(CancellationGate::new());
        gate.begin();
        gate.request_cancel();

        let worker = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                while !gate.check_cancelled() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                gate.acknowledge();
            })
        };

        tokio::time::timeout(Duration::from_secs(5), gate.wait_for_acknowledge())
            .await
            .unwrap();
        assert_eq!(gate.state(), CancelState::Acknowledged);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_resolves_on_request() {
        let gate = Arc::new(CancellationGate::new());
        gate.begin();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), gate.cancelled())
                .await
                .is_err()
        );

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gate.request_cancel());
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_without_request_returns_immediately() {
        let gate = CancellationGate::new();
        gate.begin();
        tokio::time::timeout(Duration::from_millis(100), gate.wait_for_acknowledge())
            .await
            .unwrap();
    }
}
