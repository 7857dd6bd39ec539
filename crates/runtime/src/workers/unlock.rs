//! Background unlock checks.
//!
//! [`UnlockScheduler`] enqueues check requests; [`UnlockWorker`] drains them
//! one at a time and runs [`ProgressionOrchestrator::check_and_unlock_node`].
//! While a check is queued and not yet started, further requests coalesce
//! into it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::orchestrator::{ProgressionOrchestrator, Shared};

/// Commands accepted by the unlock worker.
pub(crate) enum UnlockCommand {
    /// Run one unlock check.
    Check,
    /// Reply once every command queued ahead of this one has been handled.
    Barrier { reply: oneshot::Sender<()> },
    /// Finish the queued commands, then stop.
    Shutdown,
}

/// Sending half of the unlock queue.
pub(crate) struct UnlockScheduler {
    tx: mpsc::UnboundedSender<UnlockCommand>,
    pending: Arc<AtomicBool>,
    accepting: AtomicBool,
}

impl UnlockScheduler {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<UnlockCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            pending: Arc::new(AtomicBool::new(false)),
            accepting: AtomicBool::new(true),
        };
        (scheduler, rx)
    }

    /// Requests an unlock check. Returns false once the scheduler is closed.
    pub(crate) fn schedule(&self) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            trace!("unlock scheduler closed, dropping check request");
            return false;
        }

        if self.pending.swap(true, Ordering::AcqRel) {
            trace!("unlock check already queued");
            return true;
        }

        if self.tx.send(UnlockCommand::Check).is_err() {
            self.pending.store(false, Ordering::Release);
            debug!("unlock worker stopped, check not queued");
            return false;
        }
        true
    }

    /// Waits for every queued check, including checks scheduled while
    /// draining, to finish.
    pub(crate) async fn flush(&self) {
        loop {
            let (reply, done) = oneshot::channel();
            if self.tx.send(UnlockCommand::Barrier { reply }).is_err() {
                return;
            }
            if done.await.is_err() {
                return;
            }
            if !self.pending.load(Ordering::Acquire) {
                return;
            }
        }
    }

    /// Stops accepting checks and asks the worker to exit after the queue
    /// drains.
    pub(crate) fn close(&self) {
        self.accepting.store(false, Ordering::Release);
        if self.tx.send(UnlockCommand::Shutdown).is_err() {
            debug!("unlock worker already stopped");
        }
    }

    pub(crate) fn pending_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pending)
    }
}

/// Receiving half of the unlock queue.
///
/// Holds the orchestrator state weakly so dropping every orchestrator handle
/// stops the worker.
pub(crate) struct UnlockWorker {
    shared: Weak<Shared>,
    rx: mpsc::UnboundedReceiver<UnlockCommand>,
    pending: Arc<AtomicBool>,
}

impl UnlockWorker {
    pub(crate) fn new(
        shared: Weak<Shared>,
        rx: mpsc::UnboundedReceiver<UnlockCommand>,
        pending: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared,
            rx,
            pending,
        }
    }

    /// Main worker loop.
    pub(crate) async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                UnlockCommand::Check => {
                    // Cleared first so a check scheduled mid-run queues again.
                    self.pending.store(false, Ordering::Release);
                    let Some(shared) = self.shared.upgrade() else {
                        debug!("orchestrator dropped, unlock worker exiting");
                        break;
                    };
                    let orchestrator = ProgressionOrchestrator::from_shared(shared);
                    match orchestrator.check_and_unlock_node().await {
                        Ok(Some(unlock)) => {
                            debug!(node_id = %unlock.node_id, level = unlock.current_level, "scheduled check unlocked node");
                        }
                        Ok(None) => trace!("scheduled check found nothing to unlock"),
                        Err(err) => error!(error = %err, "scheduled unlock check failed"),
                    }
                }
                UnlockCommand::Barrier { reply } => {
                    if reply.send(()).is_err() {
                        debug!("Barrier reply channel closed (caller dropped)");
                    }
                }
                UnlockCommand::Shutdown => {
                    debug!("unlock worker shutting down");
                    break;
                }
            }
        }
    }
}
