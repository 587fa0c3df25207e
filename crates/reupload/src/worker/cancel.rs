//! Cooperative cancellation and the two-stage interrupt handler.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{error, warn};

use crate::error::WorkerError;

/// Exit code used when a second interrupt forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Process-wide stop flag. Cloning shares the flag.
///
/// Long-running code polls [`is_cancelled`](Self::is_cancelled) at its
/// checkpoints; nothing is ever interrupted mid-call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Stop taking new work and let in-flight work settle.
    Graceful,
    /// Terminate now, accepting that in-flight state may be lost.
    Force,
}

/// Turns repeated interrupts into a graceful stop followed by a hard exit.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    interrupts: Arc<AtomicUsize>,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            interrupts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Records one interrupt and says what to do about it.
    pub fn on_interrupt(&self) -> InterruptAction {
        if self.interrupts.fetch_add(1, Ordering::SeqCst) == 0 {
            self.token.cancel();
            InterruptAction::Graceful
        } else {
            InterruptAction::Force
        }
    }

    /// Installs the Ctrl+C handler. Can only be done once per process.
    pub fn install(&self) -> Result<(), WorkerError> {
        let coordinator = self.clone();
        ctrlc::set_handler(move || match coordinator.on_interrupt() {
            InterruptAction::Graceful => {
                warn!("Interrupt received, finishing in-flight work. Press Ctrl+C again to force quit");
            }
            InterruptAction::Force => {
                error!("Second interrupt received, exiting immediately; in-flight state may be lost");
                std::process::exit(FORCED_EXIT_CODE);
            }
        })?;
        Ok(())
    }
}
