//! SIGINT/SIGTERM handling for the CLI
//!
//! First signal: cancel the submission (the submit process gets SIGTERM and
//! the driver is stopped on the cluster). Second signal: exit immediately
//! with [`EXIT_CODE_CANCELLED`]. Further signals are ignored.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Exit code for cancelled runs
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel gracefully
    InitiateCancellation,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Signal counter shared with the handler.
#[derive(Debug, Default)]
pub struct SignalState {
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and decide what to do about it.
    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => SignalAction::InitiateCancellation,
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Install the process-wide handler. `on_cancel` runs once, on the first
/// signal, on the handler thread. Must be called at most once.
pub fn install<F>(on_cancel: F) -> Result<Arc<SignalState>, ctrlc::Error>
where
    F: Fn() + Send + 'static,
{
    let state = Arc::new(SignalState::new());
    let handler_state = Arc::clone(&state);
    ctrlc::set_handler(move || match handler_state.handle_signal() {
        SignalAction::InitiateCancellation => {
            warn!("received interrupt, cancelling submission (repeat to exit immediately)");
            on_cancel();
        }
        SignalAction::ImmediateExit => {
            warn!("received second interrupt, exiting immediately");
            std::process::exit(EXIT_CODE_CANCELLED);
        }
        SignalAction::Ignore => {}
    })?;
    Ok(state)
}
