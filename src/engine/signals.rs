//! Run control signals.
//!
//! A `RunSignals` handle lets an external controller request pause or stop
//! while the interpreter loop is running. The loop checks both flags
//! between node executions (and between loop iterations), so either
//! request takes effect at a safe boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable pause/stop signal pair for one run.
#[derive(Clone, Default)]
pub struct RunSignals {
    pause: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pause at the next node boundary.
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Request an abort at the next node boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Clear a consumed pause request so a resumed run keeps going.
    pub fn clear_pause(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }
}
