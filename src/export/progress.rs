use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Progress and cancellation surface the host hands to an export.
///
/// The export polls `is_cancelled` at item boundaries during collation and
/// at each write during assembly; a set flag aborts the export cleanly
/// without writing tags.
pub trait ProgressSink {
    fn set_progress(&self, percent: u8);
    fn set_message(&self, message: &str);
    fn is_cancelled(&self) -> bool;
}

/// Sink that reports nowhere and never cancels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_progress(&self, _percent: u8) {}

    fn set_message(&self, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Sink backed by shared state, so a UI thread can observe progress and
/// request cancellation while the export runs on the control thread.
#[derive(Debug, Default)]
pub struct SharedProgress {
    percent: AtomicU8,
    cancelled: AtomicBool,
    message: Mutex<String>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    pub fn message(&self) -> String {
        self.message.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl ProgressSink for SharedProgress {
    fn set_progress(&self, percent: u8) {
        self.percent.store(percent.min(100), Ordering::Relaxed);
    }

    fn set_message(&self, message: &str) {
        if let Ok(mut slot) = self.message.lock() {
            *slot = message.to_owned();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
