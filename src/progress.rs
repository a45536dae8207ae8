use std::collections::HashMap;
use std::sync::Mutex;

/// Fire-and-forget progress sink, keyed by whatever the caller polls on.
pub trait ProgressReporter: Send + Sync {
    fn set_progress(&self, key: &str, percent: f64);
}

/// In-memory progress map for pollers.
#[derive(Default)]
pub struct LoadingIndicators {
    progress: Mutex<HashMap<String, u8>>,
}

impl LoadingIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported percentage for `key`.
    pub fn progress(&self, key: &str) -> Option<u8> {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}

impl ProgressReporter for LoadingIndicators {
    fn set_progress(&self, key: &str, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0).round() as u8;
        log::trace!("[PROGRESS] {} -> {}%", key, clamped);
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), clamped);
    }
}
