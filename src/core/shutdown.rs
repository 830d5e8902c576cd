use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Process-wide stop flag, checked once per iteration by every long-running task.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    stopped: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
