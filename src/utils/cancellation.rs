//! Cooperative cancellation checked between pipeline stages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::GroupingError;

/// Cloneable cancellation flag shared between the caller and a running pipeline
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

    /// Err if cancelled; called at the top of every stage
    pub fn check(&self, stage: &'static str) -> Result<(), GroupingError> {
        if self.is_cancelled() {
            tracing::info!("Group formation cancelled before stage '{}'", stage);
            return Err(GroupingError::Cancelled { stage });
        }
        Ok(())
    }
}
