//! Cooperative cancellation shared between a host and a running pass

use crate::error::CopyError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable flag; every clone observes the same cancellation
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

    /// `Err(CopyError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), CopyError> {
        if self.is_cancelled() {
            Err(CopyError::Cancelled)
        } else {
            Ok(())
        }
    }
}
