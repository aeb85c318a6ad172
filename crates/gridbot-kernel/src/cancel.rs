//! Cooperative cancellation shared between the operator console and the
//! control thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gridbot_types::NavError;

/// Cloneable stop flag. Cancelling is permanent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(NavError::Cancelled)` once [`CancellationToken::cancel`] was called.
    pub fn check(&self) -> Result<(), NavError> {
        if self.is_cancelled() {
            Err(NavError::Cancelled)
        } else {
            Ok(())
        }
    }
}
