//! Cooperative cancellation for long-running analysis passes.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Clonable cancellation flag.
///
/// Cloning shares the flag: a viewer thread keeps one clone and hands the
/// other to the analysis. The decoder polls it between 64 KiB chunks and the
/// function detector between chunks of its call-target sweep; work already
/// emitted when cancellation lands stays valid. The per-function passes are
/// bounded by function size and take no token, callers iterating many
/// functions poll between functions.
///
/// # Example
///
/// ```rust
/// use pescope::CancelToken;
///
/// let token = CancelToken::new();
/// let worker = token.clone();
/// assert!(!worker.is_cancelled());
/// token.cancel();
/// assert!(worker.is_cancelled());
/// ```
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once [`CancelToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
