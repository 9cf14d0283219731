use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A token returned for every scheduled event.
///
/// Cancelling does not remove the event from the queue. The dispatcher
/// checks the token when the event comes due and skips it if it has
/// been cancelled by then.
#[derive(Clone, Debug)]
pub struct Cancellable {
    pub(crate) cancel: Arc<AtomicBool>,
}

impl Cancellable {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token that is already cancelled, handed out for submissions
    /// the scheduler refused.
    pub(crate) fn rejected() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Determines if this is cancelled at this point of time.
    ///
    /// If this returns true, it will always return true.
    ///
    /// If this returns false, it may return true at any point in a subsequent call.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}
