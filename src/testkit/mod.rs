//! Helpers for testing code that runs on the dispatcher thread

use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `f` until it returns true, panicking (and thus failing the
/// test) if that doesn't happen within `limit`.
///
/// Callbacks run on the dispatcher thread, so tests observe their
/// effects by polling shared state.
pub fn eventually<F: FnMut() -> bool>(limit: Duration, mut f: F) {
    let deadline = Instant::now() + limit;

    while !f() {
        if Instant::now() > deadline {
            panic!("condition not met within {:?}", limit);
        }

        thread::sleep(POLL_INTERVAL);
    }
}
