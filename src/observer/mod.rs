//! Observers are notified about every event the dispatcher settles
//!
//! The dispatcher reports each delivery, each callback that panicked
//! and each event skipped due to cancellation. Reports are made on the
//! dispatcher thread, outside of any lock, after the callback returns.

use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A callback that ran to completion.
#[derive(Clone, Copy, Debug)]
pub struct Delivery {
    pub deadline: Instant,
    pub fired_at: Instant,
}

impl Delivery {
    /// How far past its deadline the callback was started.
    pub fn lateness(&self) -> Duration {
        self.fired_at.saturating_duration_since(self.deadline)
    }
}

/// A callback that panicked. The event is considered delivered and is
/// not retried.
#[derive(Clone, Debug)]
pub struct CallbackFailure {
    pub deadline: Instant,
    pub fired_at: Instant,
    pub message: String,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "callback panicked {:?} after its deadline: {}",
            self.fired_at.saturating_duration_since(self.deadline),
            self.message
        )
    }
}

impl Error for CallbackFailure {}

/// Receives reports from the dispatcher.
///
/// Every method has a no-op default, so implementations only override
/// what they care about. Implementations should return quickly as they
/// delay the next callback.
pub trait DispatchObserver: Send + Sync {
    fn delivered(&self, _delivery: &Delivery) {}

    fn failed(&self, _failure: &CallbackFailure) {}

    fn skipped(&self, _deadline: Instant) {}
}

impl<O: DispatchObserver + ?Sized> DispatchObserver for Arc<O> {
    fn delivered(&self, delivery: &Delivery) {
        (**self).delivered(delivery)
    }

    fn failed(&self, failure: &CallbackFailure) {
        (**self).failed(failure)
    }

    fn skipped(&self, deadline: Instant) {
        (**self).skipped(deadline)
    }
}

/// The default observer, which reports through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

impl DispatchObserver for LoggingObserver {
    fn delivered(&self, delivery: &Delivery) {
        trace!("delivered event (lateness={:?})", delivery.lateness());
    }

    fn failed(&self, failure: &CallbackFailure) {
        error!("{}", failure);
    }

    fn skipped(&self, _deadline: Instant) {
        debug!("skipped cancelled event");
    }
}

/// Counts settled events and aggregates delivery lateness.
///
/// Failures are counted but don't contribute to lateness. A
/// `LatencyStats` can be shared with the scheduler via `Arc` and read
/// from any thread.
#[derive(Debug, Default)]
pub struct LatencyStats {
    inner: Mutex<LatencySnapshot>,
    forward: Option<LoggingObserver>,
}

/// A point-in-time copy of the figures held by `LatencyStats`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencySnapshot {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_lateness: Duration,
    pub max_lateness: Duration,
}

impl LatencySnapshot {
    pub fn mean_lateness(&self) -> Option<Duration> {
        if self.delivered == 0 {
            None
        } else {
            let nanos = self.total_lateness.as_nanos() / self.delivered as u128;

            Some(Duration::from_nanos(nanos as u64))
        }
    }
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally forwards every report to a `LoggingObserver`.
    pub fn with_logging(mut self) -> Self {
        self.forward = Some(LoggingObserver);
        self
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        *self.inner.lock()
    }
}

impl DispatchObserver for LatencyStats {
    fn delivered(&self, delivery: &Delivery) {
        let lateness = delivery.lateness();

        {
            let mut inner = self.inner.lock();
            inner.delivered += 1;
            inner.total_lateness += lateness;

            if lateness > inner.max_lateness {
                inner.max_lateness = lateness;
            }
        }

        if let Some(ref forward) = self.forward {
            forward.delivered(delivery);
        }
    }

    fn failed(&self, failure: &CallbackFailure) {
        self.inner.lock().failed += 1;

        if let Some(ref forward) = self.forward {
            forward.failed(failure);
        }
    }

    fn skipped(&self, deadline: Instant) {
        self.inner.lock().skipped += 1;

        if let Some(ref forward) = self.forward {
            forward.skipped(deadline);
        }
    }
}
