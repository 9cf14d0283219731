//! Dispatchers wait for deadlines and execute due work
//!
//! A scheduler owns exactly one dispatcher thread. It is the only
//! consumer of the deadline queue and the only thread that invokes
//! callbacks, so callbacks never run concurrently with each other.

mod hand_off;
mod shared_heap;

use crate::cfg::{DispatchLogic, Precision, SchedulerConfig};
use crate::observer::{CallbackFailure, Delivery, DispatchObserver};
use crate::queue::ScheduledEvent;
use crossbeam::atomic::AtomicCell;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub(crate) use self::hand_off::HandOffDispatcher;
pub(crate) use self::shared_heap::SharedHeapDispatcher;

pub trait BoxedFn {
    fn apply(self: Box<Self>);
}

impl<F: FnOnce()> BoxedFn for F {
    #[inline(always)]
    fn apply(self: Box<F>) {
        (*self)()
    }
}

pub type Thunk = Box<dyn BoxedFn + Send + 'static>;

/// What the dispatcher thread is doing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Nothing is queued; blocked until something is submitted.
    Idle,

    /// Sleeping until the earliest queued deadline or a wake signal.
    Waiting(Instant),

    /// Invoking a due callback.
    Firing,

    /// Shut down. No further callbacks will run.
    Stopped,
}

/// The submission side of a dispatch loop.
pub(crate) trait DispatcherLogic: Send + Sync {
    /// Hands an event to the dispatcher. Gives the event back if the
    /// dispatcher has stopped.
    fn submit(&self, event: ScheduledEvent) -> Result<(), ScheduledEvent>;

    /// Asks the dispatch loop to exit. Events still queued are
    /// discarded.
    fn stop(&self);
}

/// State shared by the dispatcher thread and everything that submits
/// to it, regardless of which dispatch logic runs the loop.
pub(crate) struct Dispatch {
    observer: Box<dyn DispatchObserver>,
    precision: Precision,
    max_sleep: Duration,
    state: AtomicCell<DispatcherState>,
    submitted: AtomicUsize,
    settled: AtomicUsize,
}

impl Dispatch {
    pub(crate) fn new(config: &SchedulerConfig, observer: Box<dyn DispatchObserver>) -> Self {
        Self {
            observer,
            precision: config.precision,
            max_sleep: config.max_sleep,
            state: AtomicCell::new(DispatcherState::Idle),
            submitted: AtomicUsize::new(0),
            settled: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> DispatcherState {
        self.state.load()
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state);
    }

    /// Number of accepted events that haven't been run, skipped or
    /// discarded yet. Exact once submitters and the dispatcher are
    /// quiescent.
    pub(crate) fn pending(&self) -> usize {
        self.submitted
            .load(Ordering::SeqCst)
            .saturating_sub(self.settled.load(Ordering::SeqCst))
    }

    pub(crate) fn accepted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    fn discarded(&self, n: usize) {
        if n > 0 {
            debug!("discarding {} pending events", n);

            self.settled.fetch_add(n, Ordering::SeqCst);
        }
    }

    /// How long to sleep when the earliest deadline is `deadline`,
    /// rounded up to the configured precision and capped.
    fn wait_time(&self, deadline: Instant, now: Instant) -> Duration {
        self.precision
            .round_up(deadline.saturating_duration_since(now))
            .min(self.max_sleep)
    }

    /// Runs a due event on the current thread and reports the outcome.
    ///
    /// Callers must not hold any lock that submitters need.
    fn fire(&self, event: ScheduledEvent) {
        let deadline = event.deadline();

        if event.cancelled() {
            self.report(|observer| observer.skipped(deadline));
        } else {
            self.set_state(DispatcherState::Firing);

            let fired_at = Instant::now();
            let thunk = event.into_thunk();

            match panic::catch_unwind(AssertUnwindSafe(move || thunk.apply())) {
                Ok(()) => {
                    self.report(|observer| observer.delivered(&Delivery { deadline, fired_at }));
                }

                Err(payload) => {
                    let failure = CallbackFailure {
                        deadline,
                        fired_at,
                        message: panic_message(payload.as_ref()),
                    };

                    self.report(|observer| observer.failed(&failure));
                }
            }
        }

        self.settled.fetch_add(1, Ordering::SeqCst);
    }

    /// Hands an outcome to the observer. The observer is user code and
    /// runs on the dispatcher thread, so its panics are contained the
    /// same way a callback's are.
    fn report<F: FnOnce(&dyn DispatchObserver)>(&self, f: F) {
        let observer = self.observer.as_ref();

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(observer))) {
            error!(
                "dispatch observer panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked with a non-string payload".to_string()
    }
}

/// Starts the dispatcher thread for the configured logic.
pub(crate) fn spawn(
    config: &SchedulerConfig,
    dispatch: Arc<Dispatch>,
) -> io::Result<(Arc<dyn DispatcherLogic>, thread::JoinHandle<()>)> {
    let builder = thread::Builder::new().name(config.thread_name.clone());

    match config.dispatch_logic {
        DispatchLogic::SharedHeap => {
            let (logic, handle) = SharedHeapDispatcher::spawn(builder, dispatch)?;

            Ok((Arc::new(logic), handle))
        }

        DispatchLogic::HandOff => {
            let (logic, handle) = HandOffDispatcher::spawn(builder, dispatch)?;

            Ok((Arc::new(logic), handle))
        }
    }
}
