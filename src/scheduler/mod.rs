//! Schedule callbacks to run after a delay or at an instant
//!
//! A `Scheduler` owns a dedicated dispatcher thread which sleeps until
//! the earliest pending deadline and then invokes the callbacks that
//! are due, one at a time, in deadline order. Submitting never waits
//! for the dispatcher.
//!
//! ```no_run
//! use metronome::prelude::*;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
//!
//! scheduler.schedule_for(Duration::from_millis(171), || {
//!     println!("hello, world");
//! });
//! ```


use crate::cfg::{Config, SchedulerConfig};
use crate::dispatcher::{self, Dispatch, DispatcherLogic, DispatcherState};
use crate::observer::{DispatchObserver, LoggingObserver};
use crate::queue::ScheduledEvent;
use crate::util::Cancellable;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A cheap, cloneable handle for submitting work to a `Scheduler`.
///
/// Handles can be moved to other threads and into callbacks, e.g. to
/// have a callback schedule a follow-up. Once the scheduler has shut
/// down, submissions through a handle are dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    logic: Arc<dyn DispatcherLogic>,
    dispatch: Arc<Dispatch>,
}

impl SchedulerHandle {
    /// Schedule a function to be invoked once `delay` has elapsed.
    ///
    /// A zero delay runs the function as soon as the dispatcher next
    /// evaluates its queue. It is never run on the calling thread.
    pub fn schedule_for<F: FnOnce()>(&self, delay: Duration, f: F) -> Cancellable
    where
        F: 'static + Send,
    {
        let now = Instant::now();

        match now.checked_add(delay) {
            Some(deadline) => self.schedule_at(deadline, f),

            None => {
                warn!("refusing to schedule event, delay {:?} is out of range", delay);

                Cancellable::rejected()
            }
        }
    }

    /// Schedule a function to be invoked at `deadline`.
    ///
    /// Deadlines in the past are due immediately, which is how a
    /// negative delay is expressed.
    pub fn schedule_at<F: FnOnce()>(&self, deadline: Instant, f: F) -> Cancellable
    where
        F: 'static + Send,
    {
        let cancellable = Cancellable::new();
        let event = ScheduledEvent::new(deadline, Box::new(f), cancellable.clone());

        match self.logic.submit(event) {
            Ok(()) => {
                self.dispatch.accepted();

                cancellable
            }

            Err(_) => {
                warn!("failed to schedule event: scheduler has shut down");

                Cancellable::rejected()
            }
        }
    }

    /// Number of scheduled events that have neither run nor been
    /// skipped yet. Approximate while submissions are in flight.
    pub fn pending(&self) -> usize {
        self.dispatch.pending()
    }
}

/// A delayed-callback scheduler backed by a single dispatcher thread.
///
/// Dropping the scheduler (or calling `shutdown`) stops the dispatcher
/// and joins its thread. Events that haven't come due by then are
/// discarded without running.
pub struct Scheduler {
    config: SchedulerConfig,
    handle: SchedulerHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a scheduler that reports through the `log` facade.
    pub fn new(config: SchedulerConfig) -> io::Result<Self> {
        Self::with_observer(config, LoggingObserver)
    }

    /// Creates a scheduler configured from the environment, falling
    /// back to library defaults.
    pub fn from_env() -> io::Result<Self> {
        Self::new(SchedulerConfig::new(&Config::default())?)
    }

    /// Creates a scheduler that reports every delivery, failure and
    /// skipped event to `observer`.
    pub fn with_observer<O: DispatchObserver + 'static>(
        config: SchedulerConfig,
        observer: O,
    ) -> io::Result<Self> {
        config.validate()?;

        if config.install_logger {
            crate::logging::init(config.log_level);
        }

        if config.log_config_on_start {
            info!("configuration: {:?}", config);
        }

        let dispatch = Arc::new(Dispatch::new(&config, Box::new(observer)));
        let (logic, thread) = dispatcher::spawn(&config, dispatch.clone())?;

        debug!(
            "started {:?} dispatcher with {:?} precision",
            config.dispatch_logic, config.precision
        );

        Ok(Self {
            config,
            handle: SchedulerHandle { logic, dispatch },
            thread: Some(thread),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// See `SchedulerHandle::schedule_for`.
    pub fn schedule_for<F: FnOnce()>(&self, delay: Duration, f: F) -> Cancellable
    where
        F: 'static + Send,
    {
        self.handle.schedule_for(delay, f)
    }

    /// See `SchedulerHandle::schedule_at`.
    pub fn schedule_at<F: FnOnce()>(&self, deadline: Instant, f: F) -> Cancellable
    where
        F: 'static + Send,
    {
        self.handle.schedule_at(deadline, f)
    }

    pub fn state(&self) -> DispatcherState {
        self.handle.dispatch.state()
    }

    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Stops the dispatcher and waits for its thread to exit. A
    /// callback that is running finishes first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.logic.stop();

        if let Some(thread) = self.thread.take() {
            // a callback that drops the scheduler is running on the
            // dispatcher thread, which can't wait for itself

            if thread.thread().id() == thread::current().id() {
                return;
            }

            if thread.join().is_err() {
                error!("dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
