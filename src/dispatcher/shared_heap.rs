use super::{Dispatch, DispatcherLogic, DispatcherState};
use crate::queue::{DeadlineQueue, ScheduledEvent};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

struct Inner {
    queue: DeadlineQueue,
    stopped: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
}

/// A dispatcher that shares one deadline heap with its submitters.
///
/// The heap and the stop flag live behind a single mutex, and the
/// condition variable used as the wake signal waits on that same mutex.
/// The dispatcher decides how long to sleep and starts sleeping
/// without ever releasing the lock in between, so a submission can't
/// slip through unnoticed.
///
/// Submitters only signal when their deadline becomes the earliest one
/// queued. Later deadlines are picked up when the dispatcher next
/// evaluates the heap.
pub(crate) struct SharedHeapDispatcher {
    shared: Arc<Shared>,
}

impl SharedHeapDispatcher {
    pub(crate) fn spawn(
        builder: thread::Builder,
        dispatch: Arc<Dispatch>,
    ) -> io::Result<(Self, thread::JoinHandle<()>)> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: DeadlineQueue::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
        });

        let handle = {
            let shared = shared.clone();

            builder.spawn(move || Self::run(&shared, &dispatch))?
        };

        Ok((Self { shared }, handle))
    }

    fn run(shared: &Shared, dispatch: &Dispatch) {
        let mut inner = shared.inner.lock();

        while !inner.stopped {
            match inner.queue.peek_deadline() {
                None => {
                    dispatch.set_state(DispatcherState::Idle);

                    let _ = shared.wake.wait_for(&mut inner, dispatch.max_sleep);
                }

                Some(deadline) => {
                    let now = Instant::now();

                    if deadline <= now {
                        if let Some(event) = inner.queue.pop_earliest() {
                            // the callback may itself schedule work, so it
                            // must never run while we hold the lock

                            MutexGuard::unlocked(&mut inner, || dispatch.fire(event));
                        }
                    } else {
                        dispatch.set_state(DispatcherState::Waiting(deadline));

                        trace!(
                            "{} events queued, next due in {:?}",
                            inner.queue.len(),
                            deadline - now
                        );

                        let _ = shared
                            .wake
                            .wait_for(&mut inner, dispatch.wait_time(deadline, now));
                    }
                }
            }
        }

        let discarded = inner.queue.drain();

        drop(inner);

        dispatch.discarded(discarded);
        dispatch.set_state(DispatcherState::Stopped);
    }
}

impl DispatcherLogic for SharedHeapDispatcher {
    fn submit(&self, event: ScheduledEvent) -> Result<(), ScheduledEvent> {
        let mut inner = self.shared.inner.lock();

        if inner.stopped {
            return Err(event);
        }

        let wake = inner.queue.is_empty()
            || inner
                .queue
                .peek_deadline()
                .map_or(false, |earliest| event.deadline() <= earliest);

        inner.queue.insert(event);

        drop(inner);

        if wake {
            self.shared.wake.notify_one();
        }

        Ok(())
    }

    fn stop(&self) {
        self.shared.inner.lock().stopped = true;
        self.shared.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::SchedulerConfig;
    use crate::observer::LoggingObserver;
    use crate::testkit::*;
    use crate::util::Cancellable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn start() -> (SharedHeapDispatcher, thread::JoinHandle<()>, Arc<Dispatch>) {
        let dispatch = Arc::new(Dispatch::new(
            &SchedulerConfig::default(),
            Box::new(LoggingObserver),
        ));

        let (logic, handle) =
            SharedHeapDispatcher::spawn(thread::Builder::new(), dispatch.clone()).unwrap();

        (logic, handle, dispatch)
    }

    #[test]
    fn test_submit_wakes_idle_dispatcher() {
        let (logic, handle, dispatch) = start();
        let counter = Arc::new(AtomicUsize::new(0));

        eventually(Duration::from_secs(5), || {
            dispatch.state() == DispatcherState::Idle
        });

        {
            let counter = counter.clone();

            logic
                .submit(ScheduledEvent::new(
                    Instant::now(),
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                    Cancellable::new(),
                ))
                .ok()
                .unwrap();
        }

        // well under the idle re-check interval
        eventually(Duration::from_secs(2), || counter.load(Ordering::SeqCst) == 1);

        logic.stop();
        handle.join().unwrap();

        assert_eq!(dispatch.state(), DispatcherState::Stopped);
    }

    #[test]
    fn test_stop_discards_and_rejects() {
        let (logic, handle, dispatch) = start();

        for _ in 0..3 {
            dispatch.accepted();

            logic
                .submit(ScheduledEvent::new(
                    Instant::now() + Duration::from_secs(60),
                    Box::new(|| ()),
                    Cancellable::new(),
                ))
                .ok()
                .unwrap();
        }

        assert_eq!(dispatch.pending(), 3);

        logic.stop();
        handle.join().unwrap();

        assert_eq!(dispatch.pending(), 0);

        let rejected = logic.submit(ScheduledEvent::new(
            Instant::now(),
            Box::new(|| ()),
            Cancellable::new(),
        ));

        assert!(rejected.is_err());
    }
}
