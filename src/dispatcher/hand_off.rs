use super::{Dispatch, DispatcherLogic, DispatcherState};
use crate::queue::{DeadlineQueue, ScheduledEvent};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

enum Request {
    Schedule(ScheduledEvent),
    Stop,
}

/// A dispatcher that receives submissions over a channel.
///
/// The deadline heap is owned by the dispatcher thread alone, so
/// submitters never contend with it for a lock. The price is that every
/// submission wakes the dispatcher, and an event still travelling
/// through the channel can be overtaken by a due event with a slightly
/// later deadline.
///
/// Submitters send while holding a read lock on the stop flag and
/// `stop` sends `Request::Stop` under the write lock, so every accepted
/// event is in the channel ahead of `Stop` and is either run or counted
/// as discarded.
pub(crate) struct HandOffDispatcher {
    sender: Sender<Request>,
    stopped: RwLock<bool>,
}

impl HandOffDispatcher {
    pub(crate) fn spawn(
        builder: thread::Builder,
        dispatch: Arc<Dispatch>,
    ) -> io::Result<(Self, thread::JoinHandle<()>)> {
        let (sender, receiver) = channel::unbounded();

        let handle = builder.spawn(move || Self::run(&receiver, &dispatch))?;

        Ok((
            Self {
                sender,
                stopped: RwLock::new(false),
            },
            handle,
        ))
    }

    fn run(receiver: &Receiver<Request>, dispatch: &Dispatch) {
        let mut queue = DeadlineQueue::new();

        'dispatch: loop {
            // take everything that has already been handed off, so that
            // the heap is as complete as possible before choosing what
            // to run next

            loop {
                match receiver.try_recv() {
                    Ok(Request::Schedule(event)) => {
                        queue.insert(event);
                    }

                    Err(TryRecvError::Empty) => {
                        break;
                    }

                    Ok(Request::Stop) | Err(TryRecvError::Disconnected) => {
                        break 'dispatch;
                    }
                }
            }

            let now = Instant::now();

            let timeout = match queue.peek_deadline() {
                Some(deadline) if deadline <= now => {
                    if let Some(event) = queue.pop_earliest() {
                        dispatch.fire(event);
                    }

                    continue;
                }

                Some(deadline) => {
                    dispatch.set_state(DispatcherState::Waiting(deadline));
                    dispatch.wait_time(deadline, now)
                }

                None => {
                    dispatch.set_state(DispatcherState::Idle);
                    dispatch.max_sleep
                }
            };

            match receiver.recv_timeout(timeout) {
                Ok(Request::Schedule(event)) => {
                    queue.insert(event);
                }

                Err(RecvTimeoutError::Timeout) => (),

                Ok(Request::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }

        let mut discarded = queue.drain();

        while let Ok(request) = receiver.try_recv() {
            if let Request::Schedule(_) = request {
                discarded += 1;
            }
        }

        dispatch.discarded(discarded);
        dispatch.set_state(DispatcherState::Stopped);
    }
}

impl DispatcherLogic for HandOffDispatcher {
    fn submit(&self, event: ScheduledEvent) -> Result<(), ScheduledEvent> {
        let stopped = self.stopped.read();

        if *stopped {
            return Err(event);
        }

        match self.sender.send(Request::Schedule(event)) {
            Ok(()) => Ok(()),
            Err(channel::SendError(Request::Schedule(event))) => Err(event),
            Err(channel::SendError(Request::Stop)) => Ok(()),
        }
    }

    fn stop(&self) {
        let mut stopped = self.stopped.write();

        if !*stopped {
            *stopped = true;

            if let Some(e) = self.sender.send(Request::Stop).err() {
                debug!("dispatcher already gone: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::SchedulerConfig;
    use crate::observer::LatencyStats;
    use crate::testkit::*;
    use crate::util::Cancellable;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_hand_off_order() {
        let stats = Arc::new(LatencyStats::new());
        let dispatch = Arc::new(Dispatch::new(
            &SchedulerConfig::default(),
            Box::new(stats.clone()),
        ));

        let (logic, handle) =
            HandOffDispatcher::spawn(thread::Builder::new(), dispatch.clone()).unwrap();

        let fired = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        for ms in &[90, 30, 60, 0] {
            let fired = fired.clone();
            let ms = *ms;

            dispatch.accepted();

            logic
                .submit(ScheduledEvent::new(
                    start + Duration::from_millis(ms),
                    Box::new(move || fired.lock().push(ms)),
                    Cancellable::new(),
                ))
                .ok()
                .unwrap();
        }

        eventually(Duration::from_secs(5), || fired.lock().len() == 4);

        assert_eq!(*fired.lock(), vec![0, 30, 60, 90]);
        eventually(Duration::from_secs(1), || stats.snapshot().delivered == 4);

        logic.stop();
        handle.join().unwrap();

        assert_eq!(dispatch.state(), DispatcherState::Stopped);
        assert!(logic
            .submit(ScheduledEvent::new(
                Instant::now(),
                Box::new(|| ()),
                Cancellable::new()
            ))
            .is_err());
    }

    #[test]
    fn test_stop_racing_submitters_accounts_for_every_event() {
        const THREADS: usize = 8;

        let dispatch = Arc::new(Dispatch::new(
            &SchedulerConfig::default(),
            Box::new(LatencyStats::new()),
        ));

        let (logic, handle) =
            HandOffDispatcher::spawn(thread::Builder::new(), dispatch.clone()).unwrap();

        let logic = Arc::new(logic);
        let go = Arc::new(AtomicBool::new(false));

        let submitters: Vec<_> = (0..THREADS)
            .map(|_| {
                let logic = logic.clone();
                let dispatch = dispatch.clone();
                let go = go.clone();

                thread::spawn(move || {
                    while !go.load(Ordering::SeqCst) {
                        thread::yield_now();
                    }

                    loop {
                        let event = ScheduledEvent::new(
                            Instant::now() + Duration::from_secs(60),
                            Box::new(|| ()),
                            Cancellable::new(),
                        );

                        match logic.submit(event) {
                            Ok(()) => dispatch.accepted(),
                            Err(_) => break,
                        }
                    }
                })
            })
            .collect();

        go.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));

        logic.stop();

        for submitter in submitters {
            submitter.join().unwrap();
        }

        handle.join().unwrap();

        assert_eq!(dispatch.state(), DispatcherState::Stopped);
        assert_eq!(dispatch.pending(), 0);
    }
}
