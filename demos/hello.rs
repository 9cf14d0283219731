extern crate metronome;

use metronome::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DELAYS_MS: &[(i64, &str)] = &[
    (3_000, "three seconds"),
    (171, "a moment"),
    (-44, "the past"),
    (11_000, "eleven seconds"),
];

fn main() {
    let config = match SchedulerConfig::new(&Config::default()) {
        Ok(config) => config,

        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return;
        }
    };

    let stats = Arc::new(LatencyStats::new().with_logging());

    let scheduler = match Scheduler::with_observer(config, stats.clone()) {
        Ok(scheduler) => scheduler,

        Err(e) => {
            eprintln!("unable to start scheduler: {}", e);
            return;
        }
    };

    let start = Instant::now();

    for &(delay_ms, label) in DELAYS_MS {
        let callback = move || {
            info!(
                "hello from {} ({}ms requested, {:?} observed)",
                label,
                delay_ms,
                start.elapsed()
            );
        };

        if delay_ms < 0 {
            let deadline = start
                .checked_sub(Duration::from_millis(delay_ms.unsigned_abs()))
                .unwrap_or(start);

            scheduler.schedule_at(deadline, callback);
        } else {
            scheduler.schedule_for(Duration::from_millis(delay_ms as u64), callback);
        }
    }

    while scheduler.pending() > 0 {
        thread::sleep(Duration::from_millis(100));
    }

    let snapshot = stats.snapshot();

    info!(
        "delivered {} events, mean lateness {:?}, max lateness {:?}",
        snapshot.delivered,
        snapshot.mean_lateness().unwrap_or_default(),
        snapshot.max_lateness
    );

    scheduler.shutdown();
}
