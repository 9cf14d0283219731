//! # Metronome
//!
//! Metronome is a delayed-callback scheduler for [Rust](https://www.rust-lang.org/).
//! Callbacks are submitted along with a delay or a deadline from any number of
//! threads, and a single dispatcher thread invokes each one once its deadline
//! has passed, in deadline order, without the submitting thread ever waiting.
//!
//! The dispatcher sleeps until the earliest pending deadline and is woken early
//! whenever a nearer deadline is submitted. A callback that panics is reported to
//! an observer and doesn't affect any other callback.

extern crate atty;
extern crate chrono;
extern crate crossbeam;
extern crate fern;
extern crate parking_lot;

#[macro_use]
extern crate log;

pub mod cfg;
pub mod dispatcher;
pub mod logging;
pub mod observer;
pub mod prelude;
pub mod scheduler;
pub mod util;

mod queue;

#[cfg(feature = "testkit")]
pub mod testkit;

#[cfg(all(test, not(feature = "testkit")))]
pub mod testkit;
