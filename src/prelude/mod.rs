//! Common types necessary for most applications

pub use log::{debug, error, info, trace, warn};

pub use crate::cfg::{Config, DispatchLogic, Precision, SchedulerConfig};
pub use crate::dispatcher::DispatcherState;
pub use crate::observer::{
    CallbackFailure, Delivery, DispatchObserver, LatencySnapshot, LatencyStats, LoggingObserver,
};
pub use crate::scheduler::{Scheduler, SchedulerHandle};
pub use crate::util::Cancellable;
