//! Configuration

use std::collections::HashMap;
use std::convert::TryFrom;
use std::time::Duration;
use std::{borrow, env, fmt, io, str};

/// A `Config` holds simple key/value pairings that are sourced
/// from a few layers, and provides methods to extract values.
///
/// It is intended to only be used when constructing a scheduler,
/// allowing developers to specify values at a few different layers.
///
/// Configuration values are layered, where by the environment
/// variables take highest precedence, followed by the application's
/// specified defaults (if any), followed by the library's fallback
/// defaults.
#[derive(Clone, Default)]
pub struct Config {
    defaults: HashMap<String, String>,
}

impl Config {
    /// Create a new configuration with the specified defaults. These
    /// defaults are used for extracting configuration values if they
    /// are not defined in the environment.
    pub fn new(defaults: &[(&str, &str)]) -> Config {
        let defaults = defaults
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Config { defaults }
    }

    /// Create a new configuration with the specified fallback defaults. That is,
    /// they only take effect if not defined by the environment or already supplied
    /// defaults.
    pub fn with_fallback(&self, fallback_defaults: &[(&str, &str)]) -> Config {
        let mut cfg = self.clone();

        for (key, value) in Self::new(fallback_defaults).defaults.into_iter() {
            cfg.defaults.entry(key).or_insert(value);
        }

        cfg
    }

    pub fn parsed<T: str::FromStr>(&self, name: &str) -> io::Result<T>
    where
        T::Err: fmt::Display,
    {
        let provided_result = env::var(name)
            .ok()
            .or_else(|| self.defaults.get(name).map(borrow::ToOwned::to_owned))
            .map(|s| s.trim().parse::<T>());

        match provided_result {
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("config missing: {}", name),
            )),
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("config parse error: {} {}", name, e),
            )),
        }
    }
}

/// The granularity of the dispatcher's sleeps.
///
/// Each sleep is rounded up to a whole number of units, so an event
/// never fires before its deadline and typically fires within one unit
/// after it. Coarser units mean fewer wakeups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl Precision {
    pub fn unit(self) -> Duration {
        match self {
            Precision::Seconds => Duration::from_secs(1),
            Precision::Milliseconds => Duration::from_millis(1),
            Precision::Microseconds => Duration::from_micros(1),
            Precision::Nanoseconds => Duration::from_nanos(1),
        }
    }

    /// Rounds `duration` up to the next whole unit. Saturates at
    /// `u64::MAX` nanoseconds.
    pub fn round_up(self, duration: Duration) -> Duration {
        let unit = self.unit().as_nanos();
        let units = (duration.as_nanos() + unit - 1) / unit;
        let nanos = units.saturating_mul(unit);

        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl str::FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(Precision::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(Precision::Milliseconds),
            "us" | "micros" | "microseconds" => Ok(Precision::Microseconds),
            "ns" | "nanos" | "nanoseconds" => Ok(Precision::Nanoseconds),
            other => Err(format!("unknown precision: {}", other)),
        }
    }
}

/// Which dispatch loop a scheduler runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchLogic {
    /// One deadline heap shared by submitters and the dispatcher behind
    /// a single lock, with a condition variable as the wake signal.
    SharedHeap,

    /// Submissions are handed to the dispatcher over a channel and the
    /// dispatcher keeps its heap to itself. Every submission wakes the
    /// dispatcher.
    HandOff,
}

impl str::FromStr for DispatchLogic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared-heap" => Ok(DispatchLogic::SharedHeap),
            "hand-off" => Ok(DispatchLogic::HandOff),
            other => Err(format!("unknown dispatch logic: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub precision: Precision,

    /// Upper bound of a single sleep. The dispatcher re-evaluates the
    /// queue at least this often even without a wake signal.
    pub max_sleep: Duration,

    pub dispatch_logic: DispatchLogic,
    pub thread_name: String,
    pub install_logger: bool,
    pub log_level: log::LevelFilter,
    pub log_config_on_start: bool,
}

impl SchedulerConfig {
    #[rustfmt::skip]
    pub fn new(cfg: &Config) -> io::Result<Self> {
        let cfg = cfg.with_fallback(&[
            ("METRONOME_PRECISION",           "ms"),
            ("METRONOME_MAX_SLEEP_MS",        "10000"),
            ("METRONOME_DISPATCH_LOGIC",      "shared-heap"),
            ("METRONOME_THREAD_NAME",         "metronome-dispatcher"),
            ("METRONOME_INSTALL_LOGGER",      "true"),
            ("METRONOME_LOG_LEVEL",           "info"),
            ("METRONOME_LOG_CONFIG_ON_START", "false"),
        ]);

        let config = Self {
            precision:           cfg.parsed("METRONOME_PRECISION")?,
            max_sleep:           cfg.parsed("METRONOME_MAX_SLEEP_MS").map(Duration::from_millis)?,
            dispatch_logic:      cfg.parsed("METRONOME_DISPATCH_LOGIC")?,
            thread_name:         cfg.parsed("METRONOME_THREAD_NAME")?,
            install_logger:      cfg.parsed("METRONOME_INSTALL_LOGGER")?,
            log_level:           cfg.parsed("METRONOME_LOG_LEVEL")?,
            log_config_on_start: cfg.parsed("METRONOME_LOG_CONFIG_ON_START")?,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    pub fn with_dispatch_logic(mut self, dispatch_logic: DispatchLogic) -> Self {
        self.dispatch_logic = dispatch_logic;
        self
    }

    pub fn validate(&self) -> io::Result<()> {
        if self.max_sleep == Duration::from_millis(0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "max sleep must be greater than zero",
            ));
        }

        if self.thread_name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "thread name must not be empty",
            ));
        }

        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            precision: Precision::Milliseconds,
            max_sleep: Duration::from_secs(10),
            dispatch_logic: DispatchLogic::SharedHeap,
            thread_name: "metronome-dispatcher".to_string(),
            install_logger: true,
            log_level: log::LevelFilter::Info,
            log_config_on_start: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, time};

    #[derive(Debug, PartialEq)]
    struct CustomConfig {
        latency: u64,
        time: time::Duration,
        name: String,
    }

    #[test]
    fn test_config() -> io::Result<()> {
        let config = Config::new(&[("METRONOME_TEST_LATENCY", "10"), ("METRONOME_TEST_TIME", "1")])
            .with_fallback(&[
                ("METRONOME_TEST_NAME", "dispatcher"),
                ("METRONOME_TEST_TIME", "2"),
            ]);

        let parsed_config = CustomConfig {
            latency: config.parsed("METRONOME_TEST_LATENCY")?,
            time: config
                .parsed("METRONOME_TEST_TIME")
                .map(time::Duration::from_millis)?,
            name: config.parsed("METRONOME_TEST_NAME")?,
        };

        assert_eq!(
            parsed_config,
            CustomConfig {
                latency: 10,
                time: time::Duration::from_millis(1),
                name: "dispatcher".to_string(),
            }
        );

        Ok(())
    }

    #[test]
    fn test_config_errors() {
        let config = Config::new(&[("METRONOME_TEST_NOT_A_NUMBER", "ten")]);

        let missing = config.parsed::<u64>("METRONOME_TEST_ABSENT").unwrap_err();
        assert!(missing.to_string().starts_with("config missing"));

        let invalid = config
            .parsed::<u64>("METRONOME_TEST_NOT_A_NUMBER")
            .unwrap_err();
        assert!(invalid.to_string().starts_with("config parse error"));
    }

    #[test]
    fn test_scheduler_config() {
        let config = SchedulerConfig::new(&Config::new(&[
            ("METRONOME_PRECISION", "us"),
            ("METRONOME_DISPATCH_LOGIC", "hand-off"),
        ]))
        .unwrap();

        assert_eq!(config.precision, Precision::Microseconds);
        assert_eq!(config.dispatch_logic, DispatchLogic::HandOff);
        assert_eq!(config.max_sleep, Duration::from_secs(10));
    }

    #[test]
    fn test_scheduler_config_rejects_zero_sleep() {
        let config = SchedulerConfig::new(&Config::new(&[("METRONOME_MAX_SLEEP_MS", "0")]));

        assert!(config.is_err());
    }

    #[test]
    fn test_scheduler_config_rejects_unknown_logic() {
        let config =
            SchedulerConfig::new(&Config::new(&[("METRONOME_DISPATCH_LOGIC", "work-stealing")]));

        assert!(config.is_err());
    }

    #[test]
    fn test_precision_round_up() {
        let ms = Precision::Milliseconds;

        assert_eq!(ms.round_up(Duration::from_micros(1)), Duration::from_millis(1));
        assert_eq!(ms.round_up(Duration::from_micros(1500)), Duration::from_millis(2));
        assert_eq!(ms.round_up(Duration::from_millis(171)), Duration::from_millis(171));
        assert_eq!(ms.round_up(Duration::from_millis(0)), Duration::from_millis(0));

        assert_eq!(
            Precision::Seconds.round_up(Duration::from_millis(171)),
            Duration::from_secs(1)
        );

        assert_eq!(
            Precision::Nanoseconds.round_up(Duration::from_nanos(17)),
            Duration::from_nanos(17)
        );
    }

    #[test]
    fn test_precision_round_up_saturates() {
        let max = Duration::new(u64::MAX, 999_999_999);

        assert_eq!(
            Precision::Seconds.round_up(max),
            Duration::from_nanos(u64::MAX)
        );
    }

    #[test]
    fn test_precision_parse() {
        assert_eq!("s".parse::<Precision>(), Ok(Precision::Seconds));
        assert_eq!("MS".parse::<Precision>(), Ok(Precision::Milliseconds));
        assert!("fortnight".parse::<Precision>().is_err());
    }
}
