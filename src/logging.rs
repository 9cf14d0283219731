//! Logger installation

use chrono::SecondsFormat;
use fern::colors::{Color, ColoredLevelConfig};
use log::Record;
use std::fmt;
use std::sync::Once;
use std::thread;

static INITIALIZE_ONCE: Once = Once::new();

/// Installs a `fern` logger writing to stderr at the given level.
///
/// Only the first call has any effect. If the application has already
/// installed a logger of its own, that logger is left in place.
pub fn init(level: log::LevelFilter) {
    INITIALIZE_ONCE.call_once(|| {
        let _ = setup_logger(level);
    });
}

fn setup_logger(level: log::LevelFilter) -> Result<(), fern::InitError> {
    let colors = atty::is(atty::Stream::Stderr).then(|| {
        ColoredLevelConfig::new()
            .info(Color::Blue)
            .trace(Color::BrightBlack)
    });

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let level = match colors {
                Some(colors) => colors.color(record.level()).to_string(),
                None => record.level().to_string(),
            };

            out.finish(format_args!(
                "{} {:<5} [{}] {}",
                chrono::Local::now().to_rfc3339_opts(SecondsFormat::Millis, false),
                level,
                origin(record),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;

    Ok(())
}

/// The log target, qualified with the emitting thread's name so that
/// dispatcher output can be told apart from submitters.
fn origin(record: &Record) -> Origin {
    Origin {
        target: record.target().to_string(),
        thread: thread::current().name().map(str::to_string),
    }
}

struct Origin {
    target: String,
    thread: Option<String>,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.thread {
            Some(ref thread) => write!(f, "{}@{}", self.target, thread),
            None => write!(f, "{}", self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_includes_thread_name() {
        let origin = Origin {
            target: "metronome::dispatcher".to_string(),
            thread: Some("metronome-dispatcher".to_string()),
        };

        assert_eq!(
            origin.to_string(),
            "metronome::dispatcher@metronome-dispatcher"
        );

        let origin = Origin {
            target: "metronome::scheduler".to_string(),
            thread: None,
        };

        assert_eq!(origin.to_string(), "metronome::scheduler");
    }

    #[test]
    fn test_init_is_idempotent() {
        init(log::LevelFilter::Info);
        init(log::LevelFilter::Trace);

        info!("logger installed");
    }
}
