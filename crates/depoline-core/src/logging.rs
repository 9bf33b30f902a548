//! Logging setup: env_logger filtering, routed through indicatif on a TTY

use indicatif::MultiProgress;

/// Default verbosity before `RUST_LOG` is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    fn filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Debug => "debug",
        }
    }
}

fn level_label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Render one line. Debug and trace lines carry the emitting module.
fn render(record: &log::Record, color: bool) -> String {
    let label = level_label(record.level());
    let tag = if color {
        format!("{}{label}\x1b[0m", level_color(record.level()))
    } else {
        label.to_string()
    };
    if record.level() >= log::Level::Debug {
        format!("[{tag}] {}: {}", record.target(), record.args())
    } else {
        format!("[{tag}] {}", record.args())
    }
}

/// Logger that prints through indicatif MultiProgress so lines never tear bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.matches(record) {
            let line = render(record, true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger. `multi` is set only when stderr is a TTY.
pub fn init_logging(
    verbosity: Verbosity,
    multi: Option<&MultiProgress>,
) -> Result<(), log::SetLoggerError> {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(verbosity.filter());
    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))?;
            log::set_max_level(max_level);
            Ok(())
        }
        None => env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let ts = chrono::Local::now().format("%H:%M:%S");
                writeln!(buf, "{ts} {}", render(record, false))
            })
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(level: log::Level, target: &str, msg: &str) -> String {
        render(
            &log::Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{msg}"))
                .build(),
            false,
        )
    }

    #[test]
    fn info_line_has_no_target() {
        assert_eq!(
            line(log::Level::Info, "depoline_pipeline::uploader", "uploaded 3 records"),
            "[INFO ] uploaded 3 records"
        );
    }

    #[test]
    fn debug_line_has_target() {
        assert_eq!(
            line(log::Level::Debug, "depoline_core::rate_limit", "sleeping"),
            "[DEBUG] depoline_core::rate_limit: sleeping"
        );
    }
}
