//! Logger setup for the `finetl` binary.

use std::io::{IsTerminal, Write};

/// Fixed-width label so messages line up.
fn label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug | log::Level::Trace => "DEBUG",
    }
}

fn ansi(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug | log::Level::Trace => "\x1b[36m",
    }
}

fn default_level(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize the global logger. `RUST_LOG` overrides the flag-derived level.
///
/// On a terminal lines are colored; otherwise (cron, systemd) they carry a
/// timestamp and no ANSI codes.
pub fn init_logging(quiet: bool, debug: bool) {
    let env = env_logger::Env::default().default_filter_or(default_level(quiet, debug));
    let mut builder = env_logger::Builder::from_env(env);

    if std::io::stderr().is_terminal() {
        builder.format(|buf, record| {
            let level = record.level();
            writeln!(buf, "[{}{}\x1b[0m] {}", ansi(level), label(level), record.args())
        });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                buf.timestamp_seconds(),
                label(record.level()),
                record.args()
            )
        });
    }
    // A second call (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}
