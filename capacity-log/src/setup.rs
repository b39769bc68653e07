use std::env;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::{LogConfig, LogFormat};

// Import CRATE_NAMES, which lists all crates in the workspace.
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Builds the default filter directives for the configured level.
///
/// Third-party crates log at `INFO`, while all workspace crates follow the configured level.
fn default_directives(config: &LogConfig) -> String {
    let mut directives = String::from("info");
    for name in CRATE_NAMES {
        directives.push(',');
        directives.push_str(name);
        directives.push('=');
        directives.push_str(config.level.as_str());
    }
    directives
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the configured level if it is set. Calling this more than once
/// has no effect.
///
/// # Example
///
/// ```
/// let log_config = capacity_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// capacity_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: Logging is initialized at startup before any other threads are spawned.
        unsafe { env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_directives(config)),
    };

    let format = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => format.compact().boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => format.with_ansi(false).boxed(),
        (LogFormat::Json, _) => format
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;

    #[test]
    fn test_default_directives_cover_workspace() {
        let config = LogConfig {
            level: LogLevel::Debug,
            ..Default::default()
        };

        let directives = default_directives(&config);
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("capacity_log=debug"));
        assert!(directives.contains("capacity_stream=debug"));
    }
}
