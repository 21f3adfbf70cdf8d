//! Tracing subscriber setup for the binary.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter directive for the given verbosity.
///
/// `RUST_LOG` wins when set; otherwise each `-v` raises the configured level.
pub fn filter_directive(config: &LoggingConfig, verbose: u8) -> String {
    if let Ok(directive) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !directive.trim().is_empty() {
            return directive;
        }
    }
    match verbose {
        0 => config.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber. Logs go to stderr so command output stays
/// pipeable.
pub fn init_tracing(config: &LoggingConfig, verbose: u8) {
    let filter = EnvFilter::try_new(filter_directive(config, verbose))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.colored);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = if config.format == "pretty" {
        builder.pretty().try_init()
    } else {
        builder.compact().try_init()
    };
}
