//! Tracing subscriber setup.

use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use crate::config::Config;

/// Maps a configured level name to a filter; unknown names fall back to info.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Initializes the global fmt subscriber with the configured log level.
///
/// Logs go to stderr; stdout is reserved for command output.
pub fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let level = config.log_level.as_deref().unwrap_or("info");

    tracing_subscriber::fmt()
        .with_max_level(level_filter(level))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    info!("Logging initialized with level: {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("off"), LevelFilter::OFF);
        assert_eq!(level_filter("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(level_filter("warn"), LevelFilter::WARN);
        assert_eq!(level_filter("bogus"), LevelFilter::INFO);
    }
}
