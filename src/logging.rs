use std::str::FromStr;

use anyhow::{Context, Result};
use log::LevelFilter;

use crate::settings::LoggingConfig;

/// Logs to stdout and, when configured, to a file.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = LevelFilter::from_str(&config.level)
        .with_context(|| format!("Unknown log level {:?}", config.level))?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        // Dependencies are noisy at debug level
        .level_for("async_imap", LevelFilter::Warn)
        .level_for("tera", LevelFilter::Warn)
        .chain(std::io::stdout());

    if let Some(path) = &config.file {
        let file = fern::log_file(path).with_context(|| format!("Cannot open log file {}", path.display()))?;
        dispatch = dispatch.chain(file);
    }

    dispatch.apply().context("Logger already initialized")?;
    Ok(())
}
