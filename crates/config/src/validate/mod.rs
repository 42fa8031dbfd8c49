//! Configuration validation
//!
//! Validation runs once at start-up and consumes the raw configuration,
//! returning the normalized value the renewer keeps for its lifetime.
//! Errors here are fatal; softer findings come from [`lint::lint_config`].

pub mod lint;
pub mod paths;
pub mod timers;

use tracing::debug;

use crate::{Config, ConfigError};

/// Validate and normalize a configuration
pub fn validate(mut config: Config) -> Result<Config, ConfigError> {
    if config.input_paths.is_empty() {
        return Err(ConfigError::NoInputPaths);
    }

    if config.http_user_agent.trim().is_empty() {
        return Err(ConfigError::MissingUserAgent);
    }

    config.timer_t1 = timers::normalize_t1(config.timer_t1)?;
    config.extension = paths::normalize_extension(&config.extension)?;
    paths::check_output_dir(&config.output_dir)?;

    debug!(
        timer_t1 = config.timer_t1,
        extension = %config.extension,
        output_dir = %config.output_dir.display(),
        directories = config.directories,
        input_paths = config.input_paths.len(),
        "Configuration validated"
    );

    Ok(config)
}
