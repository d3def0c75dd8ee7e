use crate::config::types::{Config, EngineConfig, HttpConfig, LoggingConfig, StorageConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_http_config(&config.http)?;
    validate_logging_config(&config.logging)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates engine configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-jobs must be between 1 and 100, got {}",
            config.max_concurrent_jobs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.default_start_interval > config.default_end_interval {
        return Err(ConfigError::Validation(format!(
            "default-start-interval ({}) must not exceed default-end-interval ({})",
            config.default_start_interval, config.default_end_interval
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<(), ConfigError> {
    if config.ring_capacity < 1 {
        return Err(ConfigError::Validation(
            "ring-capacity must be >= 1".to_string(),
        ));
    }

    if config.keepalive_secs < 1 {
        return Err(ConfigError::Validation(
            "keepalive-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
