use crate::config::types::{
    CacheConfig, Config, JobsConfig, RecoveryConfig, RetryConfig, SourceConfig,
};
use crate::limiter::EndpointLimit;
use crate::ConfigError;
use std::collections::HashMap;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_rate_limits(&config.rate_limits)?;
    validate_retry_config(&config.retry)?;
    validate_recovery_config(&config.recovery)?;
    validate_cache_config(&config.cache)?;
    validate_jobs_config(&config.jobs)?;
    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "endpoint must use http or https, got '{}'",
            endpoint.scheme()
        )));
    }

    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.password.is_some() && config.username.is_none() {
        return Err(ConfigError::Validation(
            "password is set but username is missing".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limits(limits: &HashMap<String, EndpointLimit>) -> Result<(), ConfigError> {
    for (endpoint, limit) in limits {
        if !(limit.rate > 0.0) || !limit.rate.is_finite() {
            return Err(ConfigError::Validation(format!(
                "rate for endpoint '{}' must be positive, got {}",
                endpoint, limit.rate
            )));
        }

        if !(limit.capacity >= 1.0) || !limit.capacity.is_finite() {
            return Err(ConfigError::Validation(format!(
                "capacity for endpoint '{}' must be >= 1, got {}",
                endpoint, limit.capacity
            )));
        }
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !(config.backoff_multiplier >= 1.0) || !config.backoff_multiplier.is_finite() {
        return Err(ConfigError::Validation(format!(
            "backoff_multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.initial_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "initial_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.initial_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_recovery_config(config: &RecoveryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.retry_delays_secs.is_empty() {
        return Err(ConfigError::Validation(
            "retry_delays_secs must contain at least one delay".to_string(),
        ));
    }

    if config.dead_letter_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "dead_letter_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.max_entries < 1 {
        return Err(ConfigError::Validation(
            "cache max_entries must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_jobs_config(config: &JobsConfig) -> Result<(), ConfigError> {
    if config.max_pages_limit < 1 {
        return Err(ConfigError::Validation(
            "max_pages_limit must be >= 1".to_string(),
        ));
    }

    if config.default_max_pages < 1 || config.default_max_pages > config.max_pages_limit {
        return Err(ConfigError::Validation(format!(
            "default_max_pages must be between 1 and {}, got {}",
            config.max_pages_limit, config.default_max_pages
        )));
    }

    if config.max_keyword_length < 1 {
        return Err(ConfigError::Validation(
            "max_keyword_length must be >= 1".to_string(),
        ));
    }

    if config.subscriber_buffer < 1 {
        return Err(ConfigError::Validation(
            "subscriber_buffer must be >= 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_endpoint_url() {
        let mut config = Config::default();
        config.source.endpoint = "not a url".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_non_http_endpoint() {
        let mut config = Config::default();
        config.source.endpoint = "ftp://example.com/queries".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_password_without_username() {
        let mut config = Config::default();
        config.source.password = Some("secret".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut config = Config::default();
        config.rate_limits.insert(
            "custom".to_string(),
            EndpointLimit {
                rate: 0.0,
                capacity: 5.0,
            },
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_capacity_below_one_rejected() {
        let mut config = Config::default();
        config.rate_limits.insert(
            "custom".to_string(),
            EndpointLimit {
                rate: 1.0,
                capacity: 0.5,
            },
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_initial_delay_above_max_rejected() {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 120_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_recovery_schedule_rejected() {
        let mut config = Config::default();
        config.recovery.retry_delays_secs.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_recovery_retries_rejected() {
        let mut config = Config::default();
        config.recovery.max_retries = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_cache_entries_rejected() {
        let mut config = Config::default();
        config.cache.max_entries = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_default_pages_above_limit_rejected() {
        let mut config = Config::default();
        config.jobs.default_max_pages = 50;
        assert!(validate(&config).is_err());
    }
}
