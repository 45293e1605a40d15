use crate::config::types::{BrowserConfig, Config, LimitsConfig, RequestDefaults, RetryConfig};
use crate::ConfigError;
use std::net::SocketAddr;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server_bind(&config.server.bind)?;
    validate_browser_config(&config.browser)?;
    validate_retry_config(&config.retry)?;
    validate_limits_config(&config.limits)?;
    validate_defaults(&config.defaults, &config.limits)?;
    Ok(())
}

fn validate_server_bind(bind: &str) -> Result<(), ConfigError> {
    bind.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!("server bind '{}' is not a socket address: {}", bind, e))
    })?;
    Ok(())
}

/// Validates browser driver configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("session-acquire-timeout", config.session_acquire_timeout),
        ("compat-injection-timeout", config.compat_injection_timeout),
        ("link-discovery-timeout", config.link_discovery_timeout),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "browser {} must be >= 1 second",
                name
            )));
        }
    }

    if let Some(path) = &config.compat_layer {
        if !path.is_file() {
            return Err(ConfigError::Validation(format!(
                "compat-layer script '{}' does not exist",
                path.display()
            )));
        }
    }

    Ok(())
}

/// Validates retry backoff configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "retry multiplier must be a finite number >= 1.0, got {}",
            config.multiplier
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry base-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    if config.session_failure_limit < 1 {
        return Err(ConfigError::Validation(
            "retry session-failure-limit must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_limits_config(config: &LimitsConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 {
        return Err(ConfigError::Validation(
            "limits max-concurrency must be >= 1".to_string(),
        ));
    }

    if config.max_page_function_bytes == 0 {
        return Err(ConfigError::Validation(
            "limits max-page-function-bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that request defaults are themselves acceptable requests
fn validate_defaults(defaults: &RequestDefaults, limits: &LimitsConfig) -> Result<(), ConfigError> {
    if defaults.max_concurrency < 1 || defaults.max_concurrency > limits.max_concurrency {
        return Err(ConfigError::Validation(format!(
            "defaults max-concurrency must be between 1 and {}, got {}",
            limits.max_concurrency, defaults.max_concurrency
        )));
    }

    if defaults.max_page_retries > limits.max_page_retries {
        return Err(ConfigError::Validation(format!(
            "defaults max-page-retries must be <= {}, got {}",
            limits.max_page_retries, defaults.max_page_retries
        )));
    }

    if defaults.page_load_timeout < 1 || defaults.page_function_timeout < 1 {
        return Err(ConfigError::Validation(
            "defaults page-load-timeout and page-function-timeout must be >= 1 second"
                .to_string(),
        ));
    }

    if let Some(selector) = &defaults.link_selector {
        if !selector.trim().is_empty() && scraper::Selector::parse(selector).is_err() {
            return Err(ConfigError::Validation(format!(
                "defaults link-selector '{}' is not a valid CSS selector",
                selector
            )));
        }
    }

    Ok(())
}
