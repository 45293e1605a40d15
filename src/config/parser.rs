use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use ripple_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Binding to {}", config.server.bind);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so operators can tell which configuration a service
/// instance is running with.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[server]
bind = "0.0.0.0:8080"

[browser]
no-sandbox = true
session-acquire-timeout = 15

[defaults]
max-concurrency = 8
link-selector = "a.next"
page-load-timeout = 30

[retry]
base-delay-ms = 250
multiplier = 3.0

[limits]
max-page-function-bytes = 1024
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.browser.no_sandbox);
        assert_eq!(config.browser.session_acquire_timeout, 15);
        assert_eq!(config.defaults.max_concurrency, 8);
        assert_eq!(config.defaults.link_selector.as_deref(), Some("a.next"));
        assert_eq!(config.defaults.page_load_timeout, 30);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.multiplier, 3.0);
        assert_eq!(config.limits.max_page_function_bytes, 1024);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let file = create_temp_config("[server]\nbind = \"127.0.0.1:9000\"\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.defaults.max_concurrency, 5);
        assert_eq!(config.retry.session_failure_limit, 5);
        assert_eq!(config.limits.max_page_function_bytes, 64 * 1024);
        assert!(config.defaults.headless);
    }

    #[test]
    fn test_empty_file_is_default_config() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3001");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io(_)));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[limits]\nmax-concurrency = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("[server]\nbind = \"127.0.0.1:1\"\n");
        let file2 = create_temp_config("[server]\nbind = \"127.0.0.1:2\"\n");

        let (_, hash1) = load_config_with_hash(file1.path()).unwrap();
        let (_, hash2) = load_config_with_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
