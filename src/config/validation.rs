//! Configuration validation utilities.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse duration string using humantime.
///
/// Supports `5s`, `1m`, `500ms`, `1h30m` and the other humantime forms.
/// Used by the CLI for interval overrides.
///
/// # Examples
///
/// ```
/// use fleetwatch::config::parse_duration;
///
/// assert_eq!(parse_duration("5s").unwrap().as_secs(), 5);
/// assert_eq!(parse_duration("1m").unwrap().as_secs(), 60);
/// assert_eq!(parse_duration("250ms").unwrap().as_millis(), 250);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

/// Parse an address field, naming it in the error.
pub(crate) fn parse_ip(field: &str, value: &str) -> Result<IpAddr, ConfigError> {
    value.trim().parse::<IpAddr>().map_err(|_| {
        ConfigError::ValidationError(format!("invalid {field}: '{value}'"))
    })
}

/// Reject durations below `min`.
pub(crate) fn ensure_at_least(
    field: &str,
    value: Duration,
    min: Duration,
) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::ValidationError(format!(
            "{field} must be at least {}, got {}",
            humantime::format_duration(min),
            humantime::format_duration(value)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_valid() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration(" 2s ").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("5").is_err());
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("public"), "public");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let result = expand_env_vars("${FLEETWATCH_MISSING_COMMUNITY_91:-public}");
        assert_eq!(result, "public");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: Only this test reads or writes this variable.
        unsafe {
            std::env::set_var("FLEETWATCH_TEST_COMMUNITY", "s3cret");
        }
        let result = expand_env_vars("${FLEETWATCH_TEST_COMMUNITY:-public}");
        assert_eq!(result, "s3cret");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("FLEETWATCH_TEST_COMMUNITY");
        }
    }

    #[test]
    fn test_parse_ip() {
        assert_eq!(parse_ip("ip", "10.0.0.1").unwrap().to_string(), "10.0.0.1");
        assert_eq!(parse_ip("ip", "2001:DB8::1").unwrap().to_string(), "2001:db8::1");
        let err = parse_ip("device ip", "core-1").unwrap_err();
        assert!(err.to_string().contains("invalid device ip: 'core-1'"));
    }

    #[test]
    fn test_ensure_at_least() {
        let min = Duration::from_secs(1);
        assert!(ensure_at_least("poller.interval", Duration::from_secs(1), min).is_ok());
        let err = ensure_at_least("poller.interval", Duration::from_millis(500), min).unwrap_err();
        assert!(err.to_string().contains("poller.interval must be at least 1s"));
    }
}
