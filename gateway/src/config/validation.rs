//! Configuration validation logic

use super::{ConfigError, ServerConfig};
use crate::core::gateway::{MAX_SPEED, MIN_SPEED};

/// More than this many retries almost certainly means a typo in the delay list
const MAX_RETRY_DELAYS: usize = 10;

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Check value ranges and referenced files
pub(crate) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.max_text_len == 0 {
        return Err(invalid("max_text_len", 0, "must be greater than zero"));
    }
    if !(MIN_SPEED..=MAX_SPEED).contains(&config.default_speed) {
        return Err(invalid(
            "default_speed",
            config.default_speed,
            "must be between 0.5 and 1.5",
        ));
    }
    if config.default_voice_id.trim().is_empty() {
        return Err(invalid("default_voice_id", "", "must not be empty"));
    }

    if config.rate_limit_requests == 0 {
        return Err(invalid("rate_limit_requests", 0, "must be greater than zero"));
    }
    if config.rate_limit_window_seconds == 0 {
        return Err(invalid(
            "rate_limit_window_seconds",
            0,
            "must be greater than zero",
        ));
    }
    if config.rate_limit_chars_per_day == 0 {
        return Err(invalid(
            "rate_limit_chars_per_day",
            0,
            "must be greater than zero",
        ));
    }

    let base_url = config.openai_base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(
            "openai_base_url",
            base_url,
            "must start with http:// or https://",
        ));
    }
    if config.upstream_timeout_ms == 0 {
        return Err(invalid("upstream_timeout_ms", 0, "must be greater than zero"));
    }
    if config.upstream_retry_delays_ms.len() > MAX_RETRY_DELAYS {
        return Err(invalid(
            "upstream_retry_delays_ms",
            config.upstream_retry_delays_ms.len(),
            "at most 10 retry delays are allowed",
        ));
    }
    if config.upstream_deadline_ms == Some(0) {
        return Err(invalid("upstream_deadline_ms", 0, "must be greater than zero"));
    }

    if let Some(rps) = config.ip_rate_limit_rps {
        if rps == 0 {
            return Err(invalid("ip_rate_limit_rps", 0, "must be greater than zero"));
        }
        if config.ip_rate_limit_burst == 0 {
            return Err(invalid(
                "ip_rate_limit_burst",
                0,
                "must be greater than zero",
            ));
        }
    }

    if let Some(tls) = &config.tls {
        if !tls.cert_path.exists() {
            return Err(ConfigError::Invalid(format!(
                "TLS certificate not found: {}",
                tls.cert_path.display()
            )));
        }
        if !tls.key_path.exists() {
            return Err(ConfigError::Invalid(format!(
                "TLS private key not found: {}",
                tls.key_path.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = ServerConfig::default();
        config.rate_limit_requests = 0;
        assert!(validate(&config).is_err());

        let mut config = ServerConfig::default();
        config.max_text_len = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_speed_bounds() {
        let mut config = ServerConfig::default();
        config.default_speed = 1.5;
        assert!(validate(&config).is_ok());

        config.default_speed = 1.6;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("default_speed"));
    }

    #[test]
    fn test_base_url_scheme() {
        let mut config = ServerConfig::default();
        config.openai_base_url = "ftp://example.com".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_ip_throttle_needs_burst() {
        let mut config = ServerConfig::default();
        config.ip_rate_limit_rps = Some(5);
        config.ip_rate_limit_burst = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_tls_files_must_exist() {
        let mut config = ServerConfig::default();
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        });
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));

        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "cert").unwrap();
        std::fs::write(&key, "key").unwrap();
        config.tls = Some(TlsConfig {
            cert_path: cert,
            key_path: key,
        });
        assert!(validate(&config).is_ok());
    }
}
