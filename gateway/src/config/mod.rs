//! Configuration module for the TTS gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use tts_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::gateway::{DEFAULT_MAX_TEXT_LEN, GatewayPolicy};
use crate::core::limiter::{AdmissionMode, RateLimits};
use crate::core::tts::enhance::DEFAULT_TONE;
use crate::core::tts::openai::{
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, DEFAULT_UPSTREAM_TIMEOUT_MS,
    OpenAISpeechConfig,
};
use crate::core::tts::{AudioFormat, DEFAULT_RETRY_DELAYS_MS, RetryPolicy};
use crate::core::voices::{DEFAULT_LANGUAGE, DEFAULT_VOICE_ID};

pub const DEFAULT_DB_PATH: &str = "data/tts_gateway.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway, including:
/// - Server settings (host, port, TLS)
/// - Storage location
/// - Request defaults and validation bounds
/// - Per-identity limits and the admission mode
/// - Upstream provider settings and retry schedule
/// - Security settings (CORS, admin token, per-IP throttling)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    /// SQLite file, or `:memory:` for the in-memory store
    pub db_path: PathBuf,

    // Request defaults
    pub max_text_len: usize,
    pub default_format: AudioFormat,
    pub default_lang: String,
    pub default_tone: String,
    pub default_speed: f32,
    pub default_voice_id: String,
    /// Reject unknown formats with 400 instead of falling back
    pub strict_format: bool,

    // Per-identity limits
    pub rate_limit_requests: u64,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_chars_per_day: u64,
    pub admission: AdmissionMode,

    /// Token for `/v1/admin/*`. Admin routes reject everything when unset.
    pub admin_token: Option<String>,

    // Upstream provider
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub upstream_timeout_ms: u64,
    pub upstream_retry_delays_ms: Vec<u64>,
    pub upstream_deadline_ms: Option<u64>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: "*"
    pub cors_allowed_origins: Option<String>,
    /// Per-IP requests per second. Disabled when `None`.
    pub ip_rate_limit_rps: Option<u32>,
    /// Per-IP burst size
    /// Default: 10
    pub ip_rate_limit_burst: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = RateLimits::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tls: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            default_format: AudioFormat::Mp3,
            default_lang: DEFAULT_LANGUAGE.to_string(),
            default_tone: DEFAULT_TONE.to_string(),
            default_speed: 1.0,
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            strict_format: false,
            rate_limit_requests: limits.requests_per_window,
            rate_limit_window_seconds: limits.window_seconds,
            rate_limit_chars_per_day: limits.chars_per_day,
            admission: AdmissionMode::Reserve,
            admin_token: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            upstream_retry_delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
            upstream_deadline_ms: None,
            cors_allowed_origins: Some("*".to_string()),
            ip_rate_limit_rps: None,
            ip_rate_limit_burst: 10,
        }
    }
}

/// Zeroize secret fields when the configuration is dropped
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.admin_token {
            token.zeroize();
        }
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// `.env` is loaded by `main` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::from_lookup(|key| std::env::var(key).ok())?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let base = env::from_lookup(|key| std::env::var(key).ok())?;
        let config = merge::merge_config(base, yaml_config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn is_in_memory_store(&self) -> bool {
        self.db_path.as_os_str() == crate::store::IN_MEMORY_PATH
    }

    pub fn has_admin_token(&self) -> bool {
        self.admin_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Constant-time comparison against the configured admin token
    pub fn verify_admin_token(&self, presented: &str) -> bool {
        match self.admin_token.as_deref() {
            Some(expected) if !expected.is_empty() => {
                expected.as_bytes().ct_eq(presented.as_bytes()).into()
            }
            _ => false,
        }
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            requests_per_window: self.rate_limit_requests,
            window_seconds: self.rate_limit_window_seconds,
            chars_per_day: self.rate_limit_chars_per_day,
        }
    }

    pub fn gateway_policy(&self) -> GatewayPolicy {
        GatewayPolicy {
            max_text_len: self.max_text_len,
            default_format: self.default_format,
            strict_format: self.strict_format,
            default_voice_id: self.default_voice_id.clone(),
            default_tone: self.default_tone.clone(),
            default_lang: self.default_lang.clone(),
            default_speed: self.default_speed,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(
            &self.upstream_retry_delays_ms,
            self.upstream_deadline_ms.map(Duration::from_millis),
        )
    }

    pub fn openai_config(&self) -> OpenAISpeechConfig {
        OpenAISpeechConfig {
            api_key: self.openai_api_key.clone().map(Zeroizing::new),
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
            timeout: Duration::from_millis(self.upstream_timeout_ms),
        }
    }
}
