use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///   tls:
///     cert_path: "/etc/tts/cert.pem"
///     key_path: "/etc/tts/key.pem"
///
/// storage:
///   db_path: "data/tts_gateway.db"
///
/// synthesis:
///   max_text_len: 5000
///   default_format: "mp3"
///   default_lang: "en-NG"
///   default_tone: "neutral"
///   default_speed: 1.0
///   default_voice_id: "naija_female_warm"
///   strict_format: false
///
/// limits:
///   requests: 60
///   window_seconds: 60
///   chars_per_day: 300000
///   admission: "reserve"
///
/// upstream:
///   api_key: "sk-..."
///   base_url: "https://api.openai.com/v1"
///   model: "gpt-4o-mini-tts"
///   timeout_ms: 30000
///   retry_delays_ms: [250, 500, 1000]
///   deadline_ms: 10000
///
/// security:
///   cors_allowed_origins: "*"
///   admin_token: "change-me"
///   ip_rate_limit_rps: 20
///   ip_rate_limit_burst: 40
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub storage: Option<StorageYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub limits: Option<LimitsYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageYaml {
    /// SQLite path, or `:memory:`
    pub db_path: Option<String>,
}

/// Request defaults and bounds
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub max_text_len: Option<usize>,
    pub default_format: Option<String>,
    pub default_lang: Option<String>,
    pub default_tone: Option<String>,
    pub default_speed: Option<f32>,
    pub default_voice_id: Option<String>,
    pub strict_format: Option<bool>,
}

/// Per-identity limits
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LimitsYaml {
    pub requests: Option<u64>,
    pub window_seconds: Option<u64>,
    pub chars_per_day: Option<u64>,
    /// `reserve` or `check_only`
    pub admission: Option<String>,
}

/// Upstream provider settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
    /// An empty list disables retries
    pub retry_delays_ms: Option<Vec<u64>>,
    pub deadline_ms: Option<u64>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub admin_token: Option<String>,
    pub ip_rate_limit_rps: Option<u32>,
    pub ip_rate_limit_burst: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Yaml`] if it is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
