//! Environment variable loading.
//!
//! Values are read through a lookup function so tests can supply a map
//! instead of mutating the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::limiter::AdmissionMode;
use crate::core::tts::AudioFormat;

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

/// Accepts true/false, 1/0, yes/no, on/off
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comma-separated millisecond delays, e.g. `250,500,1000`. Empty means no retries.
pub(crate) fn parse_delays(raw: &str) -> Result<Vec<u64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().map_err(|e| format!("'{s}': {e}")))
        .collect()
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key,
                value: raw,
                reason: "expected true or false".to_string(),
            }),
    }
}

/// Build a configuration from defaults plus whatever `lookup` provides
pub(crate) fn from_lookup<F>(lookup: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ServerConfig::default();

    if let Some(host) = non_empty(&lookup, "HOST") {
        config.host = host;
    }
    if let Some(port) = parsed(&lookup, "PORT")? {
        config.port = port;
    }
    if let Some(path) = non_empty(&lookup, "TTS_DB_PATH") {
        config.db_path = PathBuf::from(path);
    }
    if let Some(origins) = non_empty(&lookup, "ALLOWED_ORIGINS") {
        config.cors_allowed_origins = Some(origins);
    }

    if let Some(max) = parsed(&lookup, "MAX_TEXT_LEN")? {
        config.max_text_len = max;
    }
    if let Some(raw) = non_empty(&lookup, "DEFAULT_FORMAT") {
        config.default_format =
            AudioFormat::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "DEFAULT_FORMAT",
                value: raw.clone(),
                reason: "expected one of mp3, wav, opus, aac, flac".to_string(),
            })?;
    }
    if let Some(lang) = non_empty(&lookup, "DEFAULT_LANG") {
        config.default_lang = lang;
    }
    if let Some(tone) = non_empty(&lookup, "DEFAULT_TONE") {
        config.default_tone = tone;
    }
    if let Some(speed) = parsed(&lookup, "DEFAULT_SPEED")? {
        config.default_speed = speed;
    }
    if let Some(voice) = non_empty(&lookup, "DEFAULT_VOICE_ID") {
        config.default_voice_id = voice;
    }
    if let Some(strict) = flag(&lookup, "STRICT_FORMAT")? {
        config.strict_format = strict;
    }

    if let Some(requests) = parsed(&lookup, "RATE_LIMIT_REQUESTS")? {
        config.rate_limit_requests = requests;
    }
    if let Some(window) = parsed(&lookup, "RATE_LIMIT_WINDOW")? {
        config.rate_limit_window_seconds = window;
    }
    if let Some(chars) = parsed(&lookup, "RATE_LIMIT_CHARS_PER_DAY")? {
        config.rate_limit_chars_per_day = chars;
    }
    if let Some(mode) = parsed::<_, AdmissionMode>(&lookup, "ADMISSION_MODE")? {
        config.admission = mode;
    }

    config.admin_token = non_empty(&lookup, "TTS_ADMIN_TOKEN");

    config.openai_api_key = non_empty(&lookup, "OPENAI_API_KEY");
    if let Some(url) = non_empty(&lookup, "OPENAI_BASE_URL") {
        config.openai_base_url = url;
    }
    if let Some(model) = non_empty(&lookup, "OPENAI_MODEL") {
        config.openai_model = model;
    }
    if let Some(timeout) = parsed(&lookup, "UPSTREAM_TIMEOUT_MS")? {
        config.upstream_timeout_ms = timeout;
    }
    if let Some(raw) = lookup("UPSTREAM_RETRY_DELAYS_MS") {
        config.upstream_retry_delays_ms =
            parse_delays(&raw).map_err(|reason| ConfigError::InvalidValue {
                key: "UPSTREAM_RETRY_DELAYS_MS",
                value: raw.clone(),
                reason,
            })?;
    }
    config.upstream_deadline_ms = parsed(&lookup, "UPSTREAM_DEADLINE_MS")?;

    config.ip_rate_limit_rps = parsed(&lookup, "IP_RATE_LIMIT_RPS")?;
    if let Some(burst) = parsed(&lookup, "IP_RATE_LIMIT_BURST")? {
        config.ip_rate_limit_burst = burst;
    }

    let cert = non_empty(&lookup, "TLS_CERT_PATH");
    let key = non_empty(&lookup, "TLS_KEY_PATH");
    config.tls = match (cert, key) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::Invalid(
                "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
            ));
        }
    };

    Ok(config)
}
