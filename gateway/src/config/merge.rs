//! Apply YAML values on top of an environment-derived configuration.

use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig, TlsConfig};
use crate::core::limiter::AdmissionMode;
use crate::core::tts::AudioFormat;

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_some<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Merge `yaml` into `base`. YAML wins wherever it sets a value.
pub(crate) fn merge_config(
    mut base: ServerConfig,
    yaml: YamlConfig,
) -> Result<ServerConfig, ConfigError> {
    if let Some(server) = yaml.server {
        set(&mut base.host, server.host);
        set(&mut base.port, server.port);
        if let Some(tls) = server.tls {
            match (tls.cert_path, tls.key_path) {
                (Some(cert), Some(key)) => {
                    base.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert),
                        key_path: PathBuf::from(key),
                    });
                }
                (None, None) => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "server.tls requires both cert_path and key_path".to_string(),
                    ));
                }
            }
        }
    }

    if let Some(storage) = yaml.storage {
        set(&mut base.db_path, storage.db_path.map(PathBuf::from));
    }

    if let Some(synthesis) = yaml.synthesis {
        set(&mut base.max_text_len, synthesis.max_text_len);
        if let Some(raw) = synthesis.default_format {
            base.default_format =
                AudioFormat::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "synthesis.default_format",
                    value: raw.clone(),
                    reason: "expected one of mp3, wav, opus, aac, flac".to_string(),
                })?;
        }
        set(&mut base.default_lang, synthesis.default_lang);
        set(&mut base.default_tone, synthesis.default_tone);
        set(&mut base.default_speed, synthesis.default_speed);
        set(&mut base.default_voice_id, synthesis.default_voice_id);
        set(&mut base.strict_format, synthesis.strict_format);
    }

    if let Some(limits) = yaml.limits {
        set(&mut base.rate_limit_requests, limits.requests);
        set(&mut base.rate_limit_window_seconds, limits.window_seconds);
        set(&mut base.rate_limit_chars_per_day, limits.chars_per_day);
        if let Some(raw) = limits.admission {
            base.admission =
                raw.parse::<AdmissionMode>()
                    .map_err(|reason| ConfigError::InvalidValue {
                        key: "limits.admission",
                        value: raw.clone(),
                        reason,
                    })?;
        }
    }

    if let Some(upstream) = yaml.upstream {
        set_some(&mut base.openai_api_key, upstream.api_key);
        set(&mut base.openai_base_url, upstream.base_url);
        set(&mut base.openai_model, upstream.model);
        set(&mut base.upstream_timeout_ms, upstream.timeout_ms);
        set(&mut base.upstream_retry_delays_ms, upstream.retry_delays_ms);
        set_some(&mut base.upstream_deadline_ms, upstream.deadline_ms);
    }

    if let Some(security) = yaml.security {
        set_some(&mut base.cors_allowed_origins, security.cors_allowed_origins);
        set_some(&mut base.admin_token, security.admin_token);
        set_some(&mut base.ip_rate_limit_rps, security.ip_rate_limit_rps);
        set(&mut base.ip_rate_limit_burst, security.ip_rate_limit_burst);
    }

    Ok(base)
}
