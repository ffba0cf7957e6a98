pub mod env;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::context::DEFAULT_STORAGE_LOCATION;
use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Status used when a response does not carry one
    #[serde(default = "default_status_code")]
    pub default_status_code: u16,
    /// Maximum request body size in bytes, 0 for unbounded
    #[serde(default)]
    pub max_content_length: usize,
    /// Headers written on every response before its own headers
    #[serde(default)]
    pub base_response_headers: HashMap<String, String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub api_keys: Option<ApiKeyConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_status_code: default_status_code(),
            max_content_length: 0,
            base_response_headers: HashMap::new(),
            logging: LoggingConfig::default(),
            rate_limit: None,
            api_keys: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn default_status(&self) -> Result<StatusCode, ConfigError> {
        StatusCode::from_u16(self.default_status_code)
            .map_err(|_| ConfigError::InvalidStatus(self.default_status_code))
    }

    /// The base response headers as a header map.
    pub fn base_headers(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.base_response_headers {
            let invalid = || ConfigError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.append(header_name, header_value);
        }
        Ok(headers)
    }
}

/// Request logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_request_body: bool,
    #[serde(default)]
    pub log_response_body: bool,
    #[serde(default = "default_true")]
    pub log_headers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_request_body: false,
            log_response_body: false,
            log_headers: true,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

/// API key configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    /// Header name containing the API key
    #[serde(default = "default_api_key_header")]
    pub header: String,
    pub keys: Vec<String>,
}

/// Where uploaded files are staged and stored
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_location")]
    pub location: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            location: default_storage_location(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_status_code() -> u16 {
    500
}

fn default_true() -> bool {
    true
}

fn default_burst_size() -> u32 {
    10
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

fn default_storage_location() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_LOCATION)
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let interpolated = env::interpolate_env_vars(content);
        let config: Config = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load configuration with an environment-specific overlay, e.g.
    /// `config.yaml` plus `config.dev.yaml` when `ENV=dev`.
    pub fn from_yaml_with_env(base_path: &str) -> anyhow::Result<Self> {
        let mut document = read_yaml_value(base_path)?;

        if let Ok(env) = std::env::var("ENV") {
            let env_path = base_path.replace(".yaml", &format!(".{}.yaml", env));
            if env_path != base_path && std::path::Path::new(&env_path).exists() {
                tracing::info!("Loading environment-specific config: {}", env_path);
                merge_yaml(&mut document, read_yaml_value(&env_path)?);
            }
        }

        let config: Config = serde_yaml::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let status = self.server.default_status_code;
        if !(100..=999).contains(&status) {
            anyhow::bail!("default_status_code {} is not a valid status code", status);
        }

        self.server.base_headers()?;

        if let Some(rate_limit) = &self.server.rate_limit {
            if rate_limit.requests_per_second == 0 || rate_limit.burst_size == 0 {
                anyhow::bail!("rate_limit requires non-zero requests_per_second and burst_size");
            }
        }

        if let Some(api_keys) = &self.server.api_keys {
            if HeaderName::from_bytes(api_keys.header.as_bytes()).is_err() {
                anyhow::bail!("api_keys header '{}' is not a valid header name", api_keys.header);
            }
            if api_keys.keys.is_empty() {
                anyhow::bail!("api_keys requires at least one key");
            }
        }

        Ok(())
    }
}

fn read_yaml_value(path: &str) -> anyhow::Result<serde_yaml::Value> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&env::interpolate_env_vars(&content))?;
    if value.is_null() {
        return Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
    Ok(value)
}

/// Overlay wins only for keys it sets. Mappings merge key by key, so base
/// headers are extended and unset server fields keep their base values.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
