use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::middleware::pattern::{UrlPattern, UrlPatterns};

pub mod watcher;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

/// Extensions tried, in order, when the configured path names no existing file.
const CONFIG_EXTENSIONS: [&str; 7] = ["toml", "json", "yaml", "yml", "ini", "ron", "json5"];

/// Finds the file `config::File::with_name` reads for `config_path`: the path
/// itself if it is a file, else the first `<path>.<ext>` that exists.
pub fn resolve_config_file(config_path: &str) -> Option<PathBuf> {
    let path = PathBuf::from(config_path);
    if path.is_file() {
        return Some(path);
    }

    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{config_path}.{ext}")))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            timeout_seconds: 30,
        }
    }
}

/// Settings for the request logging middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Paths the middleware observes; everything else passes straight through.
    pub url_patterns: UrlPatterns,
    pub log_request_body: bool,
    pub log_query_params: bool,
    /// Upper bound on a JSON body buffered for logging. Larger bodies are rejected.
    pub max_body_bytes: usize,
    /// Truncates the logged body text. `None` logs the whole body.
    pub max_logged_body_bytes: Option<usize>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_patterns: UrlPatterns::new(vec![UrlPattern::Prefix("/api".to_string())]),
            log_request_body: true,
            log_query_params: true,
            max_body_bytes: 2 * 1024 * 1024,
            max_logged_body_bytes: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::File::with_name(config_path).required(false))
            .add_source(
                ::config::Environment::with_prefix("REQUEST_LOGGER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("logging.url_patterns"),
            );

        // Override with environment variables if present
        if let Ok(host) = std::env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            let port = port.parse::<u16>().context("PORT must be a valid port number")?;
            builder = builder.set_override("server.port", port)?;
        }

        let settings = builder
            .build()
            .with_context(|| format!("failed to read configuration from {config_path}"))?;
        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {config_path}"))?;
        Ok(config)
    }
}
