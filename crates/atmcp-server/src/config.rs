//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML/YAML/JSON file, then `ATMCP_`-prefixed environment variables using
//! `__` for nesting (`ATMCP_AUTH__IDENTIFIER`, `ATMCP_STREAM__AUTOCONNECT`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

use atmcp_auth::AuthSettings;
use atmcp_firehose::StreamSettings;

/// Default environment prefix
pub const ENV_PREFIX: &str = "ATMCP";

/// Default change-feed endpoint
pub const DEFAULT_STREAM_ENDPOINT: &str = "wss://jetstream2.us-east.bsky.network/subscribe";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Personal data server for authenticated calls and session endpoints
    pub service_url: String,
    /// Public AppView for anonymous reads
    pub public_url: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Authentication settings
    pub auth: AuthSettings,
    /// Change-feed settings
    pub stream: StreamSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_url: "https://bsky.social".to_string(),
            public_url: "https://public.api.bsky.app".to_string(),
            request_timeout_secs: 30,
            auth: AuthSettings::default(),
            stream: StreamSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// A URL setting is malformed
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Setting name
        field: &'static str,
        /// Parser message
        reason: String,
    },
}

impl ServerConfig {
    /// Load defaults, the optional file, and `ATMCP_` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or has an unknown extension,
    /// or if any layer fails to deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::environment(ENV_PREFIX))
    }

    /// Load with an explicit environment source
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };
            let name = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;
            builder = builder.add_source(File::new(name, format));
        }

        let config = builder.add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Environment source with the nesting and list conventions used here
    pub fn environment(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("stream.wanted_collections")
    }

    /// Parsed [`Self::service_url`]
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidUrl`] when the setting does not parse.
    pub fn service_url(&self) -> Result<Url, ConfigError> {
        parse_url("service_url", &self.service_url)
    }

    /// Parsed [`Self::public_url`]
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidUrl`] when the setting does not parse.
    pub fn public_url(&self) -> Result<Url, ConfigError> {
        parse_url("public_url", &self.public_url)
    }

    /// Change-feed endpoint, falling back to the public Jetstream instance
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidUrl`] when the setting does not parse.
    pub fn stream_endpoint(&self) -> Result<Url, ConfigError> {
        parse_url(
            "stream.endpoint",
            self.stream
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_STREAM_ENDPOINT),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::environment(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config.service_url().unwrap().as_str(), "https://bsky.social/");
        assert_eq!(
            config.public_url().unwrap().host_str(),
            Some("public.api.bsky.app")
        );
        assert_eq!(config.stream_endpoint().unwrap().as_str(), DEFAULT_STREAM_ENDPOINT);
        assert_eq!(config.logging.level, "info");
        assert!(config.stream.enabled);
        assert!(config.stream.autoconnect);
        assert!(config.auth.identifier.is_none());
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
service_url = "https://pds.example"

[auth]
identifier = "alice.example"
password = "from-file"

[stream]
heartbeat_interval_secs = 10
wanted_collections = ["app.bsky.feed.post"]

[logging]
json = true
"#
        )
        .unwrap();

        let config = ServerConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("ATMCP_AUTH__PASSWORD", "from-env"),
                ("ATMCP_STREAM__AUTOCONNECT", "false"),
                ("ATMCP_STREAM__ENABLED", "false"),
                (
                    "ATMCP_STREAM__WANTED_COLLECTIONS",
                    "app.bsky.feed.like,app.bsky.graph.follow",
                ),
            ]),
        )
        .unwrap();

        assert_eq!(config.service_url, "https://pds.example");
        assert_eq!(config.auth.identifier.as_deref(), Some("alice.example"));
        assert_eq!(
            config.auth.password.as_ref().map(|p| p.expose_secret().as_str()),
            Some("from-env")
        );
        assert_eq!(config.stream.heartbeat_interval_secs, 10);
        assert!(!config.stream.autoconnect);
        assert!(!config.stream.enabled);
        assert_eq!(
            config.stream.wanted_collections,
            vec!["app.bsky.feed.like", "app.bsky.graph.follow"]
        );
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        let missing =
            ServerConfig::load_with_env(Some(Path::new("/nonexistent/atmcp.toml")), env(&[]));
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));

        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let unsupported = ServerConfig::load_with_env(Some(file.path()), env(&[]));
        assert!(matches!(unsupported, Err(ConfigError::UnsupportedFormat)));
    }

    #[test]
    fn test_invalid_url() {
        let config = ServerConfig {
            service_url: "not a url".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.service_url(),
            Err(ConfigError::InvalidUrl { field: "service_url", .. })
        ));
    }
}
