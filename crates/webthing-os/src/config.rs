//! Server configuration, loaded from a `TOML` file with environment variable
//! overrides.
//!
//! Every field has a default, so the file is optional.

use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::hosts::HostValidation;
use crate::hub::DEFAULT_SUBSCRIBER_BUFFER;
use crate::server::{DEFAULT_HTTP_ADDRESS, DEFAULT_SERVER_PORT, ExecutionModel};

/// Server configuration.
///
/// ```toml
/// address = "0.0.0.0"
/// port = 8888
/// hostname = "mything.example.com"
/// host_validation = "enforce"
/// execution = { worker-pool = 4 }
/// subscriber_buffer = 32
/// discovery = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub address: IpAddr,
    /// TCP port.
    pub port: u16,
    /// Public hostname, accepted as a `Host` header.
    pub hostname: Option<String>,
    /// `Host` header validation policy.
    pub host_validation: HostValidation,
    /// Threading model.
    pub execution: ExecutionModel,
    /// Messages buffered for each `WebSocket` connection.
    pub subscriber_buffer: usize,
    /// Whether the server is announced on the network.
    pub discovery: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_HTTP_ADDRESS,
            port: DEFAULT_SERVER_PORT,
            hostname: None,
            host_validation: HostValidation::Enforce,
            execution: ExecutionModel::InProcess,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            discovery: true,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from a `TOML` file, if present, then applies
    /// the `WEBTHING_ADDRESS`, `WEBTHING_PORT` and `WEBTHING_HOSTNAME`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting configuration is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses the configuration from a `TOML` text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or the configuration
    /// is invalid.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("WEBTHING_ADDRESS") {
            match value.parse() {
                Ok(address) => self.address = address,
                Err(_) => warn!("Ignoring invalid WEBTHING_ADDRESS `{value}`"),
            }
        }
        if let Ok(value) = std::env::var("WEBTHING_PORT") {
            match value.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Ignoring invalid WEBTHING_PORT `{value}`"),
            }
        }
        if let Ok(value) = std::env::var("WEBTHING_HOSTNAME") {
            self.hostname = Some(value);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::new(
                ErrorKind::Configuration,
                "port must be non-zero",
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(Error::new(
                ErrorKind::Configuration,
                "subscriber_buffer must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::num::NonZeroUsize;

    use crate::error::ErrorKind;
    use crate::hosts::HostValidation;
    use crate::server::ExecutionModel;

    use super::ServerConfig;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ServerConfig::from_toml("").unwrap();

        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8888);
        assert_eq!(config.execution, ExecutionModel::InProcess);
        assert_eq!(config.host_validation, HostValidation::Enforce);
    }

    #[test]
    fn full_toml() {
        let config = ServerConfig::from_toml(
            r#"
            address = "127.0.0.1"
            port = 9090
            hostname = "mything.example.com"
            host_validation = "disabled"
            execution = { worker-pool = 4 }
            subscriber_buffer = 8
            discovery = false
            "#,
        )
        .unwrap();

        assert_eq!(config.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 9090);
        assert_eq!(config.hostname.as_deref(), Some("mything.example.com"));
        assert_eq!(config.host_validation, HostValidation::Disabled);
        assert_eq!(
            config.execution,
            ExecutionModel::WorkerPool(NonZeroUsize::new(4).unwrap())
        );
        assert_eq!(config.subscriber_buffer, 8);
        assert!(!config.discovery);
    }

    #[test]
    fn in_process_execution() {
        let config = ServerConfig::from_toml(r#"execution = "in-process""#).unwrap();

        assert_eq!(config.execution, ExecutionModel::InProcess);
    }

    #[test]
    fn invalid_configurations() {
        for text in [
            "port = 0",
            "subscriber_buffer = 0",
            "execution = { worker-pool = 0 }",
            "port = \"eighty\"",
        ] {
            assert_eq!(
                ServerConfig::from_toml(text).unwrap_err().kind(),
                ErrorKind::Configuration
            );
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = ServerConfig::from_file("/nonexistent/webthing.toml".as_ref()).unwrap();

        assert_eq!(config, ServerConfig::default());
    }
}
