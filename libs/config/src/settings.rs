//! Middleware Configuration Module
//!
//! Provides configuration loading for the name server and the protocol
//! layer. Values come from an optional TOML file, then `PORTMW_`
//! environment overrides, with built-in defaults for anything left unset.

use anyhow::{ensure, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::defaults;

/// Prefix of environment overrides, e.g. `PORTMW_NAME_SERVER__PORT=10100`
pub const ENV_PREFIX: &str = "PORTMW";

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MiddlewareConfig {
    pub name_server: NameServerConfig,
    pub protocol: ProtocolSettings,
}

/// Where the name server listens and how it allocates ports
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NameServerConfig {
    pub host: String,
    pub port: u16,
    /// Name the server registers itself under
    pub namespace: String,
    /// Offset from `port` of the first port handed to registrants
    pub port_offset: i32,
    /// Stride between fresh ports on one host
    pub legacy_step: i32,
    /// Port of the first multicast group; `None` uses the registrant base
    pub mcast_base_port: Option<i32>,
    pub tmp_prefix: String,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::name_server::HOST.to_string(),
            port: defaults::name_server::PORT,
            namespace: defaults::name_server::NAMESPACE.to_string(),
            port_offset: defaults::name_server::PORT_OFFSET,
            legacy_step: defaults::name_server::LEGACY_STEP,
            mcast_base_port: None,
            tmp_prefix: defaults::name_server::TMP_PREFIX.to_string(),
        }
    }
}

impl NameServerConfig {
    /// First port allocated to registrants
    pub fn base_port(&self) -> i32 {
        i32::from(self.port) + self.port_offset
    }

    pub fn mcast_base_port(&self) -> i32 {
        self.mcast_base_port.unwrap_or_else(|| self.base_port())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Carrier registration order and serialization buffer sizing
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProtocolSettings {
    pub carriers: Vec<String>,
    pub initial_pool_size: usize,
    pub max_pool_block: usize,
    pub max_message_size: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            carriers: defaults::protocol::CARRIERS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            initial_pool_size: defaults::protocol::INITIAL_POOL_SIZE,
            max_pool_block: defaults::protocol::MAX_POOL_BLOCK,
            max_message_size: defaults::protocol::MAX_MESSAGE_SIZE,
        }
    }
}

impl MiddlewareConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Parse a TOML document, ignoring the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;
        Self::finish(config)
    }

    pub(crate) fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let expanded = shellexpand::full(&path.to_string_lossy())
                .context("Failed to expand configuration path")?
                .into_owned();
            info!("Loading configuration: {}", expanded);
            builder = builder.add_source(File::with_name(&expanded).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let mut parsed: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        parsed.expand_env_vars()?;
        parsed.validate()?;
        debug!(
            bind = %parsed.name_server.bind_address(),
            carriers = ?parsed.protocol.carriers,
            "configuration loaded"
        );
        Ok(parsed)
    }

    /// Expand `$VAR` references in host and namespace values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let server = &mut self.name_server;
        server.host = shellexpand::env(&server.host)
            .context("Failed to expand name server host")?
            .into_owned();
        server.namespace = shellexpand::env(&server.namespace)
            .context("Failed to expand name server namespace")?
            .into_owned();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let server = &self.name_server;
        ensure!(
            server.namespace.starts_with('/'),
            "namespace must start with '/', got '{}'",
            server.namespace
        );
        ensure!(server.legacy_step > 0, "legacy_step must be positive");
        ensure!(
            (1..=65535).contains(&server.base_port()),
            "first registrant port {} is outside 1..=65535",
            server.base_port()
        );
        ensure!(!self.protocol.carriers.is_empty(), "no carriers configured");
        ensure!(
            self.protocol.initial_pool_size > 0
                && self.protocol.initial_pool_size <= self.protocol.max_pool_block,
            "initial_pool_size must be in 1..=max_pool_block"
        );
        ensure!(self.protocol.max_message_size > 0, "max_message_size must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = MiddlewareConfig::from_toml_str("").unwrap();
        assert_eq!(config, MiddlewareConfig::default());
        assert_eq!(config.name_server.base_port(), 10_002);
        assert_eq!(config.name_server.mcast_base_port(), 10_002);
        assert_eq!(config.name_server.bind_address(), "127.0.0.1:10000");
        assert_eq!(config.protocol.carriers[0], "tcp");
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("portmw.toml");

        let config_content = r#"
[name_server]
host = "0.0.0.0"
port = 10100
namespace = "/lab"
mcast_base_port = 11000

[protocol]
carriers = ["tcp", "text"]
initial_pool_size = 256
max_message_size = 4096
"#;

        fs::write(&config_path, config_content).unwrap();

        let config =
            MiddlewareConfig::load_with_prefix(Some(&config_path), "PORTMW_TEST_FILE").unwrap();

        assert_eq!(config.name_server.bind_address(), "0.0.0.0:10100");
        assert_eq!(config.name_server.namespace, "/lab");
        assert_eq!(config.name_server.base_port(), 10_102);
        assert_eq!(config.name_server.mcast_base_port(), 11_000);
        assert_eq!(config.name_server.legacy_step, 10);
        assert_eq!(config.protocol.carriers, vec!["tcp", "text"]);
        assert_eq!(config.protocol.initial_pool_size, 256);
        assert_eq!(config.protocol.max_pool_block, 65_536);
        assert_eq!(config.protocol.max_message_size, 4096);
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("portmw.toml");
        fs::write(&config_path, "[name_server]\nport = 10100\n").unwrap();

        std::env::set_var("PORTMW_TEST_ENV_NAME_SERVER__PORT", "12000");
        std::env::set_var("PORTMW_TEST_ENV_NAME_SERVER__NAMESPACE", "/env");
        let config =
            MiddlewareConfig::load_with_prefix(Some(&config_path), "PORTMW_TEST_ENV").unwrap();
        std::env::remove_var("PORTMW_TEST_ENV_NAME_SERVER__PORT");
        std::env::remove_var("PORTMW_TEST_ENV_NAME_SERVER__NAMESPACE");

        assert_eq!(config.name_server.port, 12_000);
        assert_eq!(config.name_server.namespace, "/env");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(MiddlewareConfig::load_with_prefix(Some(&missing), "PORTMW_TEST_MISSING").is_err());
    }

    #[test]
    fn test_validation() {
        assert!(MiddlewareConfig::from_toml_str("[name_server]\nnamespace = \"root\"\n").is_err());
        assert!(MiddlewareConfig::from_toml_str("[name_server]\nport = 65535\n").is_err());
        assert!(MiddlewareConfig::from_toml_str("[protocol]\ncarriers = []\n").is_err());
        assert!(
            MiddlewareConfig::from_toml_str("[protocol]\ninitial_pool_size = 100000\n").is_err()
        );
        assert!(MiddlewareConfig::from_toml_str("[protocol]\nmax_message_size = 0\n").is_err());
    }
}
