//! Configuration module for the ex_string client.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::transport::{Endpoint, TlsSettings};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default port for plaintext connections.
pub const DEFAULT_PLAIN_PORT: u16 = 27993;

/// Default port for TLS connections.
pub const DEFAULT_TLS_PORT: u16 = 27994;

/// Command-line arguments for the client
#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(version = "0.1.0")]
#[command(about = "Answers ex_string challenges and prints the secret flag", long_about = None)]
pub struct CliArgs {
    /// Server name (DNS name or IP address)
    pub hostname: Option<String>,

    /// Client identifier sent in HELLO
    pub identifier: Option<String>,

    /// Port to connect to (defaults to 27993, or 27994 with -s)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Use TLS
    #[arg(short = 's', long)]
    pub tls: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Per-message read/write timeout in seconds (0 = no timeout)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Extra PEM certificates to trust for TLS
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Append the received flag to this file
    #[arg(long)]
    pub flag_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub identifier: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: bool,
    /// Per-message timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect and handshake timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    pub ca_file: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            identifier: None,
            port: None,
            tls: false,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ca_file: None,
        }
    }
}

/// Where to record the result
#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    pub flag_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Zero disables the timeout.
fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub identifier: String,
    pub port: u16,
    pub tls: bool,
    pub ca_file: Option<PathBuf>,
    pub io_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub flag_file: Option<PathBuf>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values. CLI takes precedence.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let connection = toml_config.connection;

        let host = cli
            .hostname
            .or(connection.host)
            .ok_or(ConfigError::Missing("hostname"))?;
        let identifier = cli
            .identifier
            .or(connection.identifier)
            .ok_or(ConfigError::Missing("identifier"))?;

        let tls = cli.tls || connection.tls;
        let port = cli.port.or(connection.port).unwrap_or(if tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        });

        Ok(Config {
            host,
            identifier,
            port,
            tls,
            ca_file: cli.ca_file.or(connection.ca_file),
            io_timeout: seconds(cli.timeout.unwrap_or(connection.timeout_secs)),
            connect_timeout: seconds(connection.connect_timeout_secs),
            flag_file: cli.flag_file.or(toml_config.output.flag_file),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// The transport endpoint described by this configuration.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls.then(|| TlsSettings {
                ca_file: self.ca_file.clone(),
            }),
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("No {0} given on the command line or in the config file")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("client").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.connection.port, None);
        assert!(!config.connection.tls);
        assert_eq!(config.connection.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [connection]
            host = "proj1.example.edu"
            identifier = "001234567"
            port = 5000
            tls = true
            timeout_secs = 5
            ca_file = "/etc/ssl/extra.pem"

            [output]
            flag_file = "secret_flags"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.host.as_deref(), Some("proj1.example.edu"));
        assert_eq!(config.connection.identifier.as_deref(), Some("001234567"));
        assert_eq!(config.connection.port, Some(5000));
        assert!(config.connection.tls);
        assert_eq!(config.connection.timeout_secs, 5);
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.output.flag_file, Some(PathBuf::from("secret_flags")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_default_ports() {
        let plain = Config::merge(cli(&["host", "id"]), TomlConfig::default()).unwrap();
        assert_eq!(plain.port, DEFAULT_PLAIN_PORT);
        assert!(!plain.tls);

        let tls = Config::merge(cli(&["-s", "host", "id"]), TomlConfig::default()).unwrap();
        assert_eq!(tls.port, DEFAULT_TLS_PORT);
        assert!(tls.tls);
    }

    #[test]
    fn test_explicit_port_wins() {
        let config =
            Config::merge(cli(&["-s", "-p", "4000", "host", "id"]), TomlConfig::default()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.endpoint().address(), "host:4000");
        assert!(config.endpoint().tls.is_some());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: TomlConfig = toml::from_str(
            r#"
            [connection]
            host = "file-host"
            identifier = "file-id"
            port = 1234
            timeout_secs = 0
        "#,
        )
        .unwrap();

        let config = Config::merge(cli(&["--timeout", "7", "cli-host"]), file).unwrap();
        assert_eq!(config.host, "cli-host");
        assert_eq!(config.identifier, "file-id");
        assert_eq!(config.port, 1234);
        assert_eq!(config.io_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let file: TomlConfig = toml::from_str(
            r#"
            [connection]
            timeout_secs = 0
            connect_timeout_secs = 0
        "#,
        )
        .unwrap();
        let config = Config::merge(cli(&["host", "id"]), file).unwrap();
        assert_eq!(config.io_timeout, None);
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn test_missing_identifier() {
        match Config::merge(cli(&["host"]), TomlConfig::default()) {
            Err(ConfigError::Missing(field)) => assert_eq!(field, "identifier"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
