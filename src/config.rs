//! Configuration for socks5d.
//!
//! Supports both command-line arguments and an optional TOML configuration
//! file. CLI arguments take precedence over config file values, which in
//! turn take precedence over built-in defaults.

use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::userstore::MAX_USERS;

/// Command-line arguments for the SOCKS5 proxy.
#[derive(Parser, Debug)]
#[command(name = "socks5d")]
#[command(author = "socks5d authors")]
#[command(version)]
#[command(about = "A single-threaded, non-blocking SOCKS5 proxy with a management channel", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SOCKS bind address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// SOCKS bind port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Management channel bind address
    #[arg(short = 'L', long = "mgmt-listen")]
    pub mgmt_listen: Option<String>,

    /// Management channel bind port
    #[arg(short = 'P', long = "mgmt-port")]
    pub mgmt_port: Option<u16>,

    /// Static user credential, "name:pass"; may be repeated up to 10 times
    #[arg(short = 'u', long = "user")]
    pub users: Vec<String>,

    /// Disable the password-disclosure dissector
    #[arg(short = 'N', long)]
    pub no_dissector: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub socks: SocksConfig,
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct SocksConfig {
    #[serde(default = "default_socks_listen")]
    pub listen: String,
    #[serde(default = "default_socks_port")]
    pub port: u16,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default = "default_true")]
    pub dissector: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserEntry {
    pub name: String,
    pub pass: String,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            listen: default_socks_listen(),
            port: default_socks_port(),
            users: Vec::new(),
            dissector: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManagementConfig {
    #[serde(default = "default_mgmt_listen")]
    pub listen: String,
    #[serde(default = "default_mgmt_port")]
    pub port: u16,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            listen: default_mgmt_listen(),
            port: default_mgmt_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

fn default_socks_listen() -> String {
    "0.0.0.0".to_string()
}
fn default_socks_port() -> u16 {
    1080
}
fn default_mgmt_listen() -> String {
    "127.0.0.1".to_string()
}
fn default_mgmt_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./log")
}
fn default_true() -> bool {
    true
}

/// Final resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub socks_listen: String,
    pub socks_port: u16,
    pub mgmt_listen: String,
    pub mgmt_port: u16,
    pub users: Vec<(String, String)>,
    pub dissector_enabled: bool,
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl Config {
    /// Loads configuration from CLI args and an optional TOML file. CLI
    /// arguments take precedence over file values, which take precedence
    /// over built-in defaults. Returns `Err` on exit code 1 (bad arguments).
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref path) = cli.config {
            let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.clone(), e))?;
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        if cli.users.len() > MAX_USERS {
            return Err(ConfigError::TooManyUsers(cli.users.len()));
        }

        let mut users: Vec<(String, String)> = toml_config
            .socks
            .users
            .iter()
            .map(|u| (u.name.clone(), u.pass.clone()))
            .collect();
        for spec in &cli.users {
            let (name, pass) = spec.split_once(':').ok_or_else(|| ConfigError::BadUserSpec(spec.clone()))?;
            users.push((name.to_string(), pass.to_string()));
        }
        if users.len() > MAX_USERS {
            return Err(ConfigError::TooManyUsers(users.len()));
        }

        Ok(Config {
            socks_listen: cli.listen.unwrap_or(toml_config.socks.listen),
            socks_port: cli.port.unwrap_or(toml_config.socks.port),
            mgmt_listen: cli.mgmt_listen.unwrap_or(toml_config.management.listen),
            mgmt_port: cli.mgmt_port.unwrap_or(toml_config.management.port),
            users,
            dissector_enabled: if cli.no_dissector { false } else { toml_config.socks.dissector },
            log_level: if cli.log_level != "info" { cli.log_level } else { toml_config.logging.level },
            log_dir: toml_config.logging.dir,
        })
    }

    pub fn socks_addr(&self) -> SocketAddr {
        format!("{}:{}", self.socks_listen, self.socks_port)
            .parse()
            .expect("socks bind address must be valid after config load")
    }

    pub fn mgmt_addr(&self) -> SocketAddr {
        format!("{}:{}", self.mgmt_listen, self.mgmt_port)
            .parse()
            .expect("management bind address must be valid after config load")
    }
}

/// Configuration loading errors. Maps to process exit code 1.
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    BadUserSpec(String),
    TooManyUsers(usize),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => write!(f, "failed to read config file '{}': {e}", path.display()),
            ConfigError::TomlParse(path, e) => write!(f, "failed to parse config file '{}': {e}", path.display()),
            ConfigError::BadUserSpec(s) => write!(f, "invalid -u value '{s}', expected name:pass"),
            ConfigError::TooManyUsers(n) => write!(f, "too many static users: {n} (max {MAX_USERS})"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = TomlConfig::default();
        assert_eq!(config.socks.listen, "0.0.0.0");
        assert_eq!(config.socks.port, 1080);
        assert_eq!(config.management.listen, "127.0.0.1");
        assert_eq!(config.management.port, 8080);
        assert!(config.socks.dissector);
    }

    #[test]
    fn toml_parsing_round_trips_fields() {
        let toml_str = r#"
            [socks]
            listen = "127.0.0.1"
            port = 1081
            dissector = false

            [[socks.users]]
            name = "alice"
            pass = "secret"

            [management]
            listen = "0.0.0.0"
            port = 9090

            [logging]
            level = "debug"
        "#;
        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.socks.listen, "127.0.0.1");
        assert_eq!(config.socks.port, 1081);
        assert!(!config.socks.dissector);
        assert_eq!(config.socks.users[0].name, "alice");
        assert_eq!(config.management.port, 9090);
        assert_eq!(config.logging.level, "debug");
    }
}
