//! Configuration management for the proxy daemon

use crate::Result;
use config::{Config, ConfigError, Environment, File};
use github_proxy_core::hosts::file::SYSTEM_HOSTS_PATH;
use github_proxy_core::{GITHUB_HOSTS, LOOPBACK, WellKnownHosts};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Prefix for environment overrides, e.g. `GITHUB_PROXY__PROXY__TARGET`
pub const ENV_PREFIX: &str = "GITHUB_PROXY";

/// Main daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// TLS server configuration
    pub server: ServerSettings,

    /// Upstream mirror configuration
    pub proxy: ProxySettings,

    /// Hosts-file override configuration
    pub hosts: HostsSettings,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
}

/// TLS server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind the TLS listener
    pub listen: SocketAddr,

    /// PEM certificate chain
    pub cert_file: PathBuf,

    /// PEM private key
    pub key_file: PathBuf,

    /// Grace period for in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,

    /// Upper bound on a single TLS handshake
    pub handshake_timeout_secs: u64,
}

/// Upstream mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Mirror base URL; requests go to `<target>/https://<host><path>`
    pub target: String,
}

/// Hosts-file override configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostsSettings {
    /// Hosts file to edit
    pub file: PathBuf,

    /// Address the names are pointed at
    pub address: IpAddr,

    /// Names redirected to the proxy
    pub names: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            proxy: ProxySettings::default(),
            hosts: HostsSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 443)),
            cert_file: PathBuf::from("github.com.pem"),
            key_file: PathBuf::from("github.com-key.pem"),
            shutdown_timeout_secs: 5,
            handshake_timeout_secs: 10,
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            target: "https://mirror.ghproxy.com".to_string(),
        }
    }
}

impl Default for HostsSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from(SYSTEM_HOSTS_PATH),
            address: LOOPBACK,
            names: GITHUB_HOSTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ServerSettings {
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Settings {
    /// Load defaults, then the optional file, then `GITHUB_PROXY__*` variables
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong type
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Like [`Settings::load`] with a caller-supplied environment source
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong type
    pub fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        // Start with defaults
        builder = builder.add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            environment
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("hosts.names"),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Check values that cannot be caught by deserialization.
    ///
    /// The proxy target is not checked here; a bad target surfaces as a
    /// `400 Bad Request` on each request.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending key
    pub fn validate(&self) -> Result<()> {
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(invalid(format!("log_level: unknown level {:?}", self.log_level)));
        }
        if self.hosts.names.is_empty() {
            return Err(invalid("hosts.names: at least one host is required"));
        }
        self.well_known_hosts()
            .map_err(|e| invalid(format!("hosts.names: {e}")))?;
        if self.server.shutdown_timeout_secs == 0 {
            return Err(invalid("server.shutdown_timeout_secs must be positive"));
        }
        if self.server.handshake_timeout_secs == 0 {
            return Err(invalid("server.handshake_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// The configured host names as a validated set
    ///
    /// # Errors
    ///
    /// Returns an error if a name is not a valid hostname
    pub fn well_known_hosts(&self) -> github_proxy_core::HostsResult<WellKnownHosts> {
        WellKnownHosts::new(self.hosts.names.iter())
    }
}

fn invalid(message: impl Into<String>) -> crate::DaemonError {
    ConfigError::Message(message.into()).into()
}
