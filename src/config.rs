//! Configuration module for layerwise
//!
//! JSON configuration. The `options` section is compiled into an
//! [`Options`] snapshot that every layer reads through its context.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::proxy::ProxyMode;
use crate::router::HostPatterns;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Listeners, one proxy mode each
    #[serde(default)]
    pub listen: Vec<ListenConfig>,

    /// Layer selection options
    #[serde(default)]
    pub options: OptionsConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Example configuration: a TLS and a TCP reverse proxy.
    ///
    /// Explicit and transparent HTTP modes need a layer factory that
    /// implements HTTP, so the example sticks to reverse modes.
    pub fn example() -> Self {
        Config {
            log: LogConfig::default(),
            listen: vec![
                ListenConfig {
                    tag: "reverse-in".to_string(),
                    listen: "127.0.0.1:8443".to_string(),
                    mode: ProxyMode::Reverse {
                        scheme: crate::proxy::ReverseScheme::Tls,
                        address: crate::common::Address::domain("example.com", 443),
                    },
                },
                ListenConfig {
                    tag: "ssh-in".to_string(),
                    listen: "127.0.0.1:2222".to_string(),
                    mode: ProxyMode::Reverse {
                        scheme: crate::proxy::ReverseScheme::Tcp,
                        address: crate::common::Address::domain("localhost", 22),
                    },
                },
            ],
            options: OptionsConfig::default(),
        }
    }

    /// Compile the options section
    pub fn options(&self) -> Result<Options> {
        Options::from_config(&self.options)
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A listening socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Tag used as log prefix
    pub tag: String,
    /// `ip:port` to bind
    pub listen: String,
    /// Proxy mode spec, e.g. `reverse:tls://example.com:443`
    pub mode: ProxyMode,
}

/// When to connect upstream in modes with a known destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStrategy {
    /// Connect as soon as the client connects
    #[default]
    Eager,
    /// Connect once a protocol layer asks for it
    Lazy,
}

/// Raw `options` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Regexes of hosts to pass through untouched
    #[serde(default)]
    pub ignore_hosts: Vec<String>,

    /// Regexes of hosts to intercept; everything else passes through
    #[serde(default)]
    pub allow_hosts: Vec<String>,

    /// Regexes of hosts always handled as raw TCP
    #[serde(default)]
    pub tcp_hosts: Vec<String>,

    /// Regexes of hosts always handled as raw UDP
    #[serde(default)]
    pub udp_hosts: Vec<String>,

    /// Fall back to raw TCP for traffic that does not look like HTTP
    #[serde(default = "default_rawtcp")]
    pub rawtcp: bool,

    /// Record ignored connections instead of relaying them silently
    #[serde(default)]
    pub show_ignored_hosts: bool,

    /// Log every event and command passing through each layer
    #[serde(default)]
    pub proxy_debug: bool,

    #[serde(default)]
    pub connection_strategy: ConnectionStrategy,

    /// Keep the client's Host/SNI towards reverse proxy targets
    #[serde(default)]
    pub keep_host_header: bool,
}

fn default_rawtcp() -> bool {
    true
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            ignore_hosts: Vec::new(),
            allow_hosts: Vec::new(),
            tcp_hosts: Vec::new(),
            udp_hosts: Vec::new(),
            rawtcp: default_rawtcp(),
            show_ignored_hosts: false,
            proxy_debug: false,
            connection_strategy: ConnectionStrategy::default(),
            keep_host_header: false,
        }
    }
}

/// Compiled, read-only options shared by every layer
#[derive(Debug, Clone)]
pub struct Options {
    pub ignore_hosts: HostPatterns,
    pub allow_hosts: HostPatterns,
    pub tcp_hosts: HostPatterns,
    pub udp_hosts: HostPatterns,
    pub rawtcp: bool,
    pub show_ignored_hosts: bool,
    pub proxy_debug: bool,
    pub connection_strategy: ConnectionStrategy,
    pub keep_host_header: bool,
}

impl Options {
    pub fn from_config(config: &OptionsConfig) -> Result<Self> {
        Ok(Self {
            ignore_hosts: HostPatterns::new(&config.ignore_hosts)?,
            allow_hosts: HostPatterns::new(&config.allow_hosts)?,
            tcp_hosts: HostPatterns::new(&config.tcp_hosts)?,
            udp_hosts: HostPatterns::new(&config.udp_hosts)?,
            rawtcp: config.rawtcp,
            show_ignored_hosts: config.show_ignored_hosts,
            proxy_debug: config.proxy_debug,
            connection_strategy: config.connection_strategy,
            keep_host_header: config.keep_host_header,
        })
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ignore_hosts: HostPatterns::default(),
            allow_hosts: HostPatterns::default(),
            tcp_hosts: HostPatterns::default(),
            udp_hosts: HostPatterns::default(),
            rawtcp: default_rawtcp(),
            show_ignored_hosts: false,
            proxy_debug: false,
            connection_strategy: ConnectionStrategy::default(),
            keep_host_header: false,
        }
    }
}
