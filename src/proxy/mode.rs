//! Proxy mode specifications
//!
//! ```text
//! regular
//! transparent
//! upstream:http://proxy.local:3128
//! reverse:tls://example.com:443
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Address, TransportProtocol};
use crate::error::Error;

/// Scheme of a reverse proxy target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseScheme {
    Http,
    Https,
    Tcp,
    Tls,
    Udp,
    Dtls,
    Dns,
    Http3,
    Quic,
}

impl ReverseScheme {
    /// Port used when the spec omits one
    fn default_port(self) -> Option<u16> {
        match self {
            ReverseScheme::Http => Some(80),
            ReverseScheme::Https | ReverseScheme::Http3 | ReverseScheme::Quic => Some(443),
            ReverseScheme::Dns => Some(53),
            ReverseScheme::Tcp | ReverseScheme::Tls | ReverseScheme::Udp | ReverseScheme::Dtls => {
                None
            }
        }
    }

    /// Transport the listener for this scheme accepts
    pub fn transport(self) -> TransportProtocol {
        match self {
            ReverseScheme::Udp
            | ReverseScheme::Dtls
            | ReverseScheme::Dns
            | ReverseScheme::Http3
            | ReverseScheme::Quic => TransportProtocol::Udp,
            _ => TransportProtocol::Tcp,
        }
    }

    /// Schemes whose upstream leg is encrypted
    pub fn is_secure(self) -> bool {
        matches!(
            self,
            ReverseScheme::Https
                | ReverseScheme::Tls
                | ReverseScheme::Dtls
                | ReverseScheme::Http3
                | ReverseScheme::Quic
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ReverseScheme::Http => "http",
            ReverseScheme::Https => "https",
            ReverseScheme::Tcp => "tcp",
            ReverseScheme::Tls => "tls",
            ReverseScheme::Udp => "udp",
            ReverseScheme::Dtls => "dtls",
            ReverseScheme::Dns => "dns",
            ReverseScheme::Http3 => "http3",
            ReverseScheme::Quic => "quic",
        }
    }
}

impl FromStr for ReverseScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "http" => ReverseScheme::Http,
            "https" => ReverseScheme::Https,
            "tcp" => ReverseScheme::Tcp,
            "tls" => ReverseScheme::Tls,
            "udp" => ReverseScheme::Udp,
            "dtls" => ReverseScheme::Dtls,
            "dns" => ReverseScheme::Dns,
            "http3" => ReverseScheme::Http3,
            "quic" => ReverseScheme::Quic,
            other => return Err(Error::InvalidMode(format!("unknown scheme {}", other))),
        })
    }
}

/// How clients reach the proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProxyMode {
    /// Explicit HTTP proxy
    Regular,
    /// Explicit HTTP proxy chaining to another HTTP proxy
    Upstream { address: Address },
    /// Traffic redirected to the proxy without the client's knowledge
    Transparent,
    /// Fixed destination
    Reverse { scheme: ReverseScheme, address: Address },
}

impl ProxyMode {
    /// Transport the listener for this mode accepts
    pub fn transport(&self) -> TransportProtocol {
        match self {
            ProxyMode::Reverse { scheme, .. } => scheme.transport(),
            _ => TransportProtocol::Tcp,
        }
    }
}

fn parse_target(spec: &str, default_port: Option<u16>) -> Result<(String, Address), Error> {
    let (scheme, rest) = spec
        .split_once("://")
        .ok_or_else(|| Error::InvalidMode(format!("missing scheme in {}", spec)))?;
    let rest = rest.trim_end_matches('/');
    let address = match rest.parse::<Address>() {
        Ok(addr) => addr,
        Err(_) => match default_port {
            Some(port) if !rest.is_empty() && !rest.contains(':') => match rest.parse() {
                Ok(ip) => Address::ip_port(ip, port),
                Err(_) => Address::domain(rest, port),
            },
            _ => return Err(Error::InvalidMode(format!("invalid target {}", spec))),
        },
    };
    Ok((scheme.to_string(), address))
}

impl FromStr for ProxyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, data) = match s.split_once(':') {
            Some((kind, data)) => (kind, Some(data)),
            None => (s, None),
        };
        match (kind, data) {
            ("regular", None) => Ok(ProxyMode::Regular),
            ("transparent", None) => Ok(ProxyMode::Transparent),
            ("upstream", Some(data)) => {
                let (scheme, address) = parse_target(data, None)?;
                if scheme != "http" {
                    return Err(Error::InvalidMode(format!(
                        "upstream proxies must use http, got {}",
                        scheme
                    )));
                }
                Ok(ProxyMode::Upstream { address })
            }
            ("reverse", Some(data)) => {
                let scheme_name = data.split_once("://").map(|(s, _)| s).unwrap_or(data);
                let scheme: ReverseScheme = scheme_name.parse()?;
                let (_, address) = parse_target(data, scheme.default_port())?;
                Ok(ProxyMode::Reverse { scheme, address })
            }
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProxyMode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProxyMode> for String {
    fn from(mode: ProxyMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyMode::Regular => write!(f, "regular"),
            ProxyMode::Transparent => write!(f, "transparent"),
            ProxyMode::Upstream { address } => write!(f, "upstream:http://{}", address),
            ProxyMode::Reverse { scheme, address } => {
                write!(f, "reverse:{}://{}", scheme.as_str(), address)
            }
        }
    }
}
