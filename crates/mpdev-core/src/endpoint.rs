//! Device endpoints
//!
//! An endpoint names one physical device channel. It is the key for session
//! ownership and decides between serial and network behavior.
//!
//! Accepted forms:
//! - `scheme://address` - a network URL (e.g. `esp://192.168.4.1`), used for OTA
//! - `host:port` - a socket address
//! - anything else - a serial port (`/dev/ttyUSB0`, `COM3`)

use crate::error::{Error, Result};
use core::fmt;
use core::str::FromStr;

/// A physical device channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// Serial port name
    Serial(String),
    /// `host:port` socket address
    Socket {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
    /// `scheme://address` URL
    Url {
        /// URL scheme without `://`
        scheme: String,
        /// Everything after `://`
        address: String,
    },
}

impl Endpoint {
    /// Parse an endpoint string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidEndpoint("empty endpoint".into()));
        }

        if let Some((scheme, address)) = s.split_once("://") {
            if scheme.is_empty() || address.is_empty() {
                return Err(Error::InvalidEndpoint(format!(
                    "malformed URL endpoint: {}",
                    s
                )));
            }
            return Ok(Endpoint::Url {
                scheme: scheme.to_ascii_lowercase(),
                address: address.to_string(),
            });
        }

        if let Some((host, port_str)) = s.rsplit_once(':') {
            let looks_like_path = host.contains('/') || host.contains('\\');
            if !host.is_empty() && !looks_like_path {
                if let Ok(port) = port_str.parse::<u16>() {
                    return Ok(Endpoint::Socket {
                        host: host.to_string(),
                        port,
                    });
                }
            }
        }

        Ok(Endpoint::Serial(s.to_string()))
    }

    /// True for socket addresses and URLs
    pub fn is_network(&self) -> bool {
        !matches!(self, Endpoint::Serial(_))
    }

    /// Serial port name, if this is a serial endpoint
    pub fn serial_port(&self) -> Option<&str> {
        match self {
            Endpoint::Serial(name) => Some(name),
            _ => None,
        }
    }

    /// `host:port` for socket endpoints
    pub fn socket_address(&self) -> Option<String> {
        match self {
            Endpoint::Socket { host, port } => Some(format!("{}:{}", host, port)),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial(name) => write!(f, "{}", name),
            Endpoint::Socket { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Url { scheme, address } => write!(f, "{}://{}", scheme, address),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::parse(s)
    }
}
