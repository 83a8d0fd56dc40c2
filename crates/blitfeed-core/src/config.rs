//! Replay Configuration
//!
//! The single set of options fixed for the lifetime of the process. Values are
//! assembled by the CLI (defaults, optional TOML file, command-line flags) and
//! handed to the supervisor and session at construction time.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ----------------------------------------------------------------------------
// Role and Transport
// ----------------------------------------------------------------------------

/// Which side of the conversation we play
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Wire transport used for the replayed session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Udp => write!(f, "udp"),
        }
    }
}

// ----------------------------------------------------------------------------
// Endpoint
// ----------------------------------------------------------------------------

/// A `host:port` pair as written by the operator
///
/// Hostnames are kept unresolved; resolution happens when the runtime binds or
/// connects. IPv6 literals must be bracketed (`[::1]:9000`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The endpoint as a socket address when the host is an IP literal
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '[' in IPv6 address"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| invalid("expected ':port' after IPv6 address"))?;
            if host.parse::<std::net::Ipv6Addr>().is_err() {
                return Err(invalid("not an IPv6 address"));
            }
            (host, port)
        } else {
            let (host, port) = input
                .rsplit_once(':')
                .ok_or_else(|| invalid("expected host:port"))?;
            if host.contains(':') {
                return Err(invalid("IPv6 addresses must be written as [addr]:port"));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port must be a number between 0 and 65535"))?;

        Ok(Endpoint::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ----------------------------------------------------------------------------
// Session Flags
// ----------------------------------------------------------------------------

/// Per-session pacing and termination policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFlags {
    /// Send the first feed message before the peer says anything
    pub go_first: bool,
    /// Wait for operator confirmation before each scripted send
    pub step: bool,
    /// Close the connection once the feed is exhausted
    pub close_at_end: bool,
    /// Suppress the feed-exhausted notice
    pub squelch_exhausted: bool,
}

// ----------------------------------------------------------------------------
// Replay Configuration
// ----------------------------------------------------------------------------

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub role: Role,
    pub transport: TransportKind,
    /// Remote `host:port` (client mode)
    pub target: Option<Endpoint>,
    /// Listen address (server mode) or local bind address (client mode)
    pub listen: Option<Endpoint>,
    /// Blit listener address; no blit channel when absent
    pub blit: Option<Endpoint>,
    /// Restart the session forever after it closes
    pub persist: bool,
    #[serde(flatten)]
    pub flags: SessionFlags,
}

impl ReplayConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.role {
            Role::Client => {
                if self.target.is_none() {
                    return Err(ConfigError::MissingTarget);
                }
            }
            Role::Server => {
                if let Some(target) = &self.target {
                    return Err(ConfigError::UnexpectedTarget {
                        target: target.to_string(),
                    });
                }
                if self.listen.is_none() {
                    return Err(ConfigError::MissingListen);
                }
            }
        }

        // UDP and TCP ports live in different namespaces
        if let (Some(blit), Some(listen)) = (&self.blit, &self.listen) {
            if self.transport == TransportKind::Tcp && blit == listen && blit.port() != 0 {
                return Err(ConfigError::BlitConflictsWithListen {
                    addr: blit.to_string(),
                });
            }
        }

        Ok(())
    }

    /// One-line description for startup logging
    pub fn summary(&self) -> String {
        let endpoint = match self.role {
            Role::Client => self.target.as_ref(),
            Role::Server => self.listen.as_ref(),
        };
        let mut out = format!("{} {}", self.transport, self.role);
        if let Some(endpoint) = endpoint {
            out.push_str(&format!(" {}", endpoint));
        }
        if let Some(blit) = &self.blit {
            out.push_str(&format!(", blit on {}", blit));
        }
        out
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parsing() {
        let ep: Endpoint = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.socket_addr(), Some("127.0.0.1:8080".parse().unwrap()));

        let named: Endpoint = "example.com:443".parse().unwrap();
        assert_eq!(named.host(), "example.com");
        assert!(named.socket_addr().is_none());

        let v6: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_endpoint_rejects_malformed() {
        for input in ["localhost", ":80", "host:", "host:99999", "::1:80", "[::1]80", "[zz]:1"] {
            assert!(
                matches!(
                    input.parse::<Endpoint>(),
                    Err(ConfigError::InvalidEndpoint { .. })
                ),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_client_requires_target() {
        let config = ReplayConfig::default();
        assert_eq!(config.validate(), Err(ConfigError::MissingTarget));

        let config = ReplayConfig {
            target: Some("127.0.0.1:7".parse().unwrap()),
            ..ReplayConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_rules() {
        let mut config = ReplayConfig {
            role: Role::Server,
            ..ReplayConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingListen));

        config.listen = Some("0.0.0.0:4000".parse().unwrap());
        assert!(config.validate().is_ok());

        config.target = Some("10.0.0.1:1".parse().unwrap());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnexpectedTarget { .. })
        ));

        config.target = None;
        config.blit = config.listen.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlitConflictsWithListen { .. })
        ));

        config.transport = TransportKind::Udp;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let config: ReplayConfig = toml::from_str(
            r#"
            role = "server"
            transport = "udp"
            listen = "0.0.0.0:5353"
            blit = "127.0.0.1:6000"
            go_first = true
            close_at_end = true
            "#,
        )
        .unwrap();

        assert_eq!(config.role, Role::Server);
        assert_eq!(config.transport, TransportKind::Udp);
        assert_eq!(config.listen.as_ref().map(Endpoint::port), Some(5353));
        assert!(config.flags.go_first);
        assert!(config.flags.close_at_end);
        assert!(!config.flags.step);
        assert!(!config.persist);
        assert_eq!(
            config.summary(),
            "udp server 0.0.0.0:5353, blit on 127.0.0.1:6000"
        );
    }

    #[test]
    fn test_config_rejects_bad_endpoint_in_toml() {
        let result: Result<ReplayConfig, _> = toml::from_str(r#"target = "nope""#);
        assert!(result.is_err());
    }
}
