//! Session configuration and server address parsing.
//!
//! `ServerAddr` owns the `"host:port"` convention so front-ends can pass the
//! string straight through; the port defaults to [`DEFAULT_PORT`] when
//! omitted, matching the `localhost:7777` convention of pub/sub SQL servers.

use std::{fmt, str::FromStr, time::Duration};

use crate::error::ConnectError;

/// Port assumed when an address string carries no explicit port.
pub const DEFAULT_PORT: u16 = 7777;

/// Address of a pub/sub SQL server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddr {
    host: String,
    port: u16,
}

impl ServerAddr {
    /// Create an address from explicit parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host component.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Port component.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }
}

impl FromStr for ServerAddr {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConnectError::InvalidAddress(s.to_owned()));
        }
        match s.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(ConnectError::InvalidAddress(s.to_owned()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConnectError::InvalidAddress(s.to_owned()))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Tunables for a [`crate::session::Session`].
///
/// The consuming setters follow the builder convention, so configuration
/// reads as a chain:
///
/// ```
/// use std::time::Duration;
///
/// use pubsql::config::SessionConfig;
///
/// let config = SessionConfig::default()
///     .connect_timeout(Duration::from_secs(2))
///     .push_queue_capacity(64);
/// assert_eq!(config.connect_timeout_value(), Duration::from_secs(2));
/// ```
#[derive(Clone, Debug)]
pub struct SessionConfig {
    connect_timeout: Duration,
    max_frame_length: usize,
    max_query_len: usize,
    push_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_length: 1024 * 1024,
            max_query_len: 64 * 1024,
            push_queue_capacity: 32,
        }
    }
}

impl SessionConfig {
    /// Maximum time allowed for connect plus handshake.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Maximum accepted wire frame length in bytes.
    #[must_use]
    pub const fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }

    /// Maximum accepted query text length in bytes.
    #[must_use]
    pub const fn max_query_len(mut self, len: usize) -> Self {
        self.max_query_len = len;
        self
    }

    /// Capacity of each subscription listener's push queue.
    #[must_use]
    pub const fn push_queue_capacity(mut self, capacity: usize) -> Self {
        self.push_queue_capacity = capacity;
        self
    }

    /// Inspect the configured connect timeout.
    #[must_use]
    pub const fn connect_timeout_value(&self) -> Duration { self.connect_timeout }

    /// Inspect the configured maximum frame length.
    #[must_use]
    pub const fn max_frame_length_value(&self) -> usize { self.max_frame_length }

    /// Inspect the configured maximum query length.
    #[must_use]
    pub const fn max_query_len_value(&self) -> usize { self.max_query_len }

    /// Inspect the configured push queue capacity.
    #[must_use]
    pub const fn push_queue_capacity_value(&self) -> usize { self.push_queue_capacity }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let addr: ServerAddr = "localhost:7777".parse().expect("valid address");
        assert_eq!(addr.host(), "localhost");
        assert_eq!(addr.port(), 7777);
    }

    #[test]
    fn bare_host_gets_default_port() {
        let addr: ServerAddr = "db.example.com".parse().expect("valid address");
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects_empty_and_bad_port() {
        assert!("".parse::<ServerAddr>().is_err());
        assert!(":7777".parse::<ServerAddr>().is_err());
        assert!("host:notaport".parse::<ServerAddr>().is_err());
        assert!("host:99999".parse::<ServerAddr>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let addr = ServerAddr::new("localhost", 7777);
        assert_eq!(addr.to_string(), "localhost:7777");
    }
}
