//! Engine endpoint parsing.

use std::fmt;

/// Host used when the configured endpoint cannot be parsed.
pub const DEFAULT_HOST: &str = "localhost";
/// Port used when the configured endpoint cannot be parsed.
pub const DEFAULT_PORT: u16 = 8822;

/// Network location of the verification engine.
///
/// Parsed once from configuration and immutable afterwards. Malformed input
/// never fails: it falls back to `localhost:8822`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Build an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, splitting on the first colon.
    ///
    /// An empty host, an empty port, or a port that is not a valid `u16`
    /// yields [`Endpoint::default`].
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        let Some((host, port)) = raw.trim().split_once(':') else {
            return Self::default();
        };
        if host.is_empty() || port.is_empty() {
            return Self::default();
        }
        port.parse::<u16>()
            .map_or_else(|_| Self::default(), |number| Self::new(host, number))
    }

    /// Host component.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Port component.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }

    /// Plain-text gRPC URI for this endpoint.
    #[must_use]
    pub fn uri(&self) -> String { format!("http://{}:{}", self.host, self.port) }
}

impl Default for Endpoint {
    fn default() -> Self { Self::new(DEFAULT_HOST, DEFAULT_PORT) }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
