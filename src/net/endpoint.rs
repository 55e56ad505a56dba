use super::TransportError;
use std::fmt;

/// Port the camera device listens on unless told otherwise.
pub const DEFAULT_DEVICE_PORT: u16 = 8080;

/// Address of a camera device: host (IP or DNS name) plus TCP port.
///
/// An `Endpoint` is immutable once a connection attempt starts; pointing the
/// session somewhere else means calling `connect` again with a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint on the default device port.
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_DEVICE_PORT)
    }

    /// Render the WebSocket URL, validating the host first.
    ///
    /// The host must be a bare IPv4 address or DNS name; schemes, paths and
    /// whitespace are rejected so a typo never turns into a half-valid URL.
    pub fn url(&self) -> Result<String, TransportError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "empty host".to_string(),
            ));
        }
        if host.contains(|c: char| c.is_whitespace())
            || host.contains('/')
            || host.contains(':')
        {
            return Err(TransportError::InvalidEndpoint(format!(
                "malformed host {host:?}"
            )));
        }
        Ok(format!("ws://{}:{}", host, self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_plain_host() {
        let ep = Endpoint::new("192.168.1.100", 8080);
        assert_eq!(ep.url().unwrap(), "ws://192.168.1.100:8080");
    }

    #[test]
    fn test_default_port() {
        let ep = Endpoint::with_default_port("camera.local");
        assert_eq!(ep.port, DEFAULT_DEVICE_PORT);
        assert_eq!(ep.url().unwrap(), "ws://camera.local:8080");
    }

    #[test]
    fn test_rejects_bad_hosts() {
        for host in ["", "   ", "ws://x", "a b", "host/path", "::1"] {
            let ep = Endpoint::new(host, 8080);
            assert!(
                matches!(ep.url(), Err(TransportError::InvalidEndpoint(_))),
                "host {host:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_host_is_trimmed() {
        let ep = Endpoint::new(" 10.0.0.7 ", 9000);
        assert_eq!(ep.url().unwrap(), "ws://10.0.0.7:9000");
    }
}
