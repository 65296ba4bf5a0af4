//! Client connection options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use socket_rmi::ClientOptions;
//!
//! let options = ClientOptions::new("ws://127.0.0.1:8080")?
//!     .with_reconnect_delay(Duration::from_millis(500))
//!     .with_call_timeout(Duration::from_secs(5));
//!
//! assert!(options.reconnect());
//! # Ok::<(), socket_rmi::Error>(())
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ClientOptions
// ============================================================================

/// Connection options of a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Server WebSocket URL.
    url: Url,
    /// Reconnect automatically after the connection drops.
    reconnect: bool,
    /// Delay between reconnection attempts.
    reconnect_delay: Duration,
    /// Time allowed for the WebSocket handshake.
    connect_timeout: Duration,
    /// Per-call acknowledgement timeout; `None` waits indefinitely.
    call_timeout: Option<Duration>,
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options for `url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `url` does not parse or its scheme is
    /// neither `ws` nor `wss`.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("Invalid URL '{url}': {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported URL scheme '{}': expected ws or wss",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
        })
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the delay between reconnection attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the time allowed for the WebSocket handshake.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-call acknowledgement timeout.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ClientOptions {
    /// Returns the server URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns `true` if reconnection is enabled.
    #[inline]
    #[must_use]
    pub const fn reconnect(&self) -> bool {
        self.reconnect
    }

    /// Returns the reconnection delay.
    #[inline]
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the per-call timeout.
    #[inline]
    #[must_use]
    pub const fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::new("ws://localhost:3000").expect("options");
        assert_eq!(options.url().as_str(), "ws://localhost:3000/");
        assert!(options.reconnect());
        assert_eq!(options.reconnect_delay(), DEFAULT_RECONNECT_DELAY);
        assert_eq!(options.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(options.call_timeout().is_none());
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new("wss://example.com/rmi")
            .expect("options")
            .with_reconnect(false)
            .with_reconnect_delay(Duration::from_secs(1))
            .with_connect_timeout(Duration::from_secs(2))
            .with_call_timeout(Duration::from_secs(3));

        assert!(!options.reconnect());
        assert_eq!(options.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(options.connect_timeout(), Duration::from_secs(2));
        assert_eq!(options.call_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(ClientOptions::new("not a url"), Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_non_websocket_scheme() {
        let err = ClientOptions::new("http://localhost:3000").unwrap_err();
        assert!(err.to_string().contains("http"));
    }
}
