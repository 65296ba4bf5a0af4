//! Error types for socket-rmi.
//!
//! This module defines every error type that crosses a module boundary.
//!
//! # Usage
//!
//! All fallible library operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use socket_rmi::{Result, args};
//!
//! async fn example(proxy: &Proxy) -> Result<i64> {
//!     proxy.call_value("rpcMethod2", args![1, 5]).await
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::MalformedReference`], [`Error::UnknownAction`], [`Error::UnknownEvent`], [`Error::NamespaceCollision`], [`Error::HandlerExists`], [`Error::UnboundNamespace`] |
//! | Remote | [`Error::Remote`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Two further types model failures that travel over the wire:
//!
//! - [`InvokeError`] is what a remote method body fails with. It is the input
//!   of error classification: call-scoped failures become the error marker of
//!   that call's reply, connection-scoped ("uncatchable") failures become a
//!   [`ConnectionError`] broadcast on the `error` event.
//! - [`ConnectionError`] is the payload of the `error` event and the argument
//!   of the client's `on_error` hook.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::Namespace;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client or server configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// No handshake received within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while the operation was in flight.
    ///
    /// Every call pending at disconnect is rejected with this error.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A cross-boundary reference could not be decoded.
    #[error("Malformed reference: {message}")]
    MalformedReference {
        /// Description of what was wrong with the value.
        message: String,
    },

    /// Action is not listed on the proxy's descriptor.
    #[error("Unknown action '{action}' in namespace '{namespace}'")]
    UnknownAction {
        /// Namespace of the proxy.
        namespace: Namespace,
        /// Requested action name.
        action: String,
    },

    /// Event is not declared by a remote listener.
    #[error("Unknown event '{event}' in namespace '{namespace}'")]
    UnknownEvent {
        /// Namespace of the listener.
        namespace: Namespace,
        /// Requested event name.
        event: String,
    },

    /// Namespace already has live bindings.
    #[error("Namespace collision: '{namespace}' is already bound")]
    NamespaceCollision {
        /// The colliding namespace.
        namespace: Namespace,
    },

    /// A transport event already has a handler.
    #[error("Handler already registered for event '{event}'")]
    HandlerExists {
        /// The event name.
        event: String,
    },

    /// Instance reference points at a namespace with no bindings.
    #[error("No bindings for namespace '{namespace}'")]
    UnboundNamespace {
        /// The unbound namespace.
        namespace: Namespace,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Call-scoped error raised by the remote method.
    #[error("{message}")]
    Remote {
        /// Message carried by the error marker.
        message: String,
    },

    /// Acknowledgement not received within the call timeout.
    #[error("Call to '{event}' timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Event that was emitted.
        event: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a malformed reference error.
    #[inline]
    pub fn malformed_reference(message: impl Into<String>) -> Self {
        Self::MalformedReference {
            message: message.into(),
        }
    }

    /// Creates an unknown action error.
    #[inline]
    pub fn unknown_action(namespace: Namespace, action: impl Into<String>) -> Self {
        Self::UnknownAction {
            namespace,
            action: action.into(),
        }
    }

    /// Creates an unknown event error.
    #[inline]
    pub fn unknown_event(namespace: Namespace, event: impl Into<String>) -> Self {
        Self::UnknownEvent {
            namespace,
            event: event.into(),
        }
    }

    /// Creates a namespace collision error.
    #[inline]
    pub fn namespace_collision(namespace: Namespace) -> Self {
        Self::NamespaceCollision { namespace }
    }

    /// Creates a handler exists error.
    #[inline]
    pub fn handler_exists(event: impl Into<String>) -> Self {
        Self::HandlerExists {
            event: event.into(),
        }
    }

    /// Creates an unbound namespace error.
    #[inline]
    pub fn unbound_namespace(namespace: Namespace) -> Self {
        Self::UnboundNamespace { namespace }
    }

    /// Creates a remote (call-scoped) error.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(event: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            event: event.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error was raised by the remote method body.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::MalformedReference { .. }
                | Self::UnknownAction { .. }
                | Self::UnknownEvent { .. }
                | Self::NamespaceCollision { .. }
                | Self::HandlerExists { .. }
                | Self::UnboundNamespace { .. }
        )
    }
}

// ============================================================================
// InvokeError
// ============================================================================

/// Failure of a remote method body.
///
/// The variant decides where the failure is delivered:
///
/// | Variant | Delivered as |
/// |---------|--------------|
/// | [`InvokeError::Call`] | error marker on the call's reply, rejecting that call only |
/// | [`InvokeError::Uncatchable`] | `error` event, fired on the client's `on_error` hook |
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// Call-scoped failure.
    #[error("{message}")]
    Call {
        /// Message returned to the caller.
        message: String,
    },

    /// Connection-scoped failure, not attributable to the call that raised it.
    #[error("{name}: {message}")]
    Uncatchable {
        /// Error name (e.g. `"Error"`).
        name: String,
        /// Human-readable message.
        message: String,
    },
}

impl InvokeError {
    /// Creates a call-scoped error.
    #[inline]
    pub fn call(message: impl Into<String>) -> Self {
        Self::Call {
            message: message.into(),
        }
    }

    /// Creates a connection-scoped error.
    #[inline]
    pub fn uncatchable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Uncatchable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates the error returned for a method the object does not implement.
    #[inline]
    pub fn unknown_method(method: &str) -> Self {
        Self::call(format!("Unknown method '{method}'"))
    }

    /// Returns `true` if this error must bypass the call's reply.
    #[inline]
    #[must_use]
    pub fn is_connection_scoped(&self) -> bool {
        matches!(self, Self::Uncatchable { .. })
    }

    /// Returns the error message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Call { message } | Self::Uncatchable { message, .. } => message,
        }
    }
}

impl From<Error> for InvokeError {
    fn from(err: Error) -> Self {
        Self::call(err.to_string())
    }
}

// ============================================================================
// ConnectionError
// ============================================================================

/// Connection-level error delivered to the client's `on_error` hook.
///
/// # Format
///
/// ```json
/// { "name": "Error", "message": "An uncatchable Error" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionError {
    /// Error name.
    #[serde(default = "ConnectionError::default_name")]
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl ConnectionError {
    /// Name used for transport-level failures.
    pub const TRANSPORT: &'static str = "TransportError";

    /// Name used for malformed protocol traffic.
    pub const PROTOCOL: &'static str = "ProtocolError";

    /// Creates a connection error.
    #[inline]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a transport failure error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Self::TRANSPORT, message)
    }

    /// Creates a protocol failure error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(Self::PROTOCOL, message)
    }

    fn default_name() -> String {
        "Error".to_string()
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl From<ConnectionError> for Error {
    /// Transport failures stay connection errors; anything the server sent
    /// on the `error` event surfaces as a remote error.
    fn from(err: ConnectionError) -> Self {
        if err.name == ConnectionError::TRANSPORT {
            Self::connection(err.message)
        } else {
            Self::remote(err.message)
        }
    }
}

impl From<InvokeError> for ConnectionError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Call { message } => Self::new("Error", message),
            InvokeError::Uncatchable { name, message } => Self { name, message },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_remote_error_keeps_original_message() {
        let err = Error::remote("Simple Error");
        assert_eq!(err.to_string(), "Simple Error");
        assert!(err.is_remote());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_is_protocol_error() {
        let err = Error::unknown_action(Namespace::root(), "nope");
        assert!(err.is_protocol_error());
        assert!(Error::namespace_collision(Namespace::from("/a")).is_protocol_error());
        assert!(!Error::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connection_timeout(10).is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::request_timeout("/m", 5).is_timeout());
        assert!(!Error::remote("x").is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_invoke_error_scope() {
        assert!(!InvokeError::call("Simple Error").is_connection_scoped());
        assert!(InvokeError::uncatchable("Error", "boom").is_connection_scoped());
        assert_eq!(InvokeError::uncatchable("Error", "boom").message(), "boom");
    }

    #[test]
    fn test_invoke_error_from_crate_error() {
        let err: InvokeError = Error::protocol("bad").into();
        assert_eq!(err, InvokeError::call("Protocol error: bad"));
    }

    #[test]
    fn test_crate_error_from_connection_error() {
        let err = Error::from(ConnectionError::transport("refused"));
        assert!(matches!(err, Error::Connection { .. }));

        let err = Error::from(ConnectionError::new("Error", "refused by server"));
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "refused by server");
    }

    #[test]
    fn test_connection_error_json() {
        let err = ConnectionError::from(InvokeError::uncatchable("Error", "An uncatchable Error"));
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["name"], "Error");
        assert_eq!(json["message"], "An uncatchable Error");

        let parsed: ConnectionError =
            serde_json::from_str(r#"{"message":"no name"}"#).expect("parse");
        assert_eq!(parsed.name, "Error");
    }
}
