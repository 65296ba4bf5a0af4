//! Client side of the RMI engine.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`Client`], lifecycle hooks and reconnection |
//! | `options` | [`ClientOptions`] |
//! | `proxy` | [`Proxy`], call arguments and replies |
//! | `handler` | [`Callback`] and [`Listener`] passed to the server |

// ============================================================================
// Submodules
// ============================================================================

/// Connection lifecycle.
pub mod connection;

/// Callbacks and listeners.
pub mod handler;

/// Connection options.
pub mod options;

/// Proxies.
pub mod proxy;

/// Per-connection proxy state.
mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Client, ClientBuilder, ConnectedHook, ConnectionState, DisconnectedHook, ErrorHook};
pub use handler::{Callback, LISTENER_EVENT_PREFIX, Listener, ListenerBuilder};
pub use options::{ClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY};
pub use proxy::{Arg, Proxy, Reply};
