//! Event transport over WebSocket.
//!
//! This module is the socket collaborator the RMI engine runs on: named
//! events, per-emission acknowledgements, and lifecycle notification.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client         │                              │  Server         │
//! │                 │         WebSocket            │                 │
//! │  Socket         │◄────────────────────────────►│  Socket         │
//! │  (event loop)   │   {"type":"event"|"ack"}     │  (event loop)   │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Event socket, ack correlation and event loop |

// ============================================================================
// Imports
// ============================================================================

use tokio::io::DuplexStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Role;

// ============================================================================
// Submodules
// ============================================================================

/// Event socket and event loop.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use socket::{Ack, EventHandler, FallbackHandler, Socket};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size of in-memory WebSocket pairs.
const MEMORY_BUFFER: usize = 64 * 1024;

// ============================================================================
// Functions
// ============================================================================

/// Creates a connected pair of in-memory WebSocket streams.
///
/// Returns `(server_side, client_side)`. Useful for running a server and a
/// client in one process without binding a port.
pub async fn memory_pair() -> (
    WebSocketStream<DuplexStream>,
    WebSocketStream<DuplexStream>,
) {
    let (server_io, client_io) = tokio::io::duplex(MEMORY_BUFFER);

    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    (server, client)
}
