//! Socket RMI - remote method invocation over an event-based WebSocket transport.
//!
//! A server exposes a root object; each client obtains a [`Proxy`] for it,
//! calls its methods as if local, receives further proxies for objects
//! returned by those calls, and hands functions and event-handler targets to
//! the server so server-originated events flow back to client code.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌──────────────────────┐
//! │ Client               │                          │ Server               │
//! │                      │   "/rpcMethod2" + ack    │                      │
//! │  Proxy ──────────────┼─────────────────────────►│  NamespaceRegistry   │
//! │                      │                          │        │             │
//! │                      │   ack: Plain | Instance  │        ▼             │
//! │  Reply ◄─────────────┼──────────────────────────┼─ Invocation          │
//! │                      │        | Error           │        │             │
//! │  Listener/Callback ◄─┼──────────────────────────┼─ ListenerStub        │
//! │  on_error ◄──────────┼──── "error" event ───────┼─ uncatchable errors  │
//! └──────────────────────┘                          └──────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use socket_rmi::{
//!     ActionMap, Arguments, Client, ClientOptions, InvokeError, RemoteObject, Return, Server,
//!     args,
//! };
//!
//! struct Calculator;
//!
//! #[async_trait]
//! impl RemoteObject for Calculator {
//!     async fn invoke(&self, method: &str, args: Arguments) -> Result<Return, InvokeError> {
//!         match method {
//!             "add" => Ok(Return::value(args.value::<i64>(0)? + args.value::<i64>(1)?)?),
//!             other => Err(InvokeError::unknown_method(other)),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> socket_rmi::Result<()> {
//!     let server = Server::builder()
//!         .actions(ActionMap::new().scalar("add", "number"))
//!         .root(|| Arc::new(Calculator))
//!         .bind("127.0.0.1:0")
//!         .await?;
//!
//!     let url = server.ws_url().unwrap_or_default();
//!     let client = Client::new(ClientOptions::new(&url)?);
//!     let root = client.connect().await?;
//!
//!     let sum: i64 = root.call_value("add", args![1, 5]).await?;
//!     assert_eq!(sum, 6);
//!
//!     client.disconnect().await;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`Proxy`], callbacks and listeners |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Packets and cross-boundary references |
//! | [`server`] | [`Server`], [`ActionMap`], [`RemoteObject`] |
//! | [`transport`] | Event socket over WebSocket |

// ============================================================================
// Modules
// ============================================================================

/// Client side: connection lifecycle and proxies.
///
/// - [`Client`] - Connection manager with lifecycle hooks
/// - [`Proxy`] - Callable stand-in for a server object
/// - [`Listener`] - Event-handler target passed to the server
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol: transport packets and cross-boundary references.
pub mod protocol;

/// Server side: exposed objects, namespaces and dispatch.
///
/// - [`Server`] - Accept loop and per-connection registries
/// - [`ActionMap`] - Callable methods of an exposed type
/// - [`RemoteObject`] - Trait implemented by exposed types
pub mod server;

/// Event transport over WebSocket.
///
/// Named events with acknowledgements, used by both sides.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Arg, Callback, Client, ClientBuilder, ClientOptions, ConnectionState, Listener,
    ListenerBuilder, Proxy, Reply,
};

// Error types
pub use error::{ConnectionError, Error, InvokeError, Result};

// Identifier types
pub use identifiers::{AckId, CallbackId, Namespace, SocketId};

// Protocol types
pub use protocol::{InstanceDescriptor, WireValue};

// Server types
pub use server::{
    Action, ActionMap, Argument, Arguments, ListenerStub, NamespaceRegistry, RemoteCallback,
    RemoteObject, Return, Server, ServerBuilder,
};

// Transport types
pub use transport::Socket;
