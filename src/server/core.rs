//! RMI server.
//!
//! Accepts WebSocket connections and gives each one a fresh root object and
//! its own [`NamespaceRegistry`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               Server                     │
//! │  ┌────────────────────────────────────┐  │
//! │  │ SocketId=a → NamespaceRegistry     │  │
//! │  │ SocketId=b → NamespaceRegistry     │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use socket_rmi::{ActionMap, Arguments, InvokeError, RemoteObject, Return, Server};
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
//! # async fn example() -> socket_rmi::Result<()> {
//! let server = Server::builder()
//!     .actions(ActionMap::new().scalar("add", "number"))
//!     .root(|| Arc::new(Calculator))
//!     .bind("127.0.0.1:0")
//!     .await?;
//!
//! println!("listening on {}", server.ws_url().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{Namespace, SocketId};
use crate::protocol::{EVENT_CONNECTED, WireValue};
use crate::transport::Socket;

use super::action::ActionMap;
use super::object::RemoteObject;
use super::registry::NamespaceRegistry;

// ============================================================================
// Types
// ============================================================================

/// Creates the root object of a new connection.
pub type RootFactory = Arc<dyn Fn() -> Arc<dyn RemoteObject> + Send + Sync>;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for a [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    /// Action map of the root object.
    actions: Option<Arc<ActionMap>>,
    /// Root object factory.
    root: Option<RootFactory>,
}

impl ServerBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the action map of the root object.
    #[inline]
    #[must_use]
    pub fn actions(mut self, actions: impl Into<Arc<ActionMap>>) -> Self {
        self.actions = Some(actions.into());
        self
    }

    /// Sets the factory creating each connection's root object.
    #[inline]
    #[must_use]
    pub fn root<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn RemoteObject> + Send + Sync + 'static,
    {
        self.root = Some(Arc::new(factory));
        self
    }

    /// Builds the server without binding a listener.
    ///
    /// Connections can then be handed in with [`Server::serve_stream`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the action map or root factory is missing.
    pub fn build(self) -> Result<Arc<Server>> {
        let actions = self.actions.ok_or_else(|| {
            Error::config(
                "Root action map is required. Use .actions() to set it.\n\
                 Example: Server::builder().actions(ActionMap::new().plain(\"ping\"))",
            )
        })?;

        let root = self.root.ok_or_else(|| {
            Error::config(
                "Root factory is required. Use .root() to set it.\n\
                 Example: Server::builder().root(|| Arc::new(MyObject))",
            )
        })?;

        let (shutdown, _) = watch::channel(false);

        Ok(Arc::new(Server {
            actions,
            root,
            connections: RwLock::new(FxHashMap::default()),
            local_addr: Mutex::new(None),
            shutdown,
        }))
    }

    /// Builds the server and starts accepting connections on `addr`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the builder is incomplete
    /// - [`Error::Io`] if binding fails
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<Arc<Server>> {
        let server = self.build()?;
        server.listen(addr).await?;
        Ok(server)
    }
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("actions", &self.actions)
            .field("root", &self.root.is_some())
            .finish()
    }
}

// ============================================================================
// Server
// ============================================================================

/// Exposes a root object to every connecting client.
///
/// Thread-safe; shared as `Arc<Server>`.
pub struct Server {
    /// Action map of the root object.
    actions: Arc<ActionMap>,
    /// Root object factory.
    root: RootFactory,
    /// Live connections.
    connections: RwLock<FxHashMap<SocketId, Arc<NamespaceRegistry>>>,
    /// Listener address once bound.
    local_addr: Mutex<Option<SocketAddr>>,
    /// Flips to `true` on shutdown.
    shutdown: watch::Sender<bool>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Returns a new builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the listener address, if bound.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Returns the WebSocket URL clients connect to, if bound.
    ///
    /// Format: `ws://{ip}:{port}`
    #[must_use]
    pub fn ws_url(&self) -> Option<String> {
        self.local_addr().map(|addr| format!("ws://{addr}"))
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns the ids of live connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<SocketId> {
        self.connections.read().keys().copied().collect()
    }

    /// Returns the registry of connection `id`.
    #[must_use]
    pub fn registry(&self, id: SocketId) -> Option<Arc<NamespaceRegistry>> {
        self.connections.read().get(&id).cloned()
    }

    /// Binds a TCP listener on `addr` and spawns the accept loop.
    ///
    /// Returns the bound address (useful with port `0`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn listen(self: &Arc<Self>, addr: impl ToSocketAddrs) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(local_addr);

        tokio::spawn(Arc::clone(self).accept_loop(listener));

        info!(%local_addr, "Server listening");
        Ok(local_addr)
    }

    /// Serves one already-upgraded WebSocket connection.
    ///
    /// Exposes a fresh root object, emits the `connected` handshake and
    /// returns the connection id.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the server is shutting down
    /// - any error raised while exposing the root object
    pub fn serve_stream<S>(self: &Arc<Self>, ws_stream: WebSocketStream<S>) -> Result<SocketId>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if *self.shutdown.borrow() {
            return Err(Error::ConnectionClosed);
        }

        let mut created = None;
        let socket = Socket::with_setup(ws_stream, |socket| {
            let registry = NamespaceRegistry::new(socket.clone());
            let descriptor = registry.expose((self.root)(), Namespace::root(), Arc::clone(&self.actions))?;

            Self::install_fallback(socket, Arc::downgrade(&registry));
            socket.emit(EVENT_CONNECTED, WireValue::from(descriptor).encode())?;

            created = Some(registry);
            Ok(())
        })?;

        let registry = created.ok_or_else(|| Error::protocol("root registry was not created"))?;
        let id = socket.id();
        self.connections.write().insert(id, registry);

        let server = Arc::downgrade(self);
        tokio::spawn(async move {
            socket.closed().await;
            if let Some(server) = server.upgrade() {
                server.connections.write().remove(&id);
            }
            debug!(socket_id = %id, "Connection removed");
        });

        info!(socket_id = %id, "Client connected");
        Ok(id)
    }

    /// Closes every live connection.
    pub fn disconnect_all(&self) {
        let registries: Vec<_> = self.connections.read().values().cloned().collect();

        for registry in registries {
            registry.socket().close();
        }

        debug!("All connections closed");
    }

    /// Stops accepting connections and closes every live connection.
    pub fn shutdown(&self) {
        info!("Server shutting down");

        self.shutdown.send_replace(true);
        self.disconnect_all();
    }

    /// Returns `true` once [`Server::shutdown`] was called.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// ============================================================================
// Server - Accept Loop
// ============================================================================

impl Server {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    debug!("Accept loop shutting down");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let server = Arc::downgrade(&self);
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_connection(server, stream, addr).await {
                                warn!(error = %e, ?addr, "Connection handling failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                },
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one TCP connection and serves it.
    async fn handle_connection(server: Weak<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let server = server.upgrade().ok_or(Error::ConnectionClosed)?;
        server.serve_stream(ws_stream)?;

        Ok(())
    }

    /// Answers call events that reach no binding with an error marker.
    fn install_fallback(socket: &Socket, registry: Weak<NamespaceRegistry>) {
        socket.set_fallback(move |event, _data, ack| {
            let (namespace, action) = event.rsplit_once('/').unwrap_or(("", event));
            let namespace = Namespace::from(namespace);

            let bound = registry
                .upgrade()
                .is_some_and(|registry| registry.contains(&namespace));

            let err = if bound {
                Error::unknown_action(namespace, action)
            } else {
                Error::unbound_namespace(namespace)
            };

            debug!(event, error = %err, "Unhandled event");

            if let Some(ack) = ack {
                let _ = ack.send(WireValue::error(err.to_string()).encode());
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use crate::error::InvokeError;
    use crate::server::object::{Arguments, Return};
    use crate::transport::memory_pair;

    struct Ping;

    #[async_trait]
    impl RemoteObject for Ping {
        async fn invoke(&self, _method: &str, _args: Arguments) -> std::result::Result<Return, InvokeError> {
            Ok(Return::value("pong")?)
        }
    }

    fn server() -> Arc<Server> {
        Server::builder()
            .actions(ActionMap::new().plain("ping"))
            .root(|| Arc::new(Ping))
            .build()
            .expect("build")
    }

    #[test]
    fn test_builder_requires_actions_and_root() {
        let err = Server::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = Server::builder()
            .actions(ActionMap::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Root factory"));
    }

    #[tokio::test]
    async fn test_listen_reports_address() {
        let server = server();
        assert!(server.ws_url().is_none());

        let addr = server.listen("127.0.0.1:0").await.expect("listen");
        assert!(addr.port() > 0);
        assert_eq!(server.ws_url(), Some(format!("ws://{addr}")));

        server.shutdown();
        assert!(server.is_shutdown());
    }

    #[tokio::test]
    async fn test_serve_stream_sends_handshake() {
        let server = server();
        let (server_ws, client_ws) = memory_pair().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = Socket::with_setup(client_ws, move |socket| {
            socket.on(EVENT_CONNECTED, move |data, _| {
                let _ = tx.send(data);
            })
        })
        .expect("client");

        let id = server.serve_stream(server_ws).expect("serve");

        let handshake = rx.recv().await.expect("handshake");
        assert_eq!(
            handshake,
            json!({"kind": "RemoteInstance", "namespace": "", "actions": ["ping"]})
        );
        assert_eq!(server.connection_count(), 1);
        let registry = server.registry(id).expect("registry");

        client.close();
        registry.socket().closed().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unbound_events_get_error_marker() {
        let server = server();
        let (server_ws, client_ws) = memory_pair().await;
        let client = Socket::new(client_ws);
        server.serve_stream(server_ws).expect("serve");

        let reply = client
            .emit_with_ack("/nope", Value::Null, None)
            .await
            .expect("ack");
        let WireValue::Error(marker) = WireValue::decode(reply).expect("decode") else {
            panic!("expected an error marker");
        };
        assert!(marker.message.contains("nope"));

        let reply = client
            .emit_with_ack("/Gone.3/ping", Value::Null, None)
            .await
            .expect("ack");
        let WireValue::Error(marker) = WireValue::decode(reply).expect("decode") else {
            panic!("expected an error marker");
        };
        assert!(marker.message.contains("/Gone.3"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_streams() {
        let server = server();
        server.shutdown();

        let (server_ws, _client_ws) = memory_pair().await;
        assert!(matches!(server.serve_stream(server_ws), Err(Error::ConnectionClosed)));
    }
}
