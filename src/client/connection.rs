//! Client connection lifecycle.
//!
//! A [`Client`] owns one transport handle at a time and a supervisor task
//! driving it through the connection states:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──handshake──► Connected
//!      ▲                           │                        │
//!      │                      attempt failed          transport closed
//!      │                           ▼                        ▼
//!      └──────── reconnect delay ◄─┴──────── Disconnected ◄─┘
//! ```
//!
//! # Hooks
//!
//! | Hook | Fires |
//! |------|-------|
//! | `on_connected` | once per handshake, with the root [`Proxy`] |
//! | `on_disconnected` | once per transport handle that closed on its own |
//! | `on_error` | on the `error` event and on transport failures |
//!
//! After [`Client::disconnect`] no further hooks fire for the closed handle.
//! A hook that fires while unset is logged as a warning naming the hook.
//! Hooks run on internal tasks and must not block.
//!
//! # Example
//!
//! ```no_run
//! use socket_rmi::{Client, ClientOptions, args};
//!
//! # async fn example() -> socket_rmi::Result<()> {
//! let client = Client::builder(ClientOptions::new("ws://127.0.0.1:3000")?)
//!     .on_connected(|root| println!("connected: {:?}", root.actions()))
//!     .on_disconnected(|| println!("disconnected"))
//!     .on_error(|err| eprintln!("{err}"))
//!     .build();
//!
//! let root = client.connect().await?;
//! let one: i64 = root.call_value("rpcMethod1", args![]).await?;
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, Error, Result};
use crate::protocol::{EVENT_CONNECTED, EVENT_ERROR, WireValue};
use crate::transport::Socket;

use super::options::ClientOptions;
use super::proxy::Proxy;
use super::session::Session;

// ============================================================================
// Types
// ============================================================================

/// Hook receiving the root proxy of each handshake.
pub type ConnectedHook = Arc<dyn Fn(Proxy) + Send + Sync>;

/// Hook fired when a transport handle closes.
pub type DisconnectedHook = Arc<dyn Fn() + Send + Sync>;

/// Hook receiving connection-scoped errors.
pub type ErrorHook = Arc<dyn Fn(ConnectionError) + Send + Sync>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport handle.
    Disconnected,
    /// Transport handle opening or waiting for the handshake.
    Connecting,
    /// Handshake received; the root proxy is available.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Caller-supplied lifecycle hooks, preserved across reconnects.
#[derive(Clone, Default)]
struct Hooks {
    connected: Option<ConnectedHook>,
    disconnected: Option<DisconnectedHook>,
    error: Option<ErrorHook>,
}

impl Hooks {
    fn connected(&self, root: Proxy) {
        match &self.connected {
            Some(hook) => hook(root),
            None => warn!(hook = "on_connected", "Lifecycle hook fired but not set"),
        }
    }

    fn disconnected(&self) {
        match &self.disconnected {
            Some(hook) => hook(),
            None => warn!(hook = "on_disconnected", "Lifecycle hook fired but not set"),
        }
    }

    fn error(&self, error: ConnectionError) {
        match &self.error {
            Some(hook) => hook(error),
            None => warn!(
                hook = "on_error",
                name = %error.name,
                message = %error.message,
                "Lifecycle hook fired but not set"
            ),
        }
    }
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for a [`Client`].
pub struct ClientBuilder {
    options: ClientOptions,
    hooks: Hooks,
}

impl ClientBuilder {
    /// Sets the hook receiving the root proxy of each handshake.
    #[must_use]
    pub fn on_connected<F>(mut self, hook: F) -> Self
    where
        F: Fn(Proxy) + Send + Sync + 'static,
    {
        self.hooks.connected = Some(Arc::new(hook));
        self
    }

    /// Sets the hook fired when the transport handle closes.
    #[must_use]
    pub fn on_disconnected<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.disconnected = Some(Arc::new(hook));
        self
    }

    /// Sets the hook receiving connection-scoped errors.
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(ConnectionError) + Send + Sync + 'static,
    {
        self.hooks.error = Some(Arc::new(hook));
        self
    }

    /// Builds the client. No connection is opened until [`Client::connect`].
    #[must_use]
    pub fn build(self) -> Client {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (root, _) = watch::channel(None);
        let (stop, _) = watch::channel(false);
        let (done, _) = watch::channel(true);
        let (failure, _) = watch::channel(None);

        Client {
            inner: Arc::new(Inner {
                options: self.options,
                hooks: self.hooks,
                state,
                root,
                socket: Mutex::new(None),
                stop,
                done,
                failure,
                supervisor: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client
// ============================================================================

/// RMI client.
///
/// Cheap to clone; all clones share one connection. Call
/// [`Client::disconnect`] to stop it, dropping handles does not.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// State shared between client handles and the supervisor task.
struct Inner {
    options: ClientOptions,
    hooks: Hooks,
    /// Current lifecycle state.
    state: watch::Sender<ConnectionState>,
    /// Root proxy of the live handshake.
    root: watch::Sender<Option<Proxy>>,
    /// Active transport handle.
    socket: Mutex<Option<Socket>>,
    /// Set by `disconnect()`.
    stop: watch::Sender<bool>,
    /// Set when the supervisor exits.
    done: watch::Sender<bool>,
    /// Latest connection error seen before a handshake.
    failure: watch::Sender<Option<ConnectionError>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    /// Most recent transport failure.
    last_error: Mutex<Option<String>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.options.url().as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Returns a builder for a client with `options`.
    #[inline]
    #[must_use]
    pub fn builder(options: ClientOptions) -> ClientBuilder {
        ClientBuilder {
            options,
            hooks: Hooks::default(),
        }
    }

    /// Creates a client with no hooks set.
    #[inline]
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self::builder(options).build()
    }

    /// Returns the connection options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver observing lifecycle state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Returns the root proxy of the live handshake, if any.
    #[must_use]
    pub fn root(&self) -> Option<Proxy> {
        self.inner.root.borrow().clone()
    }

    /// Connects and returns the root proxy of the first handshake.
    ///
    /// Starts the supervisor if it is not running; `on_connected` fires as
    /// well. The first connection error before a handshake rejects the call.
    /// With reconnection enabled the supervisor keeps retrying in the
    /// background, and `on_connected` reports the eventual handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the transport fails or times out before a
    ///   handshake
    /// - [`Error::Remote`] if the server sends an `error` event before the
    ///   handshake
    /// - [`Error::ConnectionClosed`] if `disconnect()` is called first
    pub async fn connect(&self) -> Result<Proxy> {
        if let Some(root) = self.root() {
            return Ok(root);
        }

        let mut failure_rx = self.inner.failure.subscribe();
        self.ensure_supervisor();

        let mut root_rx = self.inner.root.subscribe();
        let mut done_rx = self.inner.done.subscribe();

        tokio::select! {
            root = root_rx.wait_for(Option::is_some) => {
                if let Some(root) = root.ok().and_then(|root| root.clone()) {
                    return Ok(root);
                }
            }
            Ok(()) = failure_rx.changed() => {
                if let Some(failure) = failure_rx.borrow_and_update().clone() {
                    return Err(failure.into());
                }
            }
            _ = done_rx.wait_for(|done| *done) => {}
        }

        Err(match self.inner.last_error.lock().clone() {
            Some(message) => Error::connection(message),
            None => Error::ConnectionClosed,
        })
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Returns once the supervisor has exited. No hook fires for the closed
    /// handle, `on_disconnected` included.
    pub async fn disconnect(&self) {
        self.inner.stop.send_replace(true);

        let socket = self.inner.socket.lock().clone();
        if let Some(socket) = socket {
            socket.close();
        }

        let supervisor = self.inner.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }

        debug!(url = %self.inner.options.url(), "Client stopped");
    }

    fn ensure_supervisor(&self) {
        let mut supervisor = self.inner.supervisor.lock();

        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        self.inner.stop.send_replace(false);
        self.inner.done.send_replace(false);
        *self.inner.last_error.lock() = None;

        *supervisor = Some(tokio::spawn(Arc::clone(&self.inner).supervise()));
    }
}

// ============================================================================
// Client - Supervisor
// ============================================================================

impl Inner {
    /// Connects, waits for the handle to close, and reconnects.
    async fn supervise(self: Arc<Self>) {
        let mut stop = self.stop.subscribe();
        let url = self.options.url().to_string();

        debug!(url = %url, "Supervisor started");

        loop {
            if *stop.borrow() {
                break;
            }

            self.state.send_replace(ConnectionState::Connecting);

            let attempt = tokio::select! {
                attempt = self.open() => attempt,
                _ = stop.wait_for(|stopped| *stopped) => break,
            };

            match attempt {
                Ok((socket, handshakes)) => self.run_session(socket, handshakes).await,
                Err(e) => {
                    warn!(url = %url, error = %e, "Connection attempt failed");
                    *self.last_error.lock() = Some(e.to_string());
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.connection_error(ConnectionError::transport(e.to_string()), false);
                }
            }

            if *stop.borrow() || !self.options.reconnect() {
                break;
            }

            let delay = self.options.reconnect_delay();
            debug!(url = %url, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        self.done.send_replace(true);

        debug!(url = %url, "Supervisor stopped");
    }

    /// Reports a connection-scoped error.
    ///
    /// Before the handle's first handshake the error also rejects waiting
    /// `connect()` calls. Nothing fires once `disconnect()` has been called.
    fn connection_error(&self, error: ConnectionError, handshaken: bool) {
        if *self.stop.borrow() {
            debug!(name = %error.name, message = %error.message, "Error after disconnect dropped");
            return;
        }

        self.hooks.error(error.clone());

        if !handshaken {
            self.failure.send_replace(Some(error));
        }
    }

    /// Opens a transport handle with the handshake and error events wired.
    async fn open(self: &Arc<Self>) -> Result<(Socket, mpsc::UnboundedReceiver<Value>)> {
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel();
        let handshaken = Arc::new(AtomicBool::new(false));
        let inner = Arc::downgrade(self);

        let connecting = Socket::connect(self.options.url().as_str(), move |socket| {
            let seen = Arc::clone(&handshaken);
            socket.on(EVENT_CONNECTED, move |data, _| {
                seen.store(true, Ordering::SeqCst);
                let _ = handshake_tx.send(data);
            })?;

            socket.on(EVENT_ERROR, move |data, _| {
                let error = serde_json::from_value::<ConnectionError>(data)
                    .unwrap_or_else(|e| ConnectionError::protocol(format!("Malformed error event: {e}")));
                if let Some(inner) = inner.upgrade() {
                    inner.connection_error(error, handshaken.load(Ordering::SeqCst));
                }
            })
        });

        let connect_timeout = self.options.connect_timeout();
        let socket = timeout(connect_timeout, connecting)
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        Ok((socket, handshake_rx))
    }

    /// Drives one transport handle until it closes.
    async fn run_session(&self, socket: Socket, mut handshakes: mpsc::UnboundedReceiver<Value>) {
        *self.socket.lock() = Some(socket.clone());

        // disconnect() may have run while the handle was opening.
        if *self.stop.borrow() {
            socket.close();
        }

        let session = Arc::new(Session::new(socket.clone(), self.options.call_timeout()));
        let mut handshaken = false;

        // The sender lives in the `connected` handler, dropped when the
        // socket's event loop ends.
        while let Some(data) = handshakes.recv().await {
            if *self.stop.borrow() {
                debug!(socket_id = %socket.id(), "Handshake after disconnect ignored");
                continue;
            }

            match WireValue::decode(data) {
                Ok(WireValue::RemoteInstance(descriptor)) => {
                    handshaken = true;
                    let root = Proxy::new(Arc::clone(&session), descriptor);
                    self.root.send_replace(Some(root.clone()));
                    self.state.send_replace(ConnectionState::Connected);

                    info!(url = %self.options.url(), socket_id = %socket.id(), "Connected");
                    self.hooks.connected(root);
                }
                Ok(other) => self.connection_error(
                    ConnectionError::protocol(format!(
                        "handshake carried a {} instead of a RemoteInstance",
                        other.kind()
                    )),
                    handshaken,
                ),
                Err(e) => self.connection_error(ConnectionError::protocol(e.to_string()), handshaken),
            }
        }

        socket.closed().await;

        *self.socket.lock() = None;
        self.root.send_replace(None);
        self.state.send_replace(ConnectionState::Disconnected);

        if let Some(reason) = socket.close_reason() {
            *self.last_error.lock() = Some(reason.clone());
            self.connection_error(ConnectionError::transport(reason), handshaken);
        }

        info!(url = %self.options.url(), socket_id = %socket.id(), "Disconnected");

        if !*self.stop.borrow() {
            self.hooks.disconnected();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
