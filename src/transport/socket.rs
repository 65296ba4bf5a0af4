//! Event socket and event loop.
//!
//! A [`Socket`] is one logical connection carrying named events with optional
//! acknowledgements over a WebSocket.
//!
//! # Event Loop
//!
//! Each socket spawns a tokio task that handles:
//!
//! - Incoming packets (events routed to handlers, acks routed to waiters)
//! - Outgoing emits and acknowledgements from the Rust API
//! - Ack correlation by [`AckId`]
//! - Cleanup when the connection ends: pending acks fail with
//!   [`Error::ConnectionClosed`], handlers are dropped, `closed` flips
//!
//! Handlers run on the event loop task, in delivery order. They must not
//! block; long work belongs in a spawned task.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{AckId, IdGenerator, SocketId};
use crate::protocol::Packet;

// ============================================================================
// Constants
// ============================================================================

/// Maximum outstanding acknowledgements before new emits are rejected.
const MAX_PENDING_ACKS: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Map of ack IDs to reply channels.
type CorrelationMap = FxHashMap<AckId, oneshot::Sender<Result<Value>>>;

/// Write half of a WebSocket stream.
type WsWriter<S> = SplitSink<WebSocketStream<S>, Message>;

/// Handler for one named event.
///
/// Receives the event payload and, when the sender asked for one, the
/// [`Ack`] to reply with.
pub type EventHandler = Arc<dyn Fn(Value, Option<Ack>) + Send + Sync>;

/// Handler for events that have no registered [`EventHandler`].
pub type FallbackHandler = Arc<dyn Fn(&str, Value, Option<Ack>) + Send + Sync>;

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write a packet, registering an ack waiter first if present.
    Emit {
        packet: Packet,
        ack: Option<(AckId, oneshot::Sender<Result<Value>>)>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(AckId),
    /// Close the connection.
    Shutdown,
}

// ============================================================================
// Ack
// ============================================================================

/// Acknowledgement capability for one received event.
///
/// Consumed by [`Ack::send`], so an event is acknowledged at most once.
pub struct Ack {
    id: AckId,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl Ack {
    /// Returns the ack id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> AckId {
        self.id
    }

    /// Sends the acknowledgement payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket has shut down.
    pub fn send(self, data: Value) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Emit {
                packet: Packet::ack(self.id, data),
                ack: None,
            })
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack").field("id", &self.id).finish()
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between socket handles and the event loop.
struct Shared {
    /// Waiters for acknowledgements.
    correlation: Mutex<CorrelationMap>,
    /// Event handlers by event name.
    handlers: RwLock<FxHashMap<String, EventHandler>>,
    /// Handler for unregistered events.
    fallback: RwLock<Option<FallbackHandler>>,
    /// Ack id source.
    ack_ids: IdGenerator,
    /// Flips to `true` once the event loop has terminated.
    closed: watch::Sender<bool>,
    /// Transport error that ended the loop, if any.
    close_reason: Mutex<Option<String>>,
}

// ============================================================================
// Socket
// ============================================================================

/// Event socket over a WebSocket stream.
///
/// # Thread Safety
///
/// `Socket` is `Send + Sync` and cheap to clone; all clones drive the same
/// connection. Dropping handles does not close the connection, call
/// [`Socket::close`].
#[derive(Clone)]
pub struct Socket {
    /// Process-local identifier.
    id: SocketId,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// State shared with the event loop.
    shared: Arc<Shared>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Socket - Constructors
// ============================================================================

impl Socket {
    /// Creates a socket from a WebSocket stream and spawns its event loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (socket, command_rx) = Self::unstarted();
        socket.start(ws_stream, command_rx);
        socket
    }

    /// Creates a socket, runs `setup` on it, then spawns its event loop.
    ///
    /// Handlers registered in `setup` are in place before the first frame is
    /// read, and emits queued in `setup` are written first.
    ///
    /// # Errors
    ///
    /// Returns whatever `setup` fails with; the stream is dropped in that case.
    pub fn with_setup<S, F>(ws_stream: WebSocketStream<S>, setup: F) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnOnce(&Socket) -> Result<()>,
    {
        let (socket, command_rx) = Self::unstarted();

        if let Err(e) = setup(&socket) {
            socket.shared.handlers.write().clear();
            socket.shared.closed.send_replace(true);
            return Err(e);
        }

        socket.start(ws_stream, command_rx);
        Ok(socket)
    }

    /// Opens a client WebSocket to `url` and wraps it.
    ///
    /// # Errors
    ///
    /// - [`Error::WebSocket`] if the WebSocket handshake fails
    /// - whatever `setup` fails with
    pub async fn connect<F>(url: &str, setup: F) -> Result<Self>
    where
        F: FnOnce(&Socket) -> Result<()>,
    {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .inspect_err(|e| debug!(url, error = %e, "WebSocket connect failed"))?;

        debug!(url, "WebSocket connected");

        Self::with_setup(ws_stream, setup)
    }

    fn unstarted() -> (Self, mpsc::UnboundedReceiver<SocketCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let socket = Self {
            id: SocketId::generate(),
            command_tx,
            shared: Arc::new(Shared {
                correlation: Mutex::new(CorrelationMap::default()),
                handlers: RwLock::new(FxHashMap::default()),
                fallback: RwLock::new(None),
                ack_ids: IdGenerator::new(),
                closed,
                close_reason: Mutex::new(None),
            }),
        };

        (socket, command_rx)
    }

    fn start<S>(&self, ws_stream: WebSocketStream<S>, command_rx: mpsc::UnboundedReceiver<SocketCommand>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(Self::run_event_loop(
            self.id,
            ws_stream,
            command_rx,
            self.command_tx.clone(),
            Arc::clone(&self.shared),
        ));
    }
}

// ============================================================================
// Socket - Public API
// ============================================================================

impl Socket {
    /// Returns the socket id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Registers the handler for `event`.
    ///
    /// # Errors
    ///
    /// - [`Error::HandlerExists`] if `event` already has a handler
    /// - [`Error::ConnectionClosed`] if the socket has shut down
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Value, Option<Ack>) + Send + Sync + 'static,
    {
        let event = event.into();

        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let mut handlers = self.shared.handlers.write();
        if handlers.contains_key(&event) {
            return Err(Error::handler_exists(event));
        }

        trace!(socket_id = %self.id, event = %event, "Handler registered");
        handlers.insert(event, Arc::new(handler));
        Ok(())
    }

    /// Removes the handler for `event`.
    ///
    /// Returns `true` if a handler was removed.
    pub fn off(&self, event: &str) -> bool {
        self.shared.handlers.write().remove(event).is_some()
    }

    /// Returns `true` if `event` has a handler.
    #[inline]
    #[must_use]
    pub fn has_handler(&self, event: &str) -> bool {
        self.shared.handlers.read().contains_key(event)
    }

    /// Returns the number of registered handlers.
    #[inline]
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.shared.handlers.read().len()
    }

    /// Sets the handler for events with no registration.
    pub fn set_fallback<F>(&self, handler: F)
    where
        F: Fn(&str, Value, Option<Ack>) + Send + Sync + 'static,
    {
        *self.shared.fallback.write() = Some(Arc::new(handler));
    }

    /// Emits an event without waiting for acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket has shut down.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Emit {
                packet: Packet::event(event, data, None),
                ack: None,
            })
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Emits an event and waits for its acknowledgement.
    ///
    /// # Arguments
    ///
    /// * `event` - Event name
    /// * `data` - Event payload
    /// * `ack_timeout` - Maximum time to wait, `None` waits until the
    ///   connection closes
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection closes first
    /// - [`Error::RequestTimeout`] if the ack does not arrive in time
    /// - [`Error::Protocol`] if too many acks are pending
    pub async fn emit_with_ack(
        &self,
        event: impl Into<String>,
        data: Value,
        ack_timeout: Option<Duration>,
    ) -> Result<Value> {
        let event = event.into();

        {
            let correlation = self.shared.correlation.lock();
            if correlation.len() >= MAX_PENDING_ACKS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_ACKS,
                    "Too many pending acknowledgements"
                );
                return Err(Error::protocol(format!(
                    "Too many pending acknowledgements: {}/{}",
                    correlation.len(),
                    MAX_PENDING_ACKS
                )));
            }
        }

        let ack_id = AckId::new(self.shared.ack_ids.next());
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SocketCommand::Emit {
                packet: Packet::event(event.clone(), data, Some(ack_id)),
                ack: Some((ack_id, response_tx)),
            })
            .map_err(|_| Error::ConnectionClosed)?;

        let Some(ack_timeout) = ack_timeout else {
            return response_rx.await.map_err(|_| Error::ConnectionClosed)?;
        };

        match timeout(ack_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(SocketCommand::RemoveCorrelation(ack_id));

                Err(Error::request_timeout(
                    event,
                    ack_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of acknowledgements still awaited.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.correlation.lock().len()
    }

    /// Returns `true` once the event loop has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Waits until the event loop has terminated.
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Returns the transport error that ended the connection, if any.
    #[must_use]
    pub fn close_reason(&self) -> Option<String> {
        self.shared.close_reason.lock().clone()
    }

    /// Closes the connection.
    ///
    /// Pending acknowledgements fail with [`Error::ConnectionClosed`].
    pub fn close(&self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

// ============================================================================
// Socket - Event Loop
// ============================================================================

impl Socket {
    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        id: SocketId,
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        command_tx: mpsc::UnboundedSender<SocketCommand>,
        shared: Arc<Shared>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut close_reason = None;

        debug!(socket_id = %id, "Event loop started");

        loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &shared, &command_tx);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(socket_id = %id, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(socket_id = %id, error = %e, "WebSocket error");
                            close_reason = Some(e.to_string());
                            break;
                        }

                        None => {
                            debug!(socket_id = %id, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Emit { packet, ack }) => {
                            if let Err(e) = Self::handle_emit(packet, ack, &mut ws_write, &shared).await {
                                error!(socket_id = %id, error = %e, "WebSocket write failed");
                                close_reason = Some(e);
                                break;
                            }
                        }

                        Some(SocketCommand::RemoveCorrelation(ack_id)) => {
                            shared.correlation.lock().remove(&ack_id);
                            debug!(socket_id = %id, %ack_id, "Removed timed-out correlation");
                        }

                        Some(SocketCommand::Shutdown) => {
                            debug!(socket_id = %id, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(socket_id = %id, "Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Emits racing the shutdown must observe a closed channel.
        command_rx.close();
        drop(command_rx);

        Self::fail_pending_acks(&shared);

        // Handlers capture socket handles; dropping them breaks the cycle.
        shared.handlers.write().clear();
        *shared.fallback.write() = None;
        *shared.close_reason.lock() = close_reason;
        shared.closed.send_replace(true);

        debug!(socket_id = %id, "Event loop terminated");
    }

    /// Handles an incoming text frame.
    fn handle_incoming_message(
        text: &str,
        shared: &Shared,
        command_tx: &mpsc::UnboundedSender<SocketCommand>,
    ) {
        let packet = match from_str::<Packet>(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, text = %text, "Failed to parse incoming packet");
                return;
            }
        };

        match packet {
            Packet::Ack { ack_id, data } => {
                let tx = shared.correlation.lock().remove(&ack_id);

                if let Some(tx) = tx {
                    let _ = tx.send(Ok(data));
                } else {
                    warn!(%ack_id, "Ack for unknown event");
                }
            }

            Packet::Event {
                event,
                data,
                ack_id,
            } => {
                let ack = ack_id.map(|id| Ack {
                    id,
                    command_tx: command_tx.clone(),
                });

                // Clone out of the lock; handlers may register new handlers.
                let handler = shared.handlers.read().get(&event).cloned();
                if let Some(handler) = handler {
                    trace!(event = %event, "Dispatching event");
                    handler(data, ack);
                    return;
                }

                let fallback = shared.fallback.read().clone();
                match fallback {
                    Some(fallback) => fallback(&event, data, ack),
                    None => debug!(event = %event, "No handler for event"),
                }
            }
        }
    }

    /// Writes one packet.
    async fn handle_emit<S>(
        packet: Packet,
        ack: Option<(AckId, oneshot::Sender<Result<Value>>)>,
        ws_write: &mut WsWriter<S>,
        shared: &Shared,
    ) -> std::result::Result<(), String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let json = match to_string(&packet) {
            Ok(json) => json,
            Err(e) => {
                if let Some((_, tx)) = ack {
                    let _ = tx.send(Err(Error::Json(e)));
                }
                return Ok(());
            }
        };

        // Store correlation before sending
        let ack_id = ack.map(|(ack_id, tx)| {
            shared.correlation.lock().insert(ack_id, tx);
            ack_id
        });

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(ack_id) = ack_id
                && let Some(tx) = shared.correlation.lock().remove(&ack_id)
            {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
            return Err(e.to_string());
        }

        trace!(?ack_id, "Packet sent");
        Ok(())
    }

    /// Fails all pending acknowledgements with `ConnectionClosed`.
    fn fail_pending_acks(shared: &Shared) {
        let pending: Vec<_> = shared.correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending acknowledgements on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::transport::memory_pair;

    async fn socket_pair() -> (Socket, Socket) {
        let (server, client) = memory_pair().await;
        (Socket::new(server), Socket::new(client))
    }

    #[test]
    fn test_constants() {
        assert_eq!(MAX_PENDING_ACKS, 1024);
    }

    #[tokio::test]
    async fn test_emit_with_ack_round_trip() {
        let (server, client) = socket_pair().await;
        server
            .on("/echo", |data, ack| {
                if let Some(ack) = ack {
                    let _ = ack.send(data);
                }
            })
            .expect("register");

        let reply = client
            .emit_with_ack("/echo", json!([1, "two"]), None)
            .await
            .expect("ack");

        assert_eq!(reply, json!([1, "two"]));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_handler_rejected() {
        let (server, _client) = socket_pair().await;
        server.on("/a", |_, _| {}).expect("first");

        let err = server.on("/a", |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::HandlerExists { .. }));

        assert!(server.off("/a"));
        assert!(!server.has_handler("/a"));
        server.on("/a", |_, _| {}).expect("after off");
    }

    #[tokio::test]
    async fn test_events_are_delivered_in_order() {
        let (server, client) = socket_pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        server
            .on("/seq", move |data, _| {
                let _ = tx.send(data);
            })
            .expect("register");

        for i in 0..20 {
            client.emit("/seq", json!(i)).expect("emit");
        }

        for i in 0..20 {
            assert_eq!(rx.recv().await, Some(json!(i)));
        }
    }

    #[tokio::test]
    async fn test_fallback_receives_unhandled_events() {
        let (server, client) = socket_pair().await;
        server.set_fallback(|event, _data, ack| {
            if let Some(ack) = ack {
                let _ = ack.send(json!(format!("unbound {event}")));
            }
        });

        let reply = client
            .emit_with_ack("/nowhere", Value::Null, None)
            .await
            .expect("ack");
        assert_eq!(reply, json!("unbound /nowhere"));
    }

    #[tokio::test]
    async fn test_ack_timeout() {
        let (_server, client) = socket_pair().await;

        let err = client
            .emit_with_ack("/silent", Value::Null, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RequestTimeout { .. }));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_pending_acks_fail_when_peer_closes() {
        let (server, client) = socket_pair().await;

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.emit_with_ack("/never", Value::Null, None).await })
        };

        // Let the emit reach the wire before closing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.close();

        let result = pending.await.expect("join");
        assert!(matches!(result, Err(Error::ConnectionClosed)));

        client.closed().await;
        assert!(client.is_closed());
        assert_eq!(client.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_socket_rejects_registration_and_emits() {
        let (server, client) = socket_pair().await;
        client.close();
        client.closed().await;
        server.closed().await;

        assert!(matches!(client.on("/x", |_, _| {}), Err(Error::ConnectionClosed)));
        assert!(matches!(client.emit("/x", Value::Null), Err(Error::ConnectionClosed)));
        assert!(client.close_reason().is_none());
    }

    #[tokio::test]
    async fn test_setup_handlers_see_first_event() {
        let (server_ws, client_ws) = memory_pair().await;
        let hits = Arc::new(AtomicUsize::new(0));

        // The peer emits before the other side has started its loop.
        let server = Socket::new(server_ws);
        server.emit("hello", json!(1)).expect("emit");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&hits);
        let _client = Socket::with_setup(client_ws, move |socket| {
            socket.on("hello", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            })
        })
        .expect("setup");

        rx.recv().await.expect("event");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_setup_returns_error() {
        let (_server_ws, client_ws) = memory_pair().await;

        let result = Socket::with_setup(client_ws, |_| Err(Error::protocol("nope")));
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_connect_refused_is_websocket_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let result = Socket::connect(&format!("ws://{addr}"), |_| Ok(())).await;

        let err = result.expect_err("nobody listens on the port");
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.is_connection_error());
    }
}
