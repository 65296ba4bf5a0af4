//! State shared by the proxies of one transport handle.
//!
//! Callback and listener ids are allocated here, so they are unique per
//! connection and restart from 1 after a reconnect.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, IdGenerator, Namespace};
use crate::protocol::{CallbackDescriptor, ListenerDescriptor, WireValue, into_positional};
use crate::transport::Socket;

use super::handler::{Callback, Listener};
use super::proxy::{Arg, Proxy};

// ============================================================================
// Session
// ============================================================================

/// One transport handle and its reference counters.
#[derive(Debug)]
pub(crate) struct Session {
    socket: Socket,
    callback_ids: IdGenerator,
    listener_ids: IdGenerator,
    call_timeout: Option<Duration>,
}

impl Session {
    pub(crate) fn new(socket: Socket, call_timeout: Option<Duration>) -> Self {
        Self {
            socket,
            callback_ids: IdGenerator::new(),
            listener_ids: IdGenerator::new(),
            call_timeout,
        }
    }

    #[inline]
    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Emits a call and waits for its raw reply.
    pub(crate) async fn request(&self, event: String, args: Value) -> Result<Value> {
        self.socket.emit_with_ack(event, args, self.call_timeout).await
    }

    /// Marshals the arguments of one call.
    ///
    /// All or nothing: when one argument fails, the subscriptions made for
    /// the arguments before it are removed again.
    pub(crate) fn marshal_all(&self, namespace: &Namespace, args: Vec<Arg>) -> Result<Vec<WireValue>> {
        let mut wire = Vec::with_capacity(args.len());

        for arg in args {
            match self.marshal(namespace, arg) {
                Ok(value) => wire.push(value),
                Err(e) => {
                    wire.iter().for_each(|value| self.unsubscribe(value));
                    return Err(e);
                }
            }
        }

        Ok(wire)
    }

    /// Marshals one outgoing argument passed through a proxy at `namespace`.
    pub(crate) fn marshal(&self, namespace: &Namespace, arg: Arg) -> Result<WireValue> {
        match arg {
            Arg::Value(value) => Ok(WireValue::plain(value)),
            Arg::Instance(proxy) => self.marshal_instance(&proxy),
            Arg::Callback(callback) => self.marshal_callback(namespace, callback),
            Arg::Listener(listener) => self.marshal_listener(namespace, &listener),
        }
    }

    /// Namespaces restart on every connection, so a proxy is only
    /// meaningful on the socket it came from.
    fn marshal_instance(&self, proxy: &Proxy) -> Result<WireValue> {
        let owner = proxy.session().socket();

        if owner.id() != self.socket.id() {
            if owner.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            return Err(Error::protocol(format!(
                "proxy for '{}' belongs to another connection",
                proxy.namespace()
            )));
        }

        Ok(WireValue::RemoteInstance(proxy.descriptor().clone()))
    }

    fn marshal_callback(&self, namespace: &Namespace, callback: Callback) -> Result<WireValue> {
        let descriptor = CallbackDescriptor {
            namespace: namespace.clone(),
            id: CallbackId::new(self.callback_ids.next()),
        };

        let event = descriptor.event();
        trace!(event = %event, "Callback subscribed");
        self.socket
            .on(event, move |data, _| callback.invoke(into_positional(data)))?;

        Ok(WireValue::Callback(descriptor))
    }

    fn marshal_listener(&self, namespace: &Namespace, listener: &Listener) -> Result<WireValue> {
        let listener_ns = namespace.child(format!("listener.{}", self.listener_ids.next()));

        let mut subscribed: Vec<String> = Vec::new();
        for (name, handler) in listener.handlers() {
            let event = listener_ns.event(name);
            let handler = handler.clone();

            if let Err(e) = self
                .socket
                .on(event.clone(), move |data, _| handler.invoke(into_positional(data)))
            {
                for event in &subscribed {
                    self.socket.off(event);
                }
                return Err(e);
            }
            subscribed.push(event);
        }

        trace!(namespace = %listener_ns, events = subscribed.len(), "Listener subscribed");

        Ok(WireValue::Listener(ListenerDescriptor {
            namespace: listener_ns,
            events: listener.events(),
        }))
    }

    /// Removes the local subscriptions made for a marshalled argument.
    fn unsubscribe(&self, value: &WireValue) {
        match value {
            WireValue::Callback(descriptor) => {
                self.socket.off(&descriptor.event());
            }
            WireValue::Listener(descriptor) => {
                for event in &descriptor.events {
                    self.socket.off(&descriptor.namespace.event(event));
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
