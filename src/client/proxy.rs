//! Client-side proxies.
//!
//! A [`Proxy`] stands in for one server object. Calling an action marshals
//! the arguments, emits `<namespace>/<action>` and resolves with the reply.
//!
//! # Example
//!
//! ```no_run
//! use socket_rmi::{Proxy, Result, args};
//!
//! # async fn example(root: Proxy) -> Result<()> {
//! let sum: i64 = root.call_value("rpcMethod2", args![1, 5]).await?;
//! assert_eq!(sum, 6);
//!
//! let other = root.call_proxy("getAnotherInstance", args![]).await?;
//! let sum: i64 = other.call_value("rpcMethod2", args![6, 8]).await?;
//! assert_eq!(sum, 14);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::Namespace;
use crate::protocol::{InstanceDescriptor, WireValue, encode_args};

use super::handler::{Callback, Listener};
use super::session::Session;

// ============================================================================
// Arg
// ============================================================================

/// One outgoing call argument.
///
/// Usually built with the [`args!`](crate::args) macro.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Plain JSON value.
    Value(Value),
    /// Function the server may invoke.
    Callback(Callback),
    /// Event-handler target the server may fire.
    Listener(Listener),
    /// Server object held by a proxy, resolved back to the object on the
    /// server. Only valid on the proxy's own connection.
    Instance(Proxy),
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Callback> for Arg {
    fn from(callback: Callback) -> Self {
        Self::Callback(callback)
    }
}

impl From<Listener> for Arg {
    fn from(listener: Listener) -> Self {
        Self::Listener(listener)
    }
}

impl From<&Listener> for Arg {
    fn from(listener: &Listener) -> Self {
        Self::Listener(listener.clone())
    }
}

impl From<Proxy> for Arg {
    fn from(proxy: Proxy) -> Self {
        Self::Instance(proxy)
    }
}

impl From<&Proxy> for Arg {
    fn from(proxy: &Proxy) -> Self {
        Self::Instance(proxy.clone())
    }
}

macro_rules! impl_arg_from_plain {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

impl_arg_from_plain!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &str,
);

/// Builds a `Vec<Arg>` from a list of expressions.
///
/// ```
/// use serde_json::json;
/// use socket_rmi::args;
///
/// let args = args![1, "two", json!({"three": 3})];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($arg)),+]
    };
}

// ============================================================================
// Reply
// ============================================================================

/// Successful result of a remote call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Plain JSON result.
    Value(Value),
    /// Proxy for a server object returned by the call.
    Proxy(Proxy),
}

impl Reply {
    /// Deserializes a plain result.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the reply is a proxy
    /// - [`Error::Json`] if the value does not deserialize into `T`
    pub fn into_value<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Value(value) => Ok(serde_json::from_value(value)?),
            Self::Proxy(proxy) => Err(Error::protocol(format!(
                "expected a plain value, got a proxy for '{}'",
                proxy.namespace()
            ))),
        }
    }

    /// Returns the proxy result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the reply is a plain value.
    pub fn into_proxy(self) -> Result<Proxy> {
        match self {
            Self::Proxy(proxy) => Ok(proxy),
            Self::Value(value) => Err(Error::protocol(format!(
                "expected a remote instance, got {value}"
            ))),
        }
    }
}

// ============================================================================
// Proxy
// ============================================================================

/// Callable stand-in for a server object.
///
/// Cheap to clone. Calls on a proxy whose connection has closed fail with
/// [`Error::ConnectionClosed`]; proxies do not migrate across reconnects.
#[derive(Clone)]
pub struct Proxy {
    session: Arc<Session>,
    descriptor: InstanceDescriptor,
}

impl Proxy {
    pub(crate) fn new(session: Arc<Session>, descriptor: InstanceDescriptor) -> Self {
        Self {
            session,
            descriptor,
        }
    }

    #[inline]
    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Returns the descriptor this proxy was built from.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &InstanceDescriptor {
        &self.descriptor
    }

    /// Returns the namespace of the server object.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.descriptor.namespace
    }

    /// Returns the callable action names.
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.descriptor.actions
    }

    /// Returns `true` if `action` is callable.
    #[inline]
    #[must_use]
    pub fn has_action(&self, action: &str) -> bool {
        self.descriptor.actions.iter().any(|name| name == action)
    }

    /// Returns `true` while the proxy's connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.session.socket().is_closed()
    }

    /// Calls `action` with `args`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownAction`] if the action is not listed, checked locally
    /// - [`Error::ConnectionClosed`] if a proxy argument belongs to a closed
    ///   connection
    /// - [`Error::Remote`] if the method failed, carrying its message
    /// - [`Error::ConnectionClosed`] if the connection dropped first
    /// - [`Error::RequestTimeout`] if a call timeout is set and elapses
    /// - [`Error::MalformedReference`] if the reply cannot be decoded
    pub async fn call(&self, action: &str, args: Vec<Arg>) -> Result<Reply> {
        if !self.has_action(action) {
            return Err(Error::unknown_action(self.namespace().clone(), action));
        }

        let wire = self.session.marshal_all(self.namespace(), args)?;

        let event = self.namespace().event(action);
        trace!(event = %event, args = wire.len(), "Calling remote action");

        let reply = self.session.request(event, encode_args(&wire)).await?;

        match WireValue::decode(reply)? {
            WireValue::Plain { value } => Ok(Reply::Value(value)),

            WireValue::RemoteInstance(descriptor) => {
                debug!(namespace = %descriptor.namespace, "Remote instance received");
                Ok(Reply::Proxy(Self::new(Arc::clone(&self.session), descriptor)))
            }

            WireValue::Error(marker) => Err(Error::remote(marker.message)),

            other => Err(Error::malformed_reference(format!(
                "a {} cannot be a call result",
                other.kind()
            ))),
        }
    }

    /// Calls `action` and deserializes its plain result.
    ///
    /// # Errors
    ///
    /// As [`Proxy::call`], plus the errors of [`Reply::into_value`].
    pub async fn call_value<T: DeserializeOwned>(&self, action: &str, args: Vec<Arg>) -> Result<T> {
        self.call(action, args).await?.into_value()
    }

    /// Calls `action` and returns the proxy it produced.
    ///
    /// # Errors
    ///
    /// As [`Proxy::call`], plus the errors of [`Reply::into_proxy`].
    pub async fn call_proxy(&self, action: &str, args: Vec<Arg>) -> Result<Proxy> {
        self.call(action, args).await?.into_proxy()
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("namespace", self.namespace())
            .field("actions", &self.actions())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::{Socket, memory_pair};

    async fn proxy_pair(actions: &[&str]) -> (Proxy, Socket) {
        let (server_ws, client_ws) = memory_pair().await;
        let session = Arc::new(Session::new(Socket::new(client_ws), None));
        let descriptor = InstanceDescriptor {
            namespace: Namespace::root(),
            actions: actions.iter().map(|name| name.to_string()).collect(),
        };
        (Proxy::new(session, descriptor), Socket::new(server_ws))
    }

    #[test]
    fn test_args_macro() {
        let args = crate::args![1, "two", 3.5, true, json!(null)];
        assert_eq!(args.len(), 5);
        assert!(matches!(&args[1], Arg::Value(Value::String(s)) if s == "two"));
        assert!(crate::args![].is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_rejected_locally() {
        let (proxy, server) = proxy_pair(&["known"]).await;

        let err = proxy.call("unknown", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::UnknownAction { .. }));
        assert_eq!(server.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_variants() {
        let (proxy, server) = proxy_pair(&["plain", "instance", "fail"]).await;

        server
            .on("/plain", |_, ack| {
                if let Some(ack) = ack {
                    let _ = ack.send(WireValue::plain(json!(6)).encode());
                }
            })
            .expect("register");
        server
            .on("/instance", |_, ack| {
                if let Some(ack) = ack {
                    let descriptor = InstanceDescriptor {
                        namespace: Namespace::from("/TestClass.1"),
                        actions: vec!["plain".into()],
                    };
                    let _ = ack.send(WireValue::from(descriptor).encode());
                }
            })
            .expect("register");
        server
            .on("/fail", |_, ack| {
                if let Some(ack) = ack {
                    let _ = ack.send(WireValue::error("Simple Error").encode());
                }
            })
            .expect("register");

        assert_eq!(proxy.call_value::<i64>("plain", vec![]).await.expect("plain"), 6);

        let child = proxy.call_proxy("instance", vec![]).await.expect("instance");
        assert_eq!(child.namespace().as_str(), "/TestClass.1");
        assert!(child.has_action("plain"));

        let err = proxy.call("fail", vec![]).await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "Simple Error");
    }

    #[tokio::test]
    async fn test_proxy_argument_travels_as_descriptor() {
        let (proxy, server) = proxy_pair(&["take"]).await;
        server
            .on("/take", |data, ack| {
                if let Some(ack) = ack {
                    let _ = ack.send(WireValue::plain(data).encode());
                }
            })
            .expect("register");

        let echoed: Value = proxy
            .call_value("take", crate::args![&proxy])
            .await
            .expect("call");

        assert_eq!(
            echoed,
            json!([{"kind": "RemoteInstance", "namespace": "", "actions": ["take"]}])
        );
    }

    #[tokio::test]
    async fn test_pending_call_rejected_on_close() {
        let (proxy, server) = proxy_pair(&["hang"]).await;
        server.on("/hang", |_, _| {}).expect("register");

        let call = {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.call("hang", vec![]).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        server.close();

        let err = call.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        // Give the client loop a moment to observe the close frame.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!proxy.is_connected());
    }

    #[tokio::test]
    async fn test_stale_proxy_argument_rejected() {
        let (proxy, _server) = proxy_pair(&["take"]).await;
        let (stale, stale_server) = proxy_pair(&["take"]).await;

        stale_server.close();
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            stale.session().socket().closed(),
        )
        .await
        .expect("stale connection closes");

        let handlers = proxy.session().socket().handler_count();
        let err = proxy
            .call("take", crate::args![Callback::new(|_| {}), &stale])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(proxy.session().socket().handler_count(), handlers);
        assert_eq!(proxy.session().socket().pending_count(), 0);
    }
}
