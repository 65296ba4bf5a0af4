//! Exposed objects and their call arguments.
//!
//! Server-side types implement [`RemoteObject`]; the dispatcher hands each
//! call its [`Arguments`] with every reference already rehydrated:
//!
//! | Wire kind | Argument |
//! |-----------|----------|
//! | `Plain` | [`Argument::Value`] |
//! | `Listener` | [`Argument::Listener`] holding a [`ListenerStub`] |
//! | `Callback` | [`Argument::Callback`] holding a [`RemoteCallback`] |
//! | `RemoteInstance` | [`Argument::Object`], the server's own object |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, InvokeError, Result};
use crate::identifiers::{CallbackId, Namespace};
use crate::transport::Socket;

// ============================================================================
// RemoteObject
// ============================================================================

/// An object whose methods can be invoked remotely.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use socket_rmi::{Arguments, InvokeError, RemoteObject, Return};
///
/// struct Adder;
///
/// #[async_trait]
/// impl RemoteObject for Adder {
///     async fn invoke(&self, method: &str, args: Arguments) -> Result<Return, InvokeError> {
///         match method {
///             "add" => {
///                 let a: i64 = args.value(0)?;
///                 let b: i64 = args.value(1)?;
///                 Ok(Return::value(a + b)?)
///             }
///             other => Err(InvokeError::unknown_method(other)),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    /// Invokes `method` with `args`.
    ///
    /// Return [`InvokeError::Call`] to reject only this call, or
    /// [`InvokeError::Uncatchable`] to raise a connection-level error.
    async fn invoke(&self, method: &str, args: Arguments) -> std::result::Result<Return, InvokeError>;

    /// Type name used when allocating namespaces for returned instances.
    ///
    /// Defaults to the unqualified Rust type name.
    fn type_name(&self) -> &str {
        let full = std::any::type_name_of_val(self);
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

// ============================================================================
// Return
// ============================================================================

/// Result of a remote method.
pub enum Return {
    /// Plain JSON result.
    Value(Value),
    /// Object to expose as a new remote instance.
    Object(Arc<dyn RemoteObject>),
}

impl Return {
    /// Returns `null`.
    #[inline]
    #[must_use]
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    /// Serializes `value` into a plain result.
    ///
    /// # Errors
    ///
    /// Returns a call-scoped error if `value` cannot be serialized.
    pub fn value<T: Serialize>(value: T) -> std::result::Result<Self, InvokeError> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(|e| InvokeError::call(format!("Failed to serialize result: {e}")))
    }

    /// Wraps an object result.
    #[inline]
    #[must_use]
    pub fn object<O: RemoteObject>(object: O) -> Self {
        Self::Object(Arc::new(object))
    }
}

impl From<Value> for Return {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Arc<dyn RemoteObject>> for Return {
    fn from(object: Arc<dyn RemoteObject>) -> Self {
        Self::Object(object)
    }
}

impl fmt::Debug for Return {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(&object.type_name()).finish(),
        }
    }
}

// ============================================================================
// Argument
// ============================================================================

/// One rehydrated call argument.
#[derive(Clone)]
pub enum Argument {
    /// Plain JSON value.
    Value(Value),
    /// Remote event-handler target.
    Listener(ListenerStub),
    /// Remote function.
    Callback(RemoteCallback),
    /// Server object previously exposed on this connection.
    Object(Arc<dyn RemoteObject>),
}

impl Argument {
    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Listener(_) => "listener",
            Self::Callback(_) => "callback",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Listener(stub) => f.debug_tuple("Listener").field(stub).finish(),
            Self::Callback(callback) => f.debug_tuple("Callback").field(callback).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(&object.type_name()).finish(),
        }
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Positional arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct Arguments(Vec<Argument>);

impl Arguments {
    /// Creates an argument list.
    #[inline]
    #[must_use]
    pub fn new(args: Vec<Argument>) -> Self {
        Self(args)
    }

    /// Returns the number of arguments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no arguments.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the argument at `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.0.get(index)
    }

    /// Deserializes the plain argument at `index`.
    ///
    /// A missing argument deserializes from `null`, so `Option<T>` parameters
    /// may be omitted by the caller.
    ///
    /// # Errors
    ///
    /// Returns a call-scoped error if the argument is a reference or does
    /// not deserialize into `T`.
    pub fn value<T: DeserializeOwned>(&self, index: usize) -> std::result::Result<T, InvokeError> {
        let value = match self.0.get(index) {
            None => Value::Null,
            Some(Argument::Value(value)) => value.clone(),
            Some(other) => {
                return Err(InvokeError::call(format!(
                    "argument {index}: expected a value, got a {}",
                    other.kind()
                )));
            }
        };

        serde_json::from_value(value)
            .map_err(|e| InvokeError::call(format!("argument {index}: {e}")))
    }

    /// Returns the plain arguments from `start` onwards.
    ///
    /// # Errors
    ///
    /// Returns a call-scoped error if any of them is a reference.
    pub fn values_from(&self, start: usize) -> std::result::Result<Vec<Value>, InvokeError> {
        (start..self.len()).map(|index| self.value(index)).collect()
    }

    /// Returns the listener argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns a call-scoped error if the argument is missing or not a listener.
    pub fn listener(&self, index: usize) -> std::result::Result<ListenerStub, InvokeError> {
        match self.0.get(index) {
            Some(Argument::Listener(stub)) => Ok(stub.clone()),
            other => Err(Self::mismatch(index, "listener", other)),
        }
    }

    /// Returns the callback argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns a call-scoped error if the argument is missing or not a callback.
    pub fn callback(&self, index: usize) -> std::result::Result<RemoteCallback, InvokeError> {
        match self.0.get(index) {
            Some(Argument::Callback(callback)) => Ok(callback.clone()),
            other => Err(Self::mismatch(index, "callback", other)),
        }
    }

    /// Returns the object argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns a call-scoped error if the argument is missing or not an object.
    pub fn object(&self, index: usize) -> std::result::Result<Arc<dyn RemoteObject>, InvokeError> {
        match self.0.get(index) {
            Some(Argument::Object(object)) => Ok(Arc::clone(object)),
            other => Err(Self::mismatch(index, "object", other)),
        }
    }

    fn mismatch(index: usize, expected: &str, found: Option<&Argument>) -> InvokeError {
        match found {
            Some(arg) => InvokeError::call(format!(
                "argument {index}: expected a {expected}, got a {}",
                arg.kind()
            )),
            None => InvokeError::call(format!("argument {index}: missing {expected}")),
        }
    }
}

impl From<Vec<Argument>> for Arguments {
    fn from(args: Vec<Argument>) -> Self {
        Self(args)
    }
}

impl IntoIterator for Arguments {
    type Item = Argument;
    type IntoIter = std::vec::IntoIter<Argument>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================================================
// ListenerStub
// ============================================================================

/// Server-side stand-in for a client event-handler target.
///
/// Emitting one of the declared events sends `<namespace>/<event>` to the
/// client, which calls the matching handler with the arguments.
#[derive(Clone)]
pub struct ListenerStub {
    socket: Socket,
    namespace: Namespace,
    events: Arc<[String]>,
}

impl ListenerStub {
    pub(crate) fn new(socket: Socket, namespace: Namespace, events: Vec<String>) -> Self {
        Self {
            socket,
            namespace,
            events: events.into(),
        }
    }

    /// Returns the listener namespace.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the declared event names.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Returns `true` if the listener declared `event`.
    #[inline]
    #[must_use]
    pub fn handles(&self, event: &str) -> bool {
        self.events.iter().any(|name| name == event)
    }

    /// Fires `event` on the client with `args`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownEvent`] if the listener did not declare `event`
    /// - [`Error::ConnectionClosed`] if the connection is gone
    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        if !self.handles(event) {
            return Err(Error::unknown_event(self.namespace.clone(), event));
        }

        trace!(namespace = %self.namespace, event, "Firing remote listener");
        self.socket.emit(self.namespace.event(event), Value::Array(args))
    }
}

impl fmt::Debug for ListenerStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerStub")
            .field("namespace", &self.namespace)
            .field("events", &self.events)
            .finish()
    }
}

// ============================================================================
// RemoteCallback
// ============================================================================

/// Server-side stand-in for a client function.
#[derive(Clone)]
pub struct RemoteCallback {
    socket: Socket,
    namespace: Namespace,
    id: CallbackId,
}

impl RemoteCallback {
    pub(crate) fn new(socket: Socket, namespace: Namespace, id: CallbackId) -> Self {
        Self {
            socket,
            namespace,
            id,
        }
    }

    /// Returns the callback id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Calls the client function with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is gone.
    pub fn call(&self, args: Vec<Value>) -> Result<()> {
        trace!(namespace = %self.namespace, id = %self.id, "Calling remote callback");
        self.socket
            .emit(self.namespace.event(&self.id.to_string()), Value::Array(args))
    }
}

impl fmt::Debug for RemoteCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCallback")
            .field("namespace", &self.namespace)
            .field("id", &self.id)
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
    use tokio::sync::mpsc;

    use crate::transport::memory_pair;

    struct Counter;

    #[async_trait]
    impl RemoteObject for Counter {
        async fn invoke(&self, method: &str, _args: Arguments) -> std::result::Result<Return, InvokeError> {
            Err(InvokeError::unknown_method(method))
        }
    }

    #[test]
    fn test_default_type_name_is_unqualified() {
        assert_eq!(Counter.type_name(), "Counter");
        let object: Arc<dyn RemoteObject> = Arc::new(Counter);
        assert_eq!(object.type_name(), "Counter");
    }

    #[test]
    fn test_value_accessors() {
        let args = Arguments::new(vec![Argument::Value(json!(3)), Argument::Value(json!("x"))]);

        assert_eq!(args.value::<i64>(0), Ok(3));
        assert_eq!(args.value::<String>(1), Ok("x".to_string()));
        assert_eq!(args.value::<Option<i64>>(5), Ok(None));
        assert!(args.value::<i64>(1).is_err());
        assert_eq!(args.values_from(1), Ok(vec![json!("x")]));
    }

    #[test]
    fn test_reference_accessor_mismatch() {
        let args = Arguments::new(vec![Argument::Value(json!(1))]);

        let err = args.listener(0).unwrap_err();
        assert_eq!(err.message(), "argument 0: expected a listener, got a value");

        let err = args.callback(3).unwrap_err();
        assert_eq!(err.message(), "argument 3: missing callback");

        assert!(args.object(0).is_err());
    }

    #[test]
    fn test_return_value() {
        match Return::value(6).expect("serialize") {
            Return::Value(value) => assert_eq!(value, json!(6)),
            Return::Object(_) => panic!("expected a value"),
        }
        assert!(matches!(Return::null(), Return::Value(Value::Null)));
        assert!(matches!(Return::object(Counter), Return::Object(_)));
    }

    #[tokio::test]
    async fn test_listener_stub_emits_declared_events_only() {
        let (server_ws, client_ws) = memory_pair().await;
        let server = Socket::new(server_ws);
        let client = Socket::new(client_ws);

        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .on("/listener.1/onTestEvent", move |data, _| {
                let _ = tx.send(data);
            })
            .expect("register");

        let stub = ListenerStub::new(
            server,
            Namespace::root().child("listener.1"),
            vec!["onTestEvent".into()],
        );

        stub.emit("onTestEvent", vec![json!(1), json!(2), json!(3)])
            .expect("emit");
        assert_eq!(rx.recv().await, Some(json!([1, 2, 3])));

        let err = stub.emit("onOther", vec![]).unwrap_err();
        assert!(matches!(err, Error::UnknownEvent { .. }));
    }

    #[tokio::test]
    async fn test_remote_callback_emits_by_id() {
        let (server_ws, client_ws) = memory_pair().await;
        let server = Socket::new(server_ws);
        let client = Socket::new(client_ws);

        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .on("/7", move |data, _| {
                let _ = tx.send(data);
            })
            .expect("register");

        let callback = RemoteCallback::new(server, Namespace::root(), CallbackId::new(7));
        callback.call(vec![json!("done")]).expect("call");

        assert_eq!(rx.recv().await, Some(json!(["done"])));
    }
}
