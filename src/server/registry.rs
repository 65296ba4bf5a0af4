//! Per-connection namespace registry.
//!
//! Binds every action of an exposed object to the transport event
//! `<namespace>/<action>` on the connection's socket. Bindings live until
//! the connection closes or [`NamespaceRegistry::release`] drops them.
//!
//! # Namespace Allocation
//!
//! ```text
//! ""                              root object
//! "/TestClass.1"                  returned by a root call
//! "/TestClass.1/TestClass.2"      returned by a call on the instance above
//! ```
//!
//! The counter is shared by the whole connection, so a number is never
//! handed out twice.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{IdGenerator, Namespace};
use crate::protocol::InstanceDescriptor;
use crate::transport::Socket;

use super::action::ActionMap;
use super::dispatch::Invocation;
use super::object::RemoteObject;

// ============================================================================
// Binding
// ============================================================================

/// One exposed object and its action map.
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) instance: Arc<dyn RemoteObject>,
    pub(crate) actions: Arc<ActionMap>,
}

// ============================================================================
// NamespaceRegistry
// ============================================================================

/// Namespaces exposed on one connection.
pub struct NamespaceRegistry {
    /// Handle to self given to event handlers.
    this: Weak<Self>,
    /// Connection the bindings are registered on.
    socket: Socket,
    /// Exposed objects by namespace.
    bindings: Mutex<FxHashMap<Namespace, Binding>>,
    /// Namespace counter.
    counter: IdGenerator,
}

impl NamespaceRegistry {
    /// Creates an empty registry for `socket`.
    #[must_use]
    pub fn new(socket: Socket) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            socket,
            bindings: Mutex::new(FxHashMap::default()),
            counter: IdGenerator::new(),
        })
    }

    /// Returns the connection's socket.
    #[inline]
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Allocates a fresh namespace `<parent>/<type_name>.<n>`.
    #[must_use]
    pub fn allocate(&self, parent: &Namespace, type_name: &str) -> Namespace {
        parent.child(format!("{type_name}.{}", self.counter.next()))
    }

    /// Exposes `instance` under `namespace`.
    ///
    /// Registers one handler per action and returns the descriptor to send.
    ///
    /// # Errors
    ///
    /// - [`Error::NamespaceCollision`] if `namespace` is already bound
    /// - [`Error::HandlerExists`] if one of the action events already has a
    ///   handler; handlers registered by this call are removed again
    /// - [`Error::ConnectionClosed`] if the connection is gone
    pub fn expose(
        &self,
        instance: Arc<dyn RemoteObject>,
        namespace: Namespace,
        actions: Arc<ActionMap>,
    ) -> Result<InstanceDescriptor> {
        let mut bindings = self.bindings.lock();

        if bindings.contains_key(&namespace) {
            return Err(Error::namespace_collision(namespace));
        }

        let mut registered: Vec<String> = Vec::with_capacity(actions.len());
        for name in actions.names() {
            let event = namespace.event(&name);
            if let Err(e) = self.bind_action(&namespace, &name, event.clone()) {
                for event in &registered {
                    self.socket.off(event);
                }
                warn!(namespace = %namespace, action = %name, error = %e, "Expose failed");
                return Err(e);
            }
            registered.push(event);
        }

        debug!(
            namespace = %namespace,
            type_name = instance.type_name(),
            actions = actions.len(),
            "Instance exposed"
        );

        let descriptor = InstanceDescriptor {
            namespace: namespace.clone(),
            actions: actions.names(),
        };
        bindings.insert(namespace, Binding { instance, actions });

        Ok(descriptor)
    }

    /// Drops the bindings of `namespace`.
    ///
    /// Returns `true` if the namespace was bound. Calls against it afterwards
    /// are answered with an error marker.
    pub fn release(&self, namespace: &Namespace) -> bool {
        let Some(binding) = self.bindings.lock().remove(namespace) else {
            return false;
        };

        for name in binding.actions.names() {
            self.socket.off(&namespace.event(&name));
        }

        debug!(namespace = %namespace, "Namespace released");
        true
    }

    /// Returns the object bound under `namespace`.
    #[must_use]
    pub fn instance(&self, namespace: &Namespace) -> Option<Arc<dyn RemoteObject>> {
        self.bindings
            .lock()
            .get(namespace)
            .map(|binding| Arc::clone(&binding.instance))
    }

    /// Returns `true` if `namespace` is bound.
    #[inline]
    #[must_use]
    pub fn contains(&self, namespace: &Namespace) -> bool {
        self.bindings.lock().contains_key(namespace)
    }

    /// Returns the number of bound namespaces.
    #[inline]
    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Returns the number of bound actions across all namespaces.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings
            .lock()
            .values()
            .map(|binding| binding.actions.len())
            .sum()
    }

    pub(crate) fn binding(&self, namespace: &Namespace) -> Option<Binding> {
        self.bindings.lock().get(namespace).cloned()
    }

    /// Registers the handler for one action event.
    fn bind_action(&self, namespace: &Namespace, action: &str, event: String) -> Result<()> {
        let registry = self.this.clone();
        let namespace = namespace.clone();
        let action = action.to_string();

        self.socket.on(event, move |payload, ack| {
            let Some(registry) = registry.upgrade() else {
                return;
            };

            trace!(namespace = %namespace, action = %action, "Invocation received");
            let invocation = Invocation::new(registry, namespace.clone(), action.clone(), payload, ack);
            tokio::spawn(invocation.run());
        })
    }
}

impl std::fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("socket", &self.socket)
            .field("namespaces", &self.namespace_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::error::InvokeError;
    use crate::server::object::{Arguments, Return};
    use crate::transport::memory_pair;

    struct Echo;

    #[async_trait]
    impl RemoteObject for Echo {
        async fn invoke(&self, _method: &str, args: Arguments) -> std::result::Result<Return, InvokeError> {
            Ok(Return::Value(args.value(0)?))
        }
    }

    async fn registry() -> (Arc<NamespaceRegistry>, Socket) {
        let (server_ws, client_ws) = memory_pair().await;
        (NamespaceRegistry::new(Socket::new(server_ws)), Socket::new(client_ws))
    }

    fn actions() -> Arc<ActionMap> {
        Arc::new(ActionMap::new().plain("echo").plain("again"))
    }

    #[tokio::test]
    async fn test_allocate_uses_connection_counter() {
        let (registry, _client) = registry().await;
        let root = Namespace::root();

        let first = registry.allocate(&root, "TestClass");
        let second = registry.allocate(&first, "TestClass");

        assert_eq!(first.as_str(), "/TestClass.1");
        assert_eq!(second.as_str(), "/TestClass.1/TestClass.2");
    }

    #[tokio::test]
    async fn test_expose_binds_every_action() {
        let (registry, _client) = registry().await;

        let descriptor = registry
            .expose(Arc::new(Echo), Namespace::root(), actions())
            .expect("expose");

        assert_eq!(descriptor.actions, ["echo", "again"]);
        assert!(registry.socket().has_handler("/echo"));
        assert!(registry.socket().has_handler("/again"));
        assert_eq!(registry.namespace_count(), 1);
        assert_eq!(registry.binding_count(), 2);
    }

    #[tokio::test]
    async fn test_expose_rejects_bound_namespace() {
        let (registry, _client) = registry().await;
        registry
            .expose(Arc::new(Echo), Namespace::root(), actions())
            .expect("expose");

        let err = registry
            .expose(Arc::new(Echo), Namespace::root(), actions())
            .unwrap_err();
        assert!(matches!(err, Error::NamespaceCollision { .. }));
        assert_eq!(registry.binding_count(), 2);
    }

    #[tokio::test]
    async fn test_expose_rolls_back_on_handler_collision() {
        let (registry, _client) = registry().await;
        registry.socket().on("/ns/again", |_, _| {}).expect("squat");

        let err = registry
            .expose(Arc::new(Echo), Namespace::from("/ns"), actions())
            .unwrap_err();

        assert!(matches!(err, Error::HandlerExists { .. }));
        assert!(!registry.socket().has_handler("/ns/echo"));
        assert!(!registry.contains(&Namespace::from("/ns")));
    }

    #[tokio::test]
    async fn test_invocation_is_acked() {
        let (registry, client) = registry().await;
        registry
            .expose(Arc::new(Echo), Namespace::root(), actions())
            .expect("expose");

        let reply = client
            .emit_with_ack("/echo", serde_json::json!([{"kind": "Plain", "value": 9}]), None)
            .await
            .expect("ack");

        assert_eq!(reply, serde_json::json!({"kind": "Plain", "value": 9}));
    }

    #[tokio::test]
    async fn test_release_unbinds() {
        let (registry, _client) = registry().await;
        let namespace = Namespace::from("/Echo.1");
        registry
            .expose(Arc::new(Echo), namespace.clone(), actions())
            .expect("expose");

        assert!(registry.release(&namespace));
        assert!(!registry.release(&namespace));
        assert!(registry.instance(&namespace).is_none());
        assert!(!registry.socket().has_handler("/Echo.1/echo"));
        assert_eq!(registry.binding_count(), 0);
    }
}
