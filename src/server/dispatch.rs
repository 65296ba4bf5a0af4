//! Invocation dispatch.
//!
//! One [`Invocation`] runs per incoming call event, on its own task:
//!
//! 1. Rehydrate the argument list into [`Arguments`]
//! 2. Invoke the bound object
//! 3. Wrap the result according to the action
//! 4. Reply through the call's acknowledgement
//!
//! Failures are classified on the way out:
//!
//! | Failure | Delivered as |
//! |---------|--------------|
//! | [`InvokeError::Call`] | error marker reply |
//! | Protocol error (bad arguments, unbound namespace, result shape) | error marker reply |
//! | [`InvokeError::Uncatchable`] | `error` event, no reply |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{ConnectionError, Error, InvokeError};
use crate::identifiers::Namespace;
use crate::protocol::{EVENT_ERROR, WireValue, decode_args};
use crate::transport::Ack;

use super::object::{Argument, Arguments, ListenerStub, RemoteCallback, Return};
use super::registry::{Binding, NamespaceRegistry};

// ============================================================================
// Outcome
// ============================================================================

/// Where a finished invocation is delivered.
enum Outcome {
    /// Reply with this value.
    Reply(WireValue),
    /// Broadcast on the `error` event; the call gets no reply.
    Broadcast(ConnectionError),
}

impl From<Error> for Outcome {
    fn from(err: Error) -> Self {
        Self::Reply(WireValue::error(err.to_string()))
    }
}

impl From<InvokeError> for Outcome {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Call { message } => Self::Reply(WireValue::error(message)),
            uncatchable @ InvokeError::Uncatchable { .. } => Self::Broadcast(uncatchable.into()),
        }
    }
}

// ============================================================================
// Invocation
// ============================================================================

/// One incoming call.
pub(crate) struct Invocation {
    registry: Arc<NamespaceRegistry>,
    namespace: Namespace,
    action: String,
    payload: Value,
    ack: Option<Ack>,
}

impl Invocation {
    pub(crate) fn new(
        registry: Arc<NamespaceRegistry>,
        namespace: Namespace,
        action: String,
        payload: Value,
        ack: Option<Ack>,
    ) -> Self {
        Self {
            registry,
            namespace,
            action,
            payload,
            ack,
        }
    }

    /// Executes the call and delivers its outcome.
    pub(crate) async fn run(self) {
        let Self {
            registry,
            namespace,
            action,
            payload,
            ack,
        } = self;

        let outcome = match Self::execute(&registry, &namespace, &action, payload).await {
            Ok(reply) => Outcome::Reply(reply),
            Err(outcome) => outcome,
        };

        match outcome {
            Outcome::Reply(reply) => {
                if let WireValue::Error(ref marker) = reply {
                    debug!(namespace = %namespace, action = %action, message = %marker.message, "Call failed");
                }

                let Some(ack) = ack else {
                    trace!(namespace = %namespace, action = %action, "Call without ack, reply dropped");
                    return;
                };

                if let Err(e) = ack.send(reply.encode()) {
                    debug!(namespace = %namespace, action = %action, error = %e, "Reply not sent");
                }
            }

            Outcome::Broadcast(error) => {
                warn!(
                    namespace = %namespace,
                    action = %action,
                    name = %error.name,
                    message = %error.message,
                    "Connection-scoped error raised"
                );

                let payload = serde_json::to_value(&error).unwrap_or(Value::Null);
                if let Err(e) = registry.socket().emit(EVENT_ERROR, payload) {
                    debug!(error = %e, "Error event not sent");
                }
            }
        }
    }

    async fn execute(
        registry: &Arc<NamespaceRegistry>,
        namespace: &Namespace,
        action: &str,
        payload: Value,
    ) -> Result<WireValue, Outcome> {
        let Binding { instance, actions } = registry
            .binding(namespace)
            .ok_or_else(|| Error::unbound_namespace(namespace.clone()))?;

        let entry = actions
            .get(action)
            .cloned()
            .ok_or_else(|| Error::unknown_action(namespace.clone(), action))?;

        let args = Self::rehydrate(registry, payload)?;

        trace!(namespace = %namespace, action, args = args.len(), "Invoking");
        let result = instance.invoke(action, args).await?;

        match (entry.nested(&actions), result) {
            (None, Return::Value(value)) => Ok(WireValue::plain(value)),

            (Some(nested), Return::Object(object)) => {
                let child = registry.allocate(namespace, object.type_name());
                let descriptor = registry.expose(object, child, nested)?;
                Ok(descriptor.into())
            }

            (None, Return::Object(object)) => Err(Error::protocol(format!(
                "action '{action}' is not declared to return an instance, got {}",
                object.type_name()
            ))
            .into()),

            (Some(_), Return::Value(_)) => Err(Error::protocol(format!(
                "action '{action}' must return an instance, got a plain value"
            ))
            .into()),
        }
    }

    /// Turns decoded wire values into call arguments.
    fn rehydrate(registry: &NamespaceRegistry, payload: Value) -> Result<Arguments, Error> {
        decode_args(payload)?
            .into_iter()
            .map(|value| -> Result<Argument, Error> {
                Ok(match value {
                    WireValue::Plain { value } => Argument::Value(value),

                    WireValue::Listener(listener) => Argument::Listener(ListenerStub::new(
                        registry.socket().clone(),
                        listener.namespace,
                        listener.events,
                    )),

                    WireValue::Callback(callback) => Argument::Callback(RemoteCallback::new(
                        registry.socket().clone(),
                        callback.namespace,
                        callback.id,
                    )),

                    WireValue::RemoteInstance(instance) => Argument::Object(
                        registry
                            .instance(&instance.namespace)
                            .ok_or_else(|| Error::unbound_namespace(instance.namespace))?,
                    ),

                    WireValue::Error(_) => {
                        return Err(Error::malformed_reference(
                            "error markers cannot be passed as arguments",
                        ));
                    }
                })
            })
            .collect::<Result<Vec<_>, Error>>()
            .map(Arguments::new)
    }
}

// ============================================================================
// Tests
// ============================================================================
