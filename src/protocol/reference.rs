//! Cross-boundary references.
//!
//! Every call argument and every reply travels as a [`WireValue`]: a closed
//! set of variants discriminated by the `kind` field. Decoding is a single
//! exhaustive match; nothing is inferred from the shape of a plain value.
//!
//! | Kind | Direction | Meaning |
//! |------|-----------|---------|
//! | `RemoteInstance` | server → client (reply, handshake), client → server (argument) | object with callable actions |
//! | `Callback` | client → server (argument) | function invoked by event `<namespace>/<id>` |
//! | `Listener` | client → server (argument) | event target invoked by `<namespace>/<event>` |
//! | `Error` | server → client (reply) | call-scoped failure |
//! | `Plain` | both | any other JSON value |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, Namespace};

// ============================================================================
// Descriptors
// ============================================================================

/// Wire form of an exposed server object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Namespace the object's actions are bound under.
    pub namespace: Namespace,
    /// Callable action names.
    pub actions: Vec<String>,
}

/// Wire form of a function passed as an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackDescriptor {
    /// Namespace of the proxy the function was passed through.
    pub namespace: Namespace,
    /// Connection-unique callback id.
    pub id: CallbackId,
}

impl CallbackDescriptor {
    /// Returns the event that invokes the callback.
    #[inline]
    #[must_use]
    pub fn event(&self) -> String {
        self.namespace.event(&self.id.to_string())
    }
}

/// Wire form of an event-handler target passed as an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDescriptor {
    /// Namespace the listener's events are emitted under.
    pub namespace: Namespace,
    /// Declared `on`-prefixed event names.
    pub events: Vec<String>,
}

/// Error marker carried by a call's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Original error message.
    pub message: String,
}

// ============================================================================
// WireValue
// ============================================================================

/// A value crossing the connection boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WireValue {
    /// Remote object handle.
    RemoteInstance(InstanceDescriptor),
    /// Remote callback handle.
    Callback(CallbackDescriptor),
    /// Remote listener handle.
    Listener(ListenerDescriptor),
    /// Call-scoped error marker.
    Error(ErrorDescriptor),
    /// Any JSON value passed through untouched.
    Plain {
        /// The value.
        #[serde(default)]
        value: Value,
    },
}

impl WireValue {
    /// Wraps a plain JSON value.
    #[inline]
    #[must_use]
    pub fn plain(value: Value) -> Self {
        Self::Plain { value }
    }

    /// Creates an error marker.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorDescriptor {
            message: message.into(),
        })
    }

    /// Returns the discriminant as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteInstance(_) => "RemoteInstance",
            Self::Callback(_) => "Callback",
            Self::Listener(_) => "Listener",
            Self::Error(_) => "Error",
            Self::Plain { .. } => "Plain",
        }
    }

    /// Encodes into a JSON value.
    #[must_use]
    pub fn encode(&self) -> Value {
        // Only string keys and JSON values are involved, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decodes from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedReference`] if `kind` is missing or unknown,
    /// or the variant's fields do not match.
    pub fn decode(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::malformed_reference(e.to_string()))
    }
}

impl From<InstanceDescriptor> for WireValue {
    fn from(value: InstanceDescriptor) -> Self {
        Self::RemoteInstance(value)
    }
}

// ============================================================================
// Argument Lists
// ============================================================================

/// Encodes a call's argument list into a JSON array.
#[must_use]
pub fn encode_args(args: &[WireValue]) -> Value {
    Value::Array(args.iter().map(WireValue::encode).collect())
}

/// Decodes a call's argument list.
///
/// A `null` payload decodes as an empty list.
///
/// # Errors
///
/// Returns [`Error::MalformedReference`] if the payload is not an array or
/// any element fails to decode.
pub fn decode_args(payload: Value) -> Result<Vec<WireValue>> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(WireValue::decode).collect(),
        other => Err(Error::malformed_reference(format!(
            "argument list must be an array, got {other}"
        ))),
    }
}

/// Splits an event payload into positional arguments.
///
/// Callback and listener events carry an array; anything else is treated as
/// a single argument.
#[must_use]
pub fn into_positional(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_instance_wire_shape() {
        let value = WireValue::from(InstanceDescriptor {
            namespace: Namespace::root(),
            actions: vec!["rpcMethod1".into(), "rpcMethod2".into()],
        });
        assert_eq!(
            value.encode(),
            json!({"kind": "RemoteInstance", "namespace": "", "actions": ["rpcMethod1", "rpcMethod2"]})
        );
    }

    #[test]
    fn test_listener_wire_shape() {
        let value = WireValue::Listener(ListenerDescriptor {
            namespace: Namespace::from("/listener.1"),
            events: vec!["onTestEvent".into()],
        });
        assert_eq!(
            value.encode(),
            json!({"kind": "Listener", "namespace": "/listener.1", "events": ["onTestEvent"]})
        );
    }

    #[test]
    fn test_error_marker_wire_shape() {
        assert_eq!(
            WireValue::error("Simple Error").encode(),
            json!({"kind": "Error", "message": "Simple Error"})
        );
    }

    #[test]
    fn test_plain_object_with_kind_like_field_stays_plain() {
        let inner = json!({"type": "RemoteInstance", "namespace": "x"});
        let decoded = WireValue::decode(WireValue::plain(inner.clone()).encode()).expect("decode");
        assert_eq!(decoded, WireValue::plain(inner));
    }

    #[test]
    fn test_callback_event_name() {
        let descriptor = CallbackDescriptor {
            namespace: Namespace::from("/TestClass.1"),
            id: CallbackId::new(4),
        };
        assert_eq!(descriptor.event(), "/TestClass.1/4");
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let err = WireValue::decode(json!({"kind": "Mystery"})).unwrap_err();
        assert!(matches!(err, Error::MalformedReference { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let err = WireValue::decode(json!({"kind": "Callback", "namespace": ""})).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_decode_args() {
        let payload = encode_args(&[WireValue::plain(json!(1)), WireValue::plain(json!("a"))]);
        let args = decode_args(payload).expect("decode");
        assert_eq!(args.len(), 2);
        assert!(decode_args(Value::Null).expect("null").is_empty());
        assert!(decode_args(json!({"a": 1})).is_err());
    }

    #[test]
    fn test_into_positional() {
        assert_eq!(into_positional(json!([1, 2, 3])), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(into_positional(json!("x")), vec![json!("x")]);
        assert!(into_positional(Value::Null).is_empty());
    }

    fn namespace_strategy() -> impl Strategy<Value = Namespace> {
        prop::collection::vec("[A-Za-z][A-Za-z0-9.]{0,8}", 0..4)
            .prop_map(|segments| {
                segments
                    .into_iter()
                    .fold(Namespace::root(), |ns, segment| ns.child(segment))
            })
    }

    fn names_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("on[A-Z][a-zA-Z0-9]{0,10}", 0..5)
    }

    fn wire_value_strategy() -> impl Strategy<Value = WireValue> {
        prop_oneof![
            (namespace_strategy(), names_strategy()).prop_map(|(namespace, actions)| {
                WireValue::RemoteInstance(InstanceDescriptor { namespace, actions })
            }),
            (namespace_strategy(), any::<u64>()).prop_map(|(namespace, id)| {
                WireValue::Callback(CallbackDescriptor {
                    namespace,
                    id: CallbackId::new(id),
                })
            }),
            (namespace_strategy(), names_strategy()).prop_map(|(namespace, events)| {
                WireValue::Listener(ListenerDescriptor { namespace, events })
            }),
            ".*".prop_map(WireValue::error),
            any::<i64>().prop_map(|n| WireValue::plain(json!(n))),
            ".*".prop_map(|s| WireValue::plain(json!(s))),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_trip_through_json_text(value in wire_value_strategy()) {
            let text = serde_json::to_string(&value.encode()).expect("serialize");
            let parsed: Value = serde_json::from_str(&text).expect("parse");
            let decoded = WireValue::decode(parsed).expect("decode");
            prop_assert_eq!(decoded, value);
        }
    }
}
