//! Wire protocol.
//!
//! Two layers share the same WebSocket text frames:
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Transport | [`Packet`] | named events and their acknowledgements |
//! | RMI | [`WireValue`] | call arguments, replies and the handshake |
//!
//! # Event Naming
//!
//! | Event | Direction | Payload |
//! |-------|-----------|---------|
//! | `connected` | server → client | root [`InstanceDescriptor`] |
//! | `error` | server → client | [`ConnectionError`](crate::ConnectionError) |
//! | `<namespace>/<method>` | client → server | argument list, acked with the reply |
//! | `<namespace>/<callback id>` | server → client | callback arguments |
//! | `<namespace>/<listener event>` | server → client | listener arguments |
//!
//! The root namespace is empty, so root calls are `/<method>`.

// ============================================================================
// Submodules
// ============================================================================

/// Transport packets.
pub mod packet;

/// Cross-boundary references and their codec.
pub mod reference;

// ============================================================================
// Re-exports
// ============================================================================

pub use packet::Packet;
pub use reference::{
    CallbackDescriptor, ErrorDescriptor, InstanceDescriptor, ListenerDescriptor, WireValue,
    decode_args, encode_args, into_positional,
};

// ============================================================================
// Constants
// ============================================================================

/// Handshake event carrying the root instance descriptor.
pub const EVENT_CONNECTED: &str = "connected";

/// Connection-scoped error event.
pub const EVENT_ERROR: &str = "error";

// ============================================================================
// Functions
// ============================================================================

/// Returns the event name for `name` under `namespace`.
///
/// # Example
///
/// ```
/// use socket_rmi::Namespace;
/// use socket_rmi::protocol::event_name;
///
/// assert_eq!(event_name(&Namespace::root(), "rpcMethod1"), "/rpcMethod1");
/// ```
#[inline]
#[must_use]
pub fn event_name(namespace: &crate::identifiers::Namespace, name: &str) -> String {
    namespace.event(name)
}
