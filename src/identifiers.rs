//! Type-safe identifiers.
//!
//! Newtype wrappers keep namespaces, callback ids and ack ids from being mixed
//! up. All of them serialize transparently (a namespace is a JSON string, the
//! numeric ids are JSON numbers).
//!
//! | Type | Scope | Wire form |
//! |------|-------|-----------|
//! | [`Namespace`] | one exposed object | `""`, `"/TestClass.1"` |
//! | [`CallbackId`] | one connection | `7` |
//! | [`AckId`] | one socket | `42` |
//! | [`SocketId`] | process | never sent |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Namespace
// ============================================================================

/// Hierarchical path identifying one exposed object's action space.
///
/// The root object lives at the empty namespace. Children append a
/// `/`-separated segment, so the call event of a method is always
/// `<namespace>/<method>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Returns the root namespace (`""`).
    #[inline]
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Returns a child namespace with the given segment appended.
    #[must_use]
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}/{segment}", self.0))
    }

    /// Returns `true` for the root namespace.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the namespace as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the event name for `name` under this namespace.
    #[inline]
    #[must_use]
    pub fn event(&self, name: &str) -> String {
        format!("{}/{name}", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// CallbackId
// ============================================================================

/// Identifier of a function marshalled as a remote callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Creates a callback id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// AckId
// ============================================================================

/// Correlates an emitted event with its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(u64);

impl AckId {
    /// Creates an ack id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SocketId
// ============================================================================

/// Process-local identifier of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(Uuid);

impl SocketId {
    /// Generates a new random socket id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// IdGenerator
// ============================================================================

/// Monotonic counter handing out ids starting at 1.
///
/// One generator lives per connection (or per registry), so ids never leak
/// across connections.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator(AtomicU64);

impl IdGenerator {
    /// Creates a generator whose first id is 1.
    #[inline]
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next id.
    #[inline]
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_namespace() {
        let root = Namespace::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), "");
        assert_eq!(root.event("rpcMethod1"), "/rpcMethod1");
    }

    #[test]
    fn test_child_namespace() {
        let child = Namespace::root().child("TestClass.1");
        assert_eq!(child.as_str(), "/TestClass.1");
        assert!(!child.is_root());

        let grandchild = child.child("listener.2");
        assert_eq!(grandchild.as_str(), "/TestClass.1/listener.2");
        assert_eq!(grandchild.event("onTestEvent"), "/TestClass.1/listener.2/onTestEvent");
    }

    #[test]
    fn test_namespace_serializes_as_string() {
        let ns = Namespace::from("/a");
        assert_eq!(serde_json::to_string(&ns).expect("serialize"), r#""/a""#);
    }

    #[test]
    fn test_callback_id_serializes_as_number() {
        let id = CallbackId::new(7);
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "7");
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_id_generator_starts_at_one() {
        let generator = IdGenerator::new();
        assert_eq!(generator.next(), 1);
        assert_eq!(generator.next(), 2);
    }

    #[test]
    fn test_socket_ids_are_unique() {
        assert_ne!(SocketId::generate(), SocketId::generate());
    }
}
