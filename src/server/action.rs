//! Action maps.
//!
//! An [`ActionMap`] declares which methods of an exposed type are callable and
//! how each result is wrapped before it is sent back.
//!
//! # Example
//!
//! ```
//! use socket_rmi::ActionMap;
//!
//! let actions = ActionMap::new()
//!     .scalar("rpcMethod1", "number")
//!     .scalar("rpcMethod2", "number")
//!     .plain("callHook")
//!     .returns_self("getAnotherInstance");
//!
//! assert_eq!(actions.len(), 4);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// JSON marker for an action returning an instance of the owning type.
pub const SELF_MARKER: &str = "@self";

// ============================================================================
// Action
// ============================================================================

/// How the result of one action is sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Result passed through as a plain value.
    Plain,
    /// Result passed through; the tag is informational only.
    Scalar(String),
    /// Result exposed as a new remote instance using the given map.
    Instance(Arc<ActionMap>),
    /// Result exposed as a new remote instance using the owning map.
    SelfInstance,
}

impl Action {
    /// Returns `true` if the result is exposed as a remote instance.
    #[inline]
    #[must_use]
    pub fn wraps_instance(&self) -> bool {
        matches!(self, Self::Instance(_) | Self::SelfInstance)
    }

    /// Returns the map to expose the result with, if any.
    ///
    /// `owner` is the map this action belongs to.
    #[must_use]
    pub fn nested(&self, owner: &Arc<ActionMap>) -> Option<Arc<ActionMap>> {
        match self {
            Self::Plain | Self::Scalar(_) => None,
            Self::Instance(map) => Some(Arc::clone(map)),
            Self::SelfInstance => Some(Arc::clone(owner)),
        }
    }
}

// ============================================================================
// ActionMap
// ============================================================================

/// Ordered mapping from action name to [`Action`].
///
/// Declaring a name twice replaces the earlier entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionMap {
    entries: Vec<(String, Action)>,
}

impl ActionMap {
    /// Creates an empty map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an action.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = action,
            None => self.entries.push((name, action)),
        }
        self
    }

    /// Declares an action whose result is passed through.
    #[inline]
    #[must_use]
    pub fn plain(self, name: impl Into<String>) -> Self {
        self.action(name, Action::Plain)
    }

    /// Declares an action with an informational result type tag.
    #[inline]
    #[must_use]
    pub fn scalar(self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.action(name, Action::Scalar(tag.into()))
    }

    /// Declares an action returning an instance exposed with `actions`.
    #[inline]
    #[must_use]
    pub fn instance(self, name: impl Into<String>, actions: impl Into<Arc<ActionMap>>) -> Self {
        self.action(name, Action::Instance(actions.into()))
    }

    /// Declares an action returning an instance of the same type.
    #[inline]
    #[must_use]
    pub fn returns_self(self, name: impl Into<String>) -> Self {
        self.action(name, Action::SelfInstance)
    }

    /// Returns the action declared for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, action)| action)
    }

    /// Returns `true` if `name` is declared.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the declared names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Iterates over `(name, action)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Action)> {
        self.entries
            .iter()
            .map(|(name, action)| (name.as_str(), action))
    }

    /// Returns the number of declared actions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no action is declared.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a map from its JSON configuration form.
    ///
    /// | JSON value | Action |
    /// |------------|--------|
    /// | `null` | [`Action::Plain`] |
    /// | `"@self"` | [`Action::SelfInstance`] |
    /// | any other string | [`Action::Scalar`] |
    /// | object | [`Action::Instance`] (parsed recursively) |
    ///
    /// ```
    /// use serde_json::json;
    /// use socket_rmi::ActionMap;
    ///
    /// let actions = ActionMap::from_value(&json!({
    ///     "rpcMethod1": "number",
    ///     "callHook": null,
    ///     "getAnotherInstance": "@self",
    /// }))
    /// .unwrap();
    /// assert_eq!(actions.len(), 3);
    /// assert!(actions.contains("getAnotherInstance"));
    /// ```
    ///
    /// Entries are declared in the iteration order of `serde_json::Map`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value is not an object or an entry
    /// is neither `null`, a string nor an object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(Error::config(format!(
                "action map must be a JSON object, got {value}"
            )));
        };

        entries.iter().try_fold(Self::new(), |map, (name, entry)| {
            let action = match entry {
                Value::Null => Action::Plain,
                Value::String(tag) if tag == SELF_MARKER => Action::SelfInstance,
                Value::String(tag) => Action::Scalar(tag.clone()),
                Value::Object(_) => Action::Instance(Arc::new(Self::from_value(entry)?)),
                other => {
                    return Err(Error::config(format!(
                        "invalid action '{name}': expected null, string or object, got {other}"
                    )));
                }
            };
            Ok(map.action(name.clone(), action))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn test_map() -> ActionMap {
        ActionMap::new()
            .scalar("rpcMethod1", "number")
            .scalar("rpcMethod2", "number")
            .scalar("addHook", "mixed")
            .plain("callHook")
            .returns_self("getAnotherInstance")
    }

    #[test]
    fn test_names_keep_declaration_order() {
        assert_eq!(
            test_map().names(),
            ["rpcMethod1", "rpcMethod2", "addHook", "callHook", "getAnotherInstance"]
        );
    }

    #[test]
    fn test_redeclaring_replaces_in_place() {
        let map = test_map().plain("rpcMethod1");
        assert_eq!(map.len(), 5);
        assert_eq!(map.get("rpcMethod1"), Some(&Action::Plain));
        assert_eq!(map.names()[0], "rpcMethod1");
    }

    #[test]
    fn test_nested_resolution() {
        let owner = Arc::new(test_map());
        let child = Arc::new(ActionMap::new().plain("ping"));

        assert!(Action::Plain.nested(&owner).is_none());
        assert!(Action::Scalar("number".into()).nested(&owner).is_none());

        let resolved = Action::SelfInstance.nested(&owner).expect("self");
        assert!(Arc::ptr_eq(&resolved, &owner));

        let resolved = Action::Instance(Arc::clone(&child)).nested(&owner).expect("child");
        assert!(Arc::ptr_eq(&resolved, &child));
    }

    #[test]
    fn test_from_value() {
        let map = ActionMap::from_value(&json!({
            "rpcMethod1": "number",
            "callHook": null,
            "getAnotherInstance": "@self",
            "child": {"ping": null},
        }))
        .expect("parse");

        assert_eq!(map.get("rpcMethod1"), Some(&Action::Scalar("number".into())));
        assert_eq!(map.get("callHook"), Some(&Action::Plain));
        assert_eq!(map.get("getAnotherInstance"), Some(&Action::SelfInstance));

        match map.get("child") {
            Some(Action::Instance(nested)) => assert!(nested.contains("ping")),
            other => panic!("expected nested map, got {other:?}"),
        }
    }

    #[test]
    fn test_from_value_rejects_bad_entries() {
        assert!(ActionMap::from_value(&json!([])).is_err());
        assert!(matches!(
            ActionMap::from_value(&json!({"x": 1})),
            Err(Error::Config { .. })
        ));
    }
}
