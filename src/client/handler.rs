//! Client functions passed to the server.
//!
//! A [`Callback`] travels as a remote callback reference; a [`Listener`]
//! travels as a remote listener reference exposing its declared events.
//!
//! Both run on the socket's event loop and must not block.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Required prefix of listener event names.
pub const LISTENER_EVENT_PREFIX: &str = "on";

// ============================================================================
// Callback
// ============================================================================

/// Client function the server can invoke with positional arguments.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(Vec<Value>) + Send + Sync>);

impl Callback {
    /// Wraps a function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the function.
    #[inline]
    pub fn invoke(&self, args: Vec<Value>) {
        (self.0)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Event-handler target with explicitly declared `on`-prefixed events.
///
/// # Example
///
/// ```
/// use socket_rmi::Listener;
///
/// let listener = Listener::builder()
///     .on("onTestEvent", |args| println!("{args:?}"))
///     .build()?;
///
/// assert_eq!(listener.events(), ["onTestEvent"]);
/// # Ok::<(), socket_rmi::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Listener {
    handlers: Vec<(String, Callback)>,
}

impl Listener {
    /// Returns a new builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ListenerBuilder {
        ListenerBuilder::default()
    }

    /// Returns the declared event names in declaration order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.handlers.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Returns the handler of `event`.
    #[must_use]
    pub fn handler(&self, event: &str) -> Option<&Callback> {
        self.handlers
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, callback)| callback)
    }

    /// Iterates over `(event, handler)` pairs.
    pub fn handlers(&self) -> impl Iterator<Item = (&str, &Callback)> {
        self.handlers
            .iter()
            .map(|(name, callback)| (name.as_str(), callback))
    }
}

// ============================================================================
// ListenerBuilder
// ============================================================================

/// Builder for a [`Listener`].
#[derive(Default, Debug)]
pub struct ListenerBuilder {
    handlers: Vec<(String, Callback)>,
}

impl ListenerBuilder {
    /// Declares the handler of `event`.
    #[must_use]
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.handlers.push((event.into(), Callback::new(handler)));
        self
    }

    /// Builds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an event name does not start with `on`
    /// followed by at least one character, or is declared twice.
    pub fn build(self) -> Result<Listener> {
        for (index, (name, _)) in self.handlers.iter().enumerate() {
            if !name.starts_with(LISTENER_EVENT_PREFIX) || name.len() == LISTENER_EVENT_PREFIX.len() {
                return Err(Error::config(format!(
                    "Listener event '{name}' must start with '{LISTENER_EVENT_PREFIX}' followed by a name"
                )));
            }

            if self.handlers[..index].iter().any(|(earlier, _)| earlier == name) {
                return Err(Error::config(format!("Listener event '{name}' declared twice")));
            }
        }

        Ok(Listener {
            handlers: self.handlers,
        })
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

    #[test]
    fn test_callback_invoke() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callback = Callback::new(move |args| {
            counter.fetch_add(args.len(), Ordering::SeqCst);
        });

        callback.invoke(vec![json!(1), json!(2)]);
        callback.clone().invoke(vec![json!(3)]);

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_listener_keeps_declaration_order() {
        let listener = Listener::builder()
            .on("onTestEvent", |_| {})
            .on("onTestEvent2", |_| {})
            .build()
            .expect("build");

        assert_eq!(listener.events(), ["onTestEvent", "onTestEvent2"]);
        assert!(listener.handler("onTestEvent2").is_some());
        assert!(listener.handler("absurdFunc").is_none());
    }

    #[test]
    fn test_listener_rejects_bad_names() {
        let err = Listener::builder().on("absurdFunc", |_| {}).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        assert!(Listener::builder().on("on", |_| {}).build().is_err());
    }

    #[test]
    fn test_listener_rejects_duplicates() {
        let err = Listener::builder()
            .on("onTick", |_| {})
            .on("onTick", |_| {})
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }
}
