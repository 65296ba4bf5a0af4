//! Server side of the RMI engine.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Action maps declaring callable methods and result wrapping |
//! | `object` | [`RemoteObject`] trait, call arguments and remote stubs |
//! | `registry` | Per-connection namespace bindings |
//! | `dispatch` | Invocation pipeline and error classification |
//! | `core` | [`Server`] and its accept loop |

// ============================================================================
// Submodules
// ============================================================================

/// Action maps.
pub mod action;

/// Server and builder.
pub mod core;

/// Invocation dispatch.
mod dispatch;

/// Exposed objects and call arguments.
pub mod object;

/// Namespace registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{Action, ActionMap, SELF_MARKER};
pub use core::{RootFactory, Server, ServerBuilder};
pub use object::{Argument, Arguments, ListenerStub, RemoteCallback, RemoteObject, Return};
pub use registry::NamespaceRegistry;
