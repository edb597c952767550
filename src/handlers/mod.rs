//! Operation handlers, one module per operation family.
//!
//! Handlers are free async functions over the [`CommandRunner`] seam plus
//! the read-only config; the dispatcher owns the mapping from validated
//! requests to these functions and the packaging of their results.

pub mod hardware;
pub mod launch;
pub mod registry;
pub mod sandbox;
pub mod script;
pub mod wsl;
