//! browser-launcher-host library
//!
//! Core of the native messaging host for the browser launcher extension:
//! - Length-prefixed stdio framing to the extension
//! - Request validation against the operation catalog
//! - Dispatch to privileged host operations (browser launch, registry
//!   version lookup, Windows Sandbox, WSL lifecycle)
//! - Bounded external process execution with retries

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod protocol;
pub mod runner;
pub mod server;
pub mod transport;
