//! # parley-cli
//!
//! Operator harness for parley conversations: loads `parley.toml`, installs
//! logging, and wires the SQLite checkpoint store, MCP tool registry and
//! provider model into a [`SessionManager`](parley_core::SessionManager).
//!
//! The `parley` binary is a thin layer over [`AppContext`].

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod render;

pub use config::{ConfigLoader, ParleyConfig};
pub use context::AppContext;
pub use error::{CliError, Result};
