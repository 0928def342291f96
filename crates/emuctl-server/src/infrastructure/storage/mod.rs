//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from an explicit path or from the
//!   platform-appropriate directory.
//! - Writing a default configuration file on request (`--init-config`).
//! - Providing sensible defaults when the file does not exist yet.
//!
//! Keeping storage concerns here means the socket server only ever sees a
//! ready-made [`ServerSettings`](crate::infrastructure::socket::ServerSettings).

pub mod config;
