//! Infrastructure layer for the control socket.
//!
//! Contains OS-facing adapters: the Unix-domain socket server and its client
//! registry, TOML configuration storage, and the in-memory simulated host
//! used by the standalone binary and the integration tests.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `emuctl_core`, but MUST NOT be imported by the `application` layer.

pub mod host;
pub mod socket;
pub mod storage;
