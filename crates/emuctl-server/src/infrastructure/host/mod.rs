//! Host adapters implementing [`HostControl`](crate::application::host::HostControl).
//!
//! - `simulated` – an in-memory emulator stand-in with a test-pattern
//!   framebuffer.  Used by the standalone `emuctl-server` binary and by the
//!   integration tests.  An embedding emulator supplies its own adapter.

pub mod simulated;

pub use simulated::{MountedImage, SimulatedHost};
