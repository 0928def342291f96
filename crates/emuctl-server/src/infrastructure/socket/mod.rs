//! Unix-domain control socket: lifecycle, readiness multiplexing and the
//! registry of connected clients.
//!
//! - `registry` – bounded table of live connections, each with its own
//!   receive buffer.
//! - `server`   – binds the socket, runs the single-task event loop and the
//!   state poller, and tears everything down on [`ControlSocket::stop`].

pub mod registry;
pub mod server;

pub use registry::{ClientConnection, ClientRegistry, ConnectionId};
pub use server::{ControlSocket, ServerError, ServerSettings};
