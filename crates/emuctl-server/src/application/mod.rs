//! Application layer use cases for the control socket.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `emuctl_core`) and the infrastructure (sockets, files,
//! the emulator itself).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a client request.
//! - **Depend on abstractions** (the [`host::HostControl`] trait) rather
//!   than a concrete emulator, so tests can substitute a mock.
//! - **Contain no socket I/O**.  They return what should be written and to
//!   whom; the socket server does the writing.
//!
//! # Sub-modules
//!
//! - **`host`**     – The trait through which commands reach the emulator.
//! - **`dispatch`** – Parses one command line and turns it into reply
//!   frames, broadcast events and a session decision.
//! - **`poller`**   – Periodically diffs device state and emits change
//!   events while at least one client is connected.

pub mod dispatch;
pub mod host;
pub mod poller;
