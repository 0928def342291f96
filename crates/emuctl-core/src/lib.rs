//! # emuctl-core
//!
//! Shared library for the emuctl control socket: the line-protocol codec,
//! device-state entities, the snapshot store used for change detection and
//! the framebuffer helpers behind `screenshot` and `screencrc`.
//!
//! The crate has no dependencies on sockets, async runtimes or the emulator
//! itself.  Everything here can be compiled and tested in isolation.
//!
//! # Architecture overview (for beginners)
//!
//! An emulator host exposes a local Unix-domain socket.  Test harnesses and
//! automation scripts connect to it, send newline-terminated text commands
//! (`pause`, `cdload 0 /images/disk.iso`, `screencrc 0`, ...) and receive
//! `OK ...` / `ERR ...` replies.  The host also pushes unsolicited events
//! (`!led hdd 0 read`, `!media cdrom 1 inserted`, `!paused 1`) whenever the
//! emulated machine changes state.
//!
//! This crate (`emuctl-core`) is the pure foundation:
//!
//! - **`protocol`** – How text travels over the socket.  Incoming bytes are
//!   framed into lines by a [`LineBuffer`], split into arguments by the
//!   quote-aware [`tokenize`] function, and outgoing replies and push events
//!   are formatted by [`Reply`] and [`PushEvent`].
//!
//! - **`domain`** – Device classes and their per-slot status, the
//!   [`SnapshotStore`] that turns successive status reads into edge-triggered
//!   events, and the framebuffer [`Region`]/[`VisibleArea`] types plus the
//!   CRC-32 used to fingerprint screen contents.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `emuctl_core::Command` instead of `emuctl_core::protocol::command::Command`.
pub use domain::checksum::{crc32, Crc32};
pub use domain::device::{
    DeviceClass, DeviceLayout, DeviceStateSource, DeviceStatus, LedState, MediaClass,
};
pub use domain::framebuffer::{
    BlitRect, Framebuffer, FramebufferError, Region, VisibleArea, BYTES_PER_PIXEL,
};
pub use domain::snapshot::{status_report, SnapshotStore};
pub use protocol::command::{tokenize, Command};
pub use protocol::line_buffer::{LineBuffer, DEFAULT_BUFFER_SIZE};
pub use protocol::response::{Frame, PushEvent, Reply, HELP_TEXT};
