//! Domain entities for the emuctl control socket.
//!
//! This module contains pure logic with no socket, runtime or emulator
//! dependencies.
//!
//! # What lives here? (for beginners)
//!
//! - [`device`] names the kinds of emulated drives, their slot counts and
//!   the status a host reports for each slot.
//! - [`snapshot`] remembers the last reported status so that only *changes*
//!   turn into push events.
//! - [`framebuffer`] describes the pixel buffer of a monitor and the visible
//!   rectangle inside it.
//! - [`checksum`] computes the CRC-32 that `screencrc` reports.

pub mod checksum;
pub mod device;
pub mod framebuffer;
pub mod snapshot;
