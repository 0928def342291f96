//! The seam between the control socket and the emulator it drives.
//!
//! Every command that has an effect on the emulated machine goes through
//! [`HostControl`].  The production binary wires in a concrete host; tests
//! use a `mockall` mock or the in-memory simulated host.
//!
//! Calls are synchronous and must return quickly: they run on the socket
//! server's task, between reads.  A host that needs to do heavy work
//! (loading an image from a slow disk, say) should queue it internally.

use emuctl_core::{BlitRect, DeviceStateSource, Framebuffer, MediaClass};

/// Operations the control socket can request from the emulator host.
///
/// Slot and monitor indices passed here have already been range-checked
/// against the configured layout.
pub trait HostControl: DeviceStateSource + Send + Sync {
    /// Emulator product name, as printed by `version`.
    fn name(&self) -> String;

    /// Emulator version string, as printed by `version`.
    fn version(&self) -> String;

    /// Mounts the image at `path` into `slot` of `class`.
    fn mount(&self, class: MediaClass, slot: usize, path: &str, write_protect: bool);

    /// Ejects whatever medium is in `slot` of `class`.
    fn eject(&self, class: MediaClass, slot: usize);

    fn is_paused(&self) -> bool;

    fn set_paused(&self, paused: bool);

    /// Performs a hard reset of the emulated machine.
    fn hard_reset(&self);

    /// Requests an orderly power-off of the emulator.
    fn power_off(&self);

    fn set_mouse_capture(&self, captured: bool);

    /// `true` when `monitor` is currently rendering.
    fn monitor_active(&self, monitor: usize) -> bool;

    /// Offset and size of the visible area inside the monitor's framebuffer.
    fn blit_rect(&self, monitor: usize) -> BlitRect;

    /// A snapshot of the monitor's framebuffer, or `None` when it has none.
    fn framebuffer(&self, monitor: usize) -> Option<Framebuffer>;
}
