//! In-memory simulated emulator host.
//!
//! Allows the control socket to run without a real emulator behind it:
//! mounts and ejects update an in-memory drive table, pause and mouse
//! capture are plain flags, and monitor 0 shows a test-pattern framebuffer.
//! Tests drive device activity directly with [`SimulatedHost::set_activity`]
//! to exercise the poller.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use emuctl_core::{
    BlitRect, DeviceClass, DeviceLayout, DeviceStateSource, DeviceStatus, Framebuffer, MediaClass,
};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::application::host::HostControl;

/// Border around the visible area of the test-pattern framebuffer.
const PATTERN_BORDER: usize = 8;

/// An image currently mounted in a simulated drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedImage {
    pub path: String,
    pub write_protect: bool,
}

#[derive(Debug, Clone)]
struct Monitor {
    active: bool,
    rect: BlitRect,
    framebuffer: Option<Framebuffer>,
}

impl Monitor {
    fn inactive() -> Self {
        Self {
            active: false,
            rect: BlitRect::default(),
            framebuffer: None,
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    devices: HashMap<(DeviceClass, usize), DeviceStatus>,
    media: HashMap<(MediaClass, usize), MountedImage>,
    paused: bool,
    mouse_captured: bool,
    resets: u32,
    powered_off: bool,
    monitors: Vec<Monitor>,
}

/// A stand-in emulator implementing [`HostControl`].
#[derive(Debug)]
pub struct SimulatedHost {
    name: String,
    version: String,
    layout: DeviceLayout,
    state: Mutex<HostState>,
    power_off: Notify,
}

impl SimulatedHost {
    /// Creates a host with every drive empty and `monitors` monitors, of which
    /// only monitor 0 is active, showing a 640×480 test pattern.
    pub fn new(layout: DeviceLayout, monitors: usize) -> Self {
        let mut state = HostState::default();
        for (class, slot) in layout.all_slots() {
            let status = DeviceStatus {
                empty: class.has_media(),
                ..DeviceStatus::default()
            };
            state.devices.insert((class, slot), status);
        }
        state.monitors = (0..monitors).map(|_| Monitor::inactive()).collect();
        if let Some(first) = state.monitors.first_mut() {
            let (framebuffer, rect) = test_pattern(640, 480);
            *first = Monitor {
                active: true,
                rect,
                framebuffer: Some(framebuffer),
            };
        }

        Self {
            name: "emuctl-sim".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            layout,
            state: Mutex::new(state),
            power_off: Notify::new(),
        }
    }

    /// Overrides the name and version reported by `version`.
    pub fn with_identity(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    pub fn layout(&self) -> &DeviceLayout {
        &self.layout
    }

    /// Sets the activity flags of one slot, as the emulated drive would.
    pub fn set_activity(&self, class: DeviceClass, slot: usize, active: bool, write_active: bool) {
        let mut state = self.lock();
        let status = state.devices.entry((class, slot)).or_default();
        status.active = active;
        status.write_active = write_active;
    }

    /// Replaces what a monitor shows.
    pub fn set_monitor(
        &self,
        monitor: usize,
        active: bool,
        rect: BlitRect,
        framebuffer: Option<Framebuffer>,
    ) {
        let mut state = self.lock();
        if let Some(slot) = state.monitors.get_mut(monitor) {
            *slot = Monitor {
                active,
                rect,
                framebuffer,
            };
        }
    }

    pub fn mounted(&self, class: MediaClass, slot: usize) -> Option<MountedImage> {
        self.lock().media.get(&(class, slot)).cloned()
    }

    pub fn mouse_captured(&self) -> bool {
        self.lock().mouse_captured
    }

    pub fn reset_count(&self) -> u32 {
        self.lock().resets
    }

    pub fn is_powered_off(&self) -> bool {
        self.lock().powered_off
    }

    /// Resolves once a client has issued `exit`.
    pub async fn wait_for_power_off(&self) {
        if self.is_powered_off() {
            return;
        }
        self.power_off.notified().await;
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_media_present(state: &mut HostState, class: MediaClass, slot: usize, present: bool) {
        if let Some(device) = class.device_class() {
            state.devices.entry((device, slot)).or_default().empty = !present;
        }
    }
}

/// A test-pattern framebuffer whose visible `width × height` area sits inside
/// a border, returned with its blit rectangle.
///
/// Each visible pixel encodes its own coordinates: B = x, G = y, R = x ^ y
/// (all truncated to 8 bits), so offsets are easy to verify.
pub fn test_pattern(width: usize, height: usize) -> (Framebuffer, BlitRect) {
    let framebuffer = Framebuffer::from_fn(
        width + 2 * PATTERN_BORDER,
        height + 2 * PATTERN_BORDER,
        |x, y| {
            let vx = x.wrapping_sub(PATTERN_BORDER);
            let vy = y.wrapping_sub(PATTERN_BORDER);
            [vx as u8, vy as u8, (vx ^ vy) as u8, 0xFF]
        },
    );
    let rect = BlitRect::new(
        PATTERN_BORDER as i32,
        PATTERN_BORDER as i32,
        width as i32,
        height as i32,
    );
    (framebuffer, rect)
}

impl DeviceStateSource for SimulatedHost {
    fn device_status(&self, class: DeviceClass, slot: usize) -> DeviceStatus {
        self.lock()
            .devices
            .get(&(class, slot))
            .copied()
            .unwrap_or(DeviceStatus {
                empty: class.has_media(),
                ..DeviceStatus::default()
            })
    }
}

impl HostControl for SimulatedHost {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn mount(&self, class: MediaClass, slot: usize, path: &str, write_protect: bool) {
        let mut state = self.lock();
        if path.is_empty() {
            state.media.remove(&(class, slot));
        } else {
            state.media.insert(
                (class, slot),
                MountedImage {
                    path: path.to_string(),
                    write_protect,
                },
            );
        }
        Self::set_media_present(&mut state, class, slot, !path.is_empty());
        debug!(%class, slot, path, "simulated mount");
    }

    fn eject(&self, class: MediaClass, slot: usize) {
        let mut state = self.lock();
        state.media.remove(&(class, slot));
        Self::set_media_present(&mut state, class, slot, false);
        debug!(%class, slot, "simulated eject");
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    fn hard_reset(&self) {
        self.lock().resets += 1;
    }

    fn power_off(&self) {
        self.lock().powered_off = true;
        info!("simulated host powering off");
        self.power_off.notify_one();
    }

    fn set_mouse_capture(&self, captured: bool) {
        self.lock().mouse_captured = captured;
    }

    fn monitor_active(&self, monitor: usize) -> bool {
        self.lock()
            .monitors
            .get(monitor)
            .is_some_and(|m| m.active)
    }

    fn blit_rect(&self, monitor: usize) -> BlitRect {
        self.lock()
            .monitors
            .get(monitor)
            .map(|m| m.rect)
            .unwrap_or_default()
    }

    fn framebuffer(&self, monitor: usize) -> Option<Framebuffer> {
        self.lock()
            .monitors
            .get(monitor)
            .and_then(|m| m.framebuffer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emuctl_core::VisibleArea;

    fn make_host() -> SimulatedHost {
        SimulatedHost::new(DeviceLayout::default(), 2)
    }

    #[test]
    fn test_drives_start_empty() {
        let host = make_host();

        assert!(host.device_status(DeviceClass::Floppy, 0).empty);
        assert!(host.device_status(DeviceClass::Cdrom, 7).empty);
        assert!(!host.device_status(DeviceClass::HardDisk, 0).empty);
    }

    #[test]
    fn test_mount_and_eject_update_drive_table() {
        // Arrange
        let host = make_host();

        // Act
        host.mount(MediaClass::Cdrom, 1, "/iso/dos.iso", false);
        let after_mount = host.device_status(DeviceClass::Cdrom, 1);
        let image = host.mounted(MediaClass::Cdrom, 1);
        host.eject(MediaClass::Cdrom, 1);
        let after_eject = host.device_status(DeviceClass::Cdrom, 1);

        // Assert
        assert!(!after_mount.empty);
        assert_eq!(
            image,
            Some(MountedImage {
                path: "/iso/dos.iso".to_string(),
                write_protect: false
            })
        );
        assert!(after_eject.empty);
        assert_eq!(host.mounted(MediaClass::Cdrom, 1), None);
    }

    #[test]
    fn test_cartridge_mount_is_tracked_without_led() {
        let host = make_host();

        host.mount(MediaClass::Cartridge, 0, "game.jrc", true);

        assert_eq!(
            host.mounted(MediaClass::Cartridge, 0).map(|m| m.write_protect),
            Some(true)
        );
    }

    #[test]
    fn test_set_activity_is_visible_through_status() {
        let host = make_host();

        host.set_activity(DeviceClass::HardDisk, 3, true, true);

        assert_eq!(
            host.device_status(DeviceClass::HardDisk, 3).led(),
            emuctl_core::LedState::Write
        );
    }

    #[test]
    fn test_only_first_monitor_is_active() {
        // Arrange / Act
        let host = make_host();

        // Assert
        assert!(host.monitor_active(0));
        assert!(!host.monitor_active(1));
        assert!(!host.monitor_active(5));
        assert_eq!(host.blit_rect(0), BlitRect::new(8, 8, 640, 480));
        assert!(host.framebuffer(1).is_none());
    }

    #[test]
    fn test_pattern_encodes_visible_coordinates() {
        // Arrange
        let (fb, rect) = test_pattern(32, 16);

        // Act
        let area = VisibleArea::new(&fb, rect).expect("pattern fits");
        let pixels = area.copy_bgra();

        // Assert
        assert_eq!(&pixels[..4], &[0, 0, 0, 0xFF]);
        let (x, y) = (5usize, 3usize);
        let offset = (y * 32 + x) * 4;
        assert_eq!(&pixels[offset..offset + 4], &[5, 3, 5 ^ 3, 0xFF]);
    }

    #[test]
    fn test_power_off_sets_flag() {
        let host = make_host();

        host.power_off();

        assert!(host.is_powered_off());
    }

    #[tokio::test]
    async fn test_wait_for_power_off_resolves_after_request() {
        // Arrange
        let host = std::sync::Arc::new(make_host());
        let waiter = {
            let host = std::sync::Arc::clone(&host);
            tokio::spawn(async move { host.wait_for_power_off().await })
        };

        // Act
        host.power_off();
        let joined =
            tokio::time::timeout(std::time::Duration::from_secs(2), waiter).await;

        // Assert
        assert!(joined.is_ok());
    }

    #[test]
    fn test_identity_override() {
        let host = make_host().with_identity("86Box", "4.2.1");

        assert_eq!(host.name(), "86Box");
        assert_eq!(host.version(), "4.2.1");
    }
}
