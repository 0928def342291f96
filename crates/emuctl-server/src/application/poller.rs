//! PollDeviceStateUseCase: turns device-state changes into push events.
//!
//! # How it works (for beginners)
//!
//! The host's status table has no change notifications, so the poller wakes
//! up on a fixed interval (50 ms by default), re-reads every slot and diffs
//! the result against the previous reading kept in a [`SnapshotStore`].
//! Each difference becomes a [`PushEvent`] that is handed to the socket
//! server over an `mpsc` channel; the server writes it to every client.
//!
//! ```text
//!   every 50 ms:
//!     clients == 0 ?  ──yes──▶ skip (nobody listening)
//!          │ no
//!          ▼
//!     SnapshotStore::refresh(host) ──▶ [events] ──mpsc──▶ socket server
//! ```
//!
//! The first snapshot is taken when the poller is created, from the live
//! host state, so nothing that was already true at start-up is announced.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use emuctl_core::{DeviceLayout, PushEvent, SnapshotStore};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::application::host::HostControl;

/// Default interval between two state samples.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Periodic device-state sampler.
pub struct StatePoller {
    host: Arc<dyn HostControl>,
    store: SnapshotStore,
    interval: Duration,
}

impl StatePoller {
    /// Creates a poller and captures the initial snapshot from `host`.
    pub fn new(host: Arc<dyn HostControl>, layout: &DeviceLayout, interval: Duration) -> Self {
        let store = SnapshotStore::capture(layout, &*host);
        Self {
            host,
            store,
            interval,
        }
    }

    /// Takes one sample and returns the changes since the previous one.
    pub fn tick(&mut self) -> Vec<PushEvent> {
        self.store.refresh(&*self.host)
    }

    /// Samples until `running` is cleared or the event receiver goes away.
    ///
    /// Ticks are skipped while `clients` is zero; the snapshot is left as it
    /// was, so changes made while nobody was connected are reported on the
    /// first tick after somebody connects.
    pub async fn run(
        mut self,
        events: mpsc::Sender<PushEvent>,
        clients: Arc<AtomicUsize>,
        running: Arc<AtomicBool>,
    ) {
        info!(interval_ms = self.interval.as_millis() as u64, "state poller started");

        while running.load(Ordering::Acquire) {
            tokio::time::sleep(self.interval).await;
            if !running.load(Ordering::Acquire) {
                break;
            }
            if clients.load(Ordering::Acquire) == 0 {
                continue;
            }

            for event in self.tick() {
                debug!("state change: {event}");
                if events.send(event).await.is_err() {
                    debug!("event receiver closed; stopping state poller");
                    return;
                }
            }
        }

        info!("state poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emuctl_core::{
        BlitRect, DeviceClass, DeviceStateSource, DeviceStatus, Framebuffer, LedState, MediaClass,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ── Test double ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct TableHost {
        table: Mutex<HashMap<(DeviceClass, usize), DeviceStatus>>,
    }

    impl TableHost {
        fn set(&self, class: DeviceClass, slot: usize, status: DeviceStatus) {
            self.table.lock().unwrap().insert((class, slot), status);
        }
    }

    impl DeviceStateSource for TableHost {
        fn device_status(&self, class: DeviceClass, slot: usize) -> DeviceStatus {
            self.table
                .lock()
                .unwrap()
                .get(&(class, slot))
                .copied()
                .unwrap_or_default()
        }
    }

    impl HostControl for TableHost {
        fn name(&self) -> String {
            "test".to_string()
        }
        fn version(&self) -> String {
            "0".to_string()
        }
        fn mount(&self, _: MediaClass, _: usize, _: &str, _: bool) {}
        fn eject(&self, _: MediaClass, _: usize) {}
        fn is_paused(&self) -> bool {
            false
        }
        fn set_paused(&self, _: bool) {}
        fn hard_reset(&self) {}
        fn power_off(&self) {}
        fn set_mouse_capture(&self, _: bool) {}
        fn monitor_active(&self, _: usize) -> bool {
            false
        }
        fn blit_rect(&self, _: usize) -> BlitRect {
            BlitRect::default()
        }
        fn framebuffer(&self, _: usize) -> Option<Framebuffer> {
            None
        }
    }

    fn reading() -> DeviceStatus {
        DeviceStatus {
            active: true,
            ..DeviceStatus::default()
        }
    }

    fn make_poller(host: &Arc<TableHost>) -> StatePoller {
        StatePoller::new(
            Arc::clone(host) as Arc<dyn HostControl>,
            &DeviceLayout::default(),
            Duration::from_millis(5),
        )
    }

    // ── tick ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_initial_state_is_not_reported() {
        // Arrange
        let host = Arc::new(TableHost::default());
        host.set(DeviceClass::HardDisk, 0, reading());

        // Act
        let mut poller = make_poller(&host);

        // Assert
        assert!(poller.tick().is_empty());
    }

    #[test]
    fn test_tick_reports_change_once() {
        // Arrange
        let host = Arc::new(TableHost::default());
        let mut poller = make_poller(&host);

        // Act
        host.set(DeviceClass::HardDisk, 2, reading());
        let first = poller.tick();
        let second = poller.tick();

        // Assert
        assert_eq!(
            first,
            [PushEvent::Led {
                class: DeviceClass::HardDisk,
                slot: 2,
                state: LedState::Read
            }]
        );
        assert!(second.is_empty());
    }

    // ── run ───────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_run_skips_sampling_without_clients() {
        // Arrange
        let host = Arc::new(TableHost::default());
        let poller = make_poller(&host);
        let (tx, mut rx) = mpsc::channel(16);
        let clients = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(poller.run(tx, Arc::clone(&clients), Arc::clone(&running)));

        // Act – change state while nobody is connected
        host.set(DeviceClass::Cdrom, 0, reading());
        tokio::time::sleep(Duration::from_millis(40)).await;
        let while_empty = rx.try_recv().ok();

        clients.store(1, Ordering::Release);
        let after_connect = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within timeout");

        running.store(false, Ordering::Release);
        task.await.expect("poller task joins");

        // Assert
        assert_eq!(while_empty, None);
        assert_eq!(
            after_connect,
            Some(PushEvent::Led {
                class: DeviceClass::Cdrom,
                slot: 0,
                state: LedState::Read
            })
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_receiver_dropped() {
        // Arrange
        let host = Arc::new(TableHost::default());
        let poller = make_poller(&host);
        let (tx, rx) = mpsc::channel(1);
        let clients = Arc::new(AtomicUsize::new(1));
        let running = Arc::new(AtomicBool::new(true));
        drop(rx);

        // Act
        let task = tokio::spawn(poller.run(tx, clients, running));
        host.set(DeviceClass::Floppy, 0, reading());
        let joined = tokio::time::timeout(Duration::from_secs(2), task).await;

        // Assert
        assert!(joined.is_ok(), "poller must exit once nobody listens");
    }
}
