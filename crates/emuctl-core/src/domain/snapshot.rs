//! Device-state snapshots and change detection.
//!
//! # Edge-triggered events (for beginners)
//!
//! The host only exposes a status table; it does not tell anybody when an
//! LED changes.  The poller therefore reads the table periodically and
//! compares it with the previous reading kept in a [`SnapshotStore`]:
//!
//! ```text
//!   previous  ──┐
//!               ├── diff ──▶ [!led hdd 0 read, !media cdrom 1 inserted]
//!   current   ──┘
//!   previous := current   (only the fields that were announced)
//! ```
//!
//! A slot that stays busy across many ticks produces exactly one event when
//! it starts and one when it stops.  The raw `active` / `write_active` flags
//! are compared, not the derived LED state, so dropping `active` while
//! `write_active` stays set is still announced.

use crate::domain::device::{DeviceClass, DeviceLayout, DeviceStateSource, DeviceStatus};
use crate::protocol::response::PushEvent;

/// The last observed status of every slot in a [`DeviceLayout`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    /// One vector per class, indexed like `DeviceClass::ALL`.
    slots: Vec<Vec<DeviceStatus>>,
}

impl SnapshotStore {
    /// Takes the initial snapshot from the live host state, so that whatever
    /// is true at start-up is never reported as a change.
    pub fn capture<S>(layout: &DeviceLayout, source: &S) -> Self
    where
        S: DeviceStateSource + ?Sized,
    {
        let slots = DeviceClass::ALL
            .into_iter()
            .map(|class| {
                (0..layout.slots(class))
                    .map(|slot| source.device_status(class, slot))
                    .collect()
            })
            .collect();
        Self { slots }
    }

    /// The stored status of one slot, or `None` if the slot is out of range.
    pub fn get(&self, class: DeviceClass, slot: usize) -> Option<DeviceStatus> {
        self.slots[class_index(class)].get(slot).copied()
    }

    /// Reads every slot from `source` and returns an event for each
    /// difference; only the fields behind an emitted event are stored.
    ///
    /// LED events come first within a slot, then the media event; slots are
    /// visited in report order.  Media changes are only tracked for classes
    /// that carry media.
    pub fn refresh<S>(&mut self, source: &S) -> Vec<PushEvent>
    where
        S: DeviceStateSource + ?Sized,
    {
        let mut events = Vec::new();
        for class in DeviceClass::ALL {
            for (slot, previous) in self.slots[class_index(class)].iter_mut().enumerate() {
                let current = source.device_status(class, slot);

                if current.active != previous.active
                    || current.write_active != previous.write_active
                {
                    events.push(PushEvent::Led {
                        class,
                        slot,
                        state: current.led(),
                    });
                    previous.active = current.active;
                    previous.write_active = current.write_active;
                }
                if class.has_media() && current.empty != previous.empty {
                    events.push(PushEvent::Media {
                        class,
                        slot,
                        inserted: current.inserted(),
                    });
                    previous.empty = current.empty;
                }
            }
        }
        events
    }
}

// `DeviceClass` discriminants follow `DeviceClass::ALL`.
fn class_index(class: DeviceClass) -> usize {
    class as usize
}

/// Builds the full `status` report: one `!led` line per slot, a `!media`
/// line after it for media-carrying classes, then the pause flag.
///
/// The poller's change events use the same [`PushEvent`] rendering, so a
/// client sees identical text whether it asked or was told.
pub fn status_report<S>(layout: &DeviceLayout, source: &S, paused: bool) -> Vec<PushEvent>
where
    S: DeviceStateSource + ?Sized,
{
    let mut report = Vec::new();
    for (class, slot) in layout.all_slots() {
        let status = source.device_status(class, slot);
        report.push(PushEvent::Led {
            class,
            slot,
            state: status.led(),
        });
        if class.has_media() {
            report.push(PushEvent::Media {
                class,
                slot,
                inserted: status.inserted(),
            });
        }
    }
    report.push(PushEvent::Paused(paused));
    report
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::device::LedState;

    /// In-memory status table used as a test double for the host.
    #[derive(Default)]
    struct FakeTable {
        entries: HashMap<(DeviceClass, usize), DeviceStatus>,
    }

    impl FakeTable {
        fn set(&mut self, class: DeviceClass, slot: usize, status: DeviceStatus) {
            self.entries.insert((class, slot), status);
        }
    }

    impl DeviceStateSource for FakeTable {
        fn device_status(&self, class: DeviceClass, slot: usize) -> DeviceStatus {
            self.entries.get(&(class, slot)).copied().unwrap_or_default()
        }
    }

    fn small_layout() -> DeviceLayout {
        DeviceLayout {
            floppy: 1,
            cdrom: 2,
            hard_disk: 1,
            removable_disk: 0,
            magneto_optical: 0,
            network: 1,
            cartridge: 0,
        }
    }

    fn busy(write: bool) -> DeviceStatus {
        DeviceStatus {
            active: true,
            write_active: write,
            empty: false,
        }
    }

    #[test]
    fn test_capture_reflects_live_state_without_events() {
        // Arrange
        let mut table = FakeTable::default();
        table.set(DeviceClass::HardDisk, 0, busy(false));

        // Act
        let mut store = SnapshotStore::capture(&small_layout(), &table);
        let events = store.refresh(&table);

        // Assert
        assert_eq!(store.get(DeviceClass::HardDisk, 0), Some(busy(false)));
        assert!(events.is_empty(), "unchanged state must not emit events");
    }

    #[test]
    fn test_refresh_reports_each_transition_once() {
        // Arrange
        let mut table = FakeTable::default();
        let mut store = SnapshotStore::capture(&small_layout(), &table);

        // Act
        table.set(DeviceClass::HardDisk, 0, busy(false));
        let started = store.refresh(&table);
        let steady = store.refresh(&table);
        table.set(DeviceClass::HardDisk, 0, DeviceStatus::default());
        let stopped = store.refresh(&table);

        // Assert
        assert_eq!(
            started,
            [PushEvent::Led {
                class: DeviceClass::HardDisk,
                slot: 0,
                state: LedState::Read
            }]
        );
        assert!(steady.is_empty());
        assert_eq!(
            stopped,
            [PushEvent::Led {
                class: DeviceClass::HardDisk,
                slot: 0,
                state: LedState::Idle
            }]
        );
    }

    #[test]
    fn test_read_to_write_is_a_change() {
        // Arrange
        let mut table = FakeTable::default();
        table.set(DeviceClass::Floppy, 0, busy(false));
        let mut store = SnapshotStore::capture(&small_layout(), &table);

        // Act
        table.set(DeviceClass::Floppy, 0, busy(true));
        let events = store.refresh(&table);

        // Assert
        assert_eq!(
            events,
            [PushEvent::Led {
                class: DeviceClass::Floppy,
                slot: 0,
                state: LedState::Write
            }]
        );
    }

    #[test]
    fn test_active_drop_with_write_held_is_announced() {
        // Arrange
        let mut table = FakeTable::default();
        table.set(DeviceClass::HardDisk, 0, busy(true));
        let mut store = SnapshotStore::capture(&small_layout(), &table);

        // Act
        table.set(
            DeviceClass::HardDisk,
            0,
            DeviceStatus {
                active: false,
                write_active: true,
                empty: false,
            },
        );
        let events = store.refresh(&table);
        let steady = store.refresh(&table);

        // Assert
        assert_eq!(
            events,
            [PushEvent::Led {
                class: DeviceClass::HardDisk,
                slot: 0,
                state: LedState::Write
            }]
        );
        assert!(steady.is_empty());
        assert_eq!(
            store.get(DeviceClass::HardDisk, 0).map(|s| s.active),
            Some(false)
        );
    }

    #[test]
    fn test_empty_flag_not_stored_for_classes_without_media() {
        // Arrange
        let mut table = FakeTable::default();
        let mut store = SnapshotStore::capture(&small_layout(), &table);

        // Act
        table.set(
            DeviceClass::Network,
            0,
            DeviceStatus {
                empty: true,
                ..DeviceStatus::default()
            },
        );
        store.refresh(&table);

        // Assert
        assert_eq!(
            store.get(DeviceClass::Network, 0).map(|s| s.empty),
            Some(false)
        );
    }

    #[test]
    fn test_media_change_follows_led_change_in_same_slot() {
        // Arrange
        let mut table = FakeTable::default();
        table.set(
            DeviceClass::Cdrom,
            1,
            DeviceStatus {
                empty: true,
                ..DeviceStatus::default()
            },
        );
        let mut store = SnapshotStore::capture(&small_layout(), &table);

        // Act
        table.set(DeviceClass::Cdrom, 1, busy(false));
        let events = store.refresh(&table);

        // Assert
        assert_eq!(
            events,
            [
                PushEvent::Led {
                    class: DeviceClass::Cdrom,
                    slot: 1,
                    state: LedState::Read
                },
                PushEvent::Media {
                    class: DeviceClass::Cdrom,
                    slot: 1,
                    inserted: true
                },
            ]
        );
    }

    #[test]
    fn test_empty_flag_ignored_for_classes_without_media() {
        // Arrange
        let mut table = FakeTable::default();
        let mut store = SnapshotStore::capture(&small_layout(), &table);

        // Act
        table.set(
            DeviceClass::Network,
            0,
            DeviceStatus {
                empty: true,
                ..DeviceStatus::default()
            },
        );
        let events = store.refresh(&table);

        // Assert
        assert!(events.is_empty());
    }

    #[test]
    fn test_status_report_order_and_shape() {
        // Arrange
        let mut table = FakeTable::default();
        table.set(DeviceClass::Cdrom, 0, busy(true));

        // Act
        let lines: Vec<String> = status_report(&small_layout(), &table, true)
            .iter()
            .map(ToString::to_string)
            .collect();

        // Assert
        assert_eq!(
            lines,
            [
                "!led fdd 0 idle",
                "!media fdd 0 inserted",
                "!led cdrom 0 write",
                "!media cdrom 0 inserted",
                "!led cdrom 1 idle",
                "!media cdrom 1 inserted",
                "!led hdd 0 idle",
                "!led net 0 idle",
                "!paused 1",
            ]
        );
    }

    #[test]
    fn test_get_out_of_range_slot_is_none() {
        let store = SnapshotStore::capture(&small_layout(), &FakeTable::default());

        assert_eq!(store.get(DeviceClass::Floppy, 5), None);
        assert_eq!(store.get(DeviceClass::RemovableDisk, 0), None);
    }
}
