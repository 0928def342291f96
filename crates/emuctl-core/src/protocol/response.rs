//! Outbound protocol units: replies, push events and raw frames.

use std::fmt;

use crate::domain::device::{DeviceClass, LedState};

/// Usage text sent in answer to `help`, followed by a bare `OK` line.
pub const HELP_TEXT: &str = "\
Commands:
  cdload <id> <path>          mount a CD-ROM image
  fddload <id> <path> <wp>    mount a floppy image (wp = 0 or 1)
  moload <id> <path> <wp>     mount a magneto-optical image
  rdiskload <id> <path> <wp>  mount a removable-disk image
  cartload <id> <path> <wp>   mount a cartridge image
  cdeject <id>                eject a CD-ROM
  fddeject <id>               eject a floppy
  moeject <id>                eject a magneto-optical disk
  rdiskeject <id>             eject a removable disk
  carteject <id>              eject a cartridge
  pause                       toggle pause
  hardreset                   hard-reset the machine
  status                      report every LED, medium and the pause flag
  screenshot [mon]            raw BGRA dump of the visible screen
  screencrc [mon [x y w h]]   CRC-32 of the visible screen or a region
  mousecapture                capture the mouse
  mouserelease                release the mouse
  version                     print emulator name and version
  help                        show this text
  exit                        power off the emulator
";

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A solicited answer to one command: `OK[ message]` or `ERR message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(Option<String>),
    Err(String),
}

impl Reply {
    /// A bare `OK`.
    pub fn ok() -> Self {
        Reply::Ok(None)
    }

    /// `OK <message>`.
    pub fn ok_with(message: impl Into<String>) -> Self {
        Reply::Ok(Some(message.into()))
    }

    /// `ERR <message>`.
    pub fn err(message: impl Into<String>) -> Self {
        Reply::Err(message.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }

    /// The reply as a complete wire line, terminator included.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok(None) => f.write_str("OK"),
            Reply::Ok(Some(message)) => write!(f, "OK {message}"),
            Reply::Err(message) => write!(f, "ERR {message}"),
        }
    }
}

// ── PushEvent ─────────────────────────────────────────────────────────────────

/// An unsolicited notification line, recognisable by its leading `!`.
///
/// The same type is used for the lines of a `status` report and for the
/// change notifications broadcast by the state poller, so both always
/// render identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    /// `!led <class> <slot> <idle|read|write>`
    Led {
        class: DeviceClass,
        slot: usize,
        state: LedState,
    },
    /// `!media <class> <slot> <inserted|ejected>`
    Media {
        class: DeviceClass,
        slot: usize,
        inserted: bool,
    },
    /// `!paused <0|1>`
    Paused(bool),
}

impl PushEvent {
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushEvent::Led { class, slot, state } => write!(f, "!led {class} {slot} {state}"),
            PushEvent::Media {
                class,
                slot,
                inserted,
            } => {
                let media = if *inserted { "inserted" } else { "ejected" };
                write!(f, "!media {class} {slot} {media}")
            }
            PushEvent::Paused(paused) => write!(f, "!paused {}", u8::from(*paused)),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One chunk of bytes queued for a single client.
///
/// Almost everything is text; `screenshot` follows its header with a
/// [`Frame::Binary`] pixel block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Reply> for Frame {
    fn from(reply: Reply) -> Self {
        Frame::Text(reply.to_line())
    }
}

impl From<PushEvent> for Frame {
    fn from(event: PushEvent) -> Self {
        Frame::Text(event.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_rendering() {
        assert_eq!(Reply::ok().to_line(), "OK\n");
        assert_eq!(Reply::ok_with("paused").to_line(), "OK paused\n");
        assert_eq!(
            Reply::err("invalid drive id").to_line(),
            "ERR invalid drive id\n"
        );
    }

    #[test]
    fn test_led_event_rendering() {
        // Arrange
        let event = PushEvent::Led {
            class: DeviceClass::HardDisk,
            slot: 3,
            state: LedState::Write,
        };

        // Act
        let line = event.to_line();

        // Assert
        assert_eq!(line, "!led hdd 3 write\n");
    }

    #[test]
    fn test_media_event_rendering() {
        let inserted = PushEvent::Media {
            class: DeviceClass::Cdrom,
            slot: 1,
            inserted: true,
        };
        let ejected = PushEvent::Media {
            class: DeviceClass::Floppy,
            slot: 0,
            inserted: false,
        };

        assert_eq!(inserted.to_string(), "!media cdrom 1 inserted");
        assert_eq!(ejected.to_string(), "!media fdd 0 ejected");
    }

    #[test]
    fn test_paused_event_uses_numeric_flag() {
        assert_eq!(PushEvent::Paused(true).to_line(), "!paused 1\n");
        assert_eq!(PushEvent::Paused(false).to_line(), "!paused 0\n");
    }

    #[test]
    fn test_frame_from_reply_is_terminated_text() {
        let frame = Frame::from(Reply::ok_with("mouse captured"));

        assert_eq!(frame.as_bytes(), b"OK mouse captured\n");
    }

    #[test]
    fn test_help_text_lists_every_verb() {
        for verb in [
            "cdload",
            "fddload",
            "moload",
            "rdiskload",
            "cartload",
            "cdeject",
            "fddeject",
            "moeject",
            "rdiskeject",
            "carteject",
            "pause",
            "hardreset",
            "status",
            "screenshot",
            "screencrc",
            "mousecapture",
            "mouserelease",
            "version",
            "help",
            "exit",
        ] {
            assert!(
                HELP_TEXT.lines().any(|l| l.trim_start().starts_with(verb)),
                "help text must mention {verb}"
            );
        }
        assert!(HELP_TEXT.ends_with('\n'));
    }
}
