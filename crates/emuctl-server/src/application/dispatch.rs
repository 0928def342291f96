//! DispatchCommandUseCase: turns one command line into its effects.
//!
//! The dispatcher never touches a socket.  For each line it returns a
//! [`Dispatch`] that tells the caller:
//!
//! - which frames to write back to the client that sent the line,
//! - which push events to broadcast to every connected client, and
//! - whether the session continues or ends.
//!
//! # Command table
//!
//! ```text
//! status                        !led/!media lines, !paused, OK
//! pause                         OK paused|unpaused   + broadcast !paused N
//! hardreset                     OK hard reset
//! exit                          OK exiting           + power off, session ends
//! version                       OK <name> <version>
//! cdload <id> <path...>         OK cdrom <id> loaded
//! {fdd,mo,rdisk,cart}load <id> <path...> <wp>
//!                               OK <class> <id> loaded
//! {cd,fdd,mo,rdisk,cart}eject <id>
//!                               OK <class> <id> ejected
//! screenshot [mon]              OK <w> <h> <bytes>   + raw BGRA block
//! screencrc [mon [x y w h]]     OK <CRC32> <w> <h>
//! mousecapture / mouserelease   OK mouse captured|released
//! help                          usage text, OK
//! ```
//!
//! Any failure is answered with a single `ERR <reason>` line and has no
//! effect on the host.

use std::sync::Arc;

use emuctl_core::{
    status_report, Command, DeviceLayout, Frame, Framebuffer, MediaClass, PushEvent, Region,
    Reply, VisibleArea, HELP_TEXT,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::host::HostControl;

/// Longest accepted image path, in bytes, exclusive.
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// Number of monitors `screenshot` / `screencrc` may address.
pub const DEFAULT_MONITORS: usize = 2;

/// Reasons a command is answered with `ERR`.
///
/// The `Display` text is exactly what follows `ERR ` on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing arguments")]
    MissingArguments,

    #[error("invalid drive id")]
    InvalidDriveId,

    /// A load command had a bad slot or write-protect value, or a
    /// `screencrc` region coordinate was not a number.
    #[error("invalid arguments")]
    InvalidArguments,

    #[error("path too long")]
    PathTooLong,

    #[error("invalid monitor index")]
    InvalidMonitor,

    #[error("monitor not active")]
    MonitorNotActive,

    #[error("no framebuffer available")]
    NoFramebuffer,

    #[error("region out of bounds")]
    RegionOutOfBounds,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Static limits the dispatcher validates arguments against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub devices: DeviceLayout,
    pub monitors: usize,
    pub max_path_len: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            devices: DeviceLayout::default(),
            monitors: DEFAULT_MONITORS,
            max_path_len: DEFAULT_MAX_PATH_LEN,
        }
    }
}

/// Whether the issuing client stays connected after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Continue,
    End,
}

/// Everything a single command line produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Frames for the issuing client, in order.
    pub frames: Vec<Frame>,
    /// Events for every connected client, sent after `frames`.
    pub broadcasts: Vec<PushEvent>,
    pub session: Session,
}

impl Dispatch {
    fn reply(reply: Reply) -> Self {
        Self {
            frames: vec![reply.into()],
            ..Self::default()
        }
    }

    /// `true` for blank input lines, which get no answer at all.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.broadcasts.is_empty() && self.session == Session::Continue
    }

    /// The text frames concatenated; binary frames are skipped.
    #[cfg(test)]
    pub(crate) fn text(&self) -> String {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text.as_str()),
                Frame::Binary(_) => None,
            })
            .collect()
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Executes control commands against a [`HostControl`].
pub struct Dispatcher {
    host: Arc<dyn HostControl>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(host: Arc<dyn HostControl>, config: DispatchConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Handles one complete line (terminator already stripped).
    pub fn handle(&self, line: &str) -> Dispatch {
        let Some(command) = Command::parse(line) else {
            return Dispatch::default();
        };
        debug!(verb = command.verb(), args = command.args().len(), "dispatching command");

        match self.execute(&command) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                debug!(verb = command.verb(), "command rejected: {e}");
                Dispatch::reply(Reply::err(e.to_string()))
            }
        }
    }

    fn execute(&self, command: &Command) -> Result<Dispatch, CommandError> {
        match command.name().as_str() {
            "status" => Ok(self.status()),
            "pause" => Ok(self.toggle_pause()),
            "hardreset" => {
                info!("hard reset requested");
                self.host.hard_reset();
                Ok(Dispatch::reply(Reply::ok_with("hard reset")))
            }
            "exit" => Ok(self.exit()),
            "version" => Ok(Dispatch::reply(Reply::ok_with(format!(
                "{} {}",
                self.host.name(),
                self.host.version()
            )))),
            "cdload" => self.load_cdrom(command),
            "fddload" => self.load_media(MediaClass::Floppy, command),
            "moload" => self.load_media(MediaClass::MagnetoOptical, command),
            "rdiskload" => self.load_media(MediaClass::RemovableDisk, command),
            "cartload" => self.load_media(MediaClass::Cartridge, command),
            "cdeject" => self.eject(MediaClass::Cdrom, command),
            "fddeject" => self.eject(MediaClass::Floppy, command),
            "moeject" => self.eject(MediaClass::MagnetoOptical, command),
            "rdiskeject" => self.eject(MediaClass::RemovableDisk, command),
            "carteject" => self.eject(MediaClass::Cartridge, command),
            "screenshot" => self.screenshot(command),
            "screencrc" => self.screen_crc(command),
            "mousecapture" => {
                self.host.set_mouse_capture(true);
                Ok(Dispatch::reply(Reply::ok_with("mouse captured")))
            }
            "mouserelease" => {
                self.host.set_mouse_capture(false);
                Ok(Dispatch::reply(Reply::ok_with("mouse released")))
            }
            "help" => Ok(Dispatch {
                frames: vec![
                    Frame::Text(HELP_TEXT.to_string()),
                    Reply::ok().into(),
                ],
                ..Dispatch::default()
            }),
            _ => Err(CommandError::UnknownCommand(command.verb().to_string())),
        }
    }

    // ── Machine state ─────────────────────────────────────────────────────────

    fn status(&self) -> Dispatch {
        let report = status_report(&self.config.devices, &*self.host, self.host.is_paused());
        let mut text: String = report.iter().map(PushEvent::to_line).collect();
        text.push_str(&Reply::ok().to_line());
        Dispatch {
            frames: vec![Frame::Text(text)],
            ..Dispatch::default()
        }
    }

    fn toggle_pause(&self) -> Dispatch {
        self.host.set_paused(!self.host.is_paused());
        // Report what the host actually settled on.
        let paused = self.host.is_paused();
        info!(paused, "pause toggled");

        let message = if paused { "paused" } else { "unpaused" };
        Dispatch {
            frames: vec![Reply::ok_with(message).into()],
            broadcasts: vec![PushEvent::Paused(paused)],
            session: Session::Continue,
        }
    }

    fn exit(&self) -> Dispatch {
        info!("power-off requested over control socket");
        let mut dispatch = Dispatch::reply(Reply::ok_with("exiting"));
        self.host.power_off();
        dispatch.session = Session::End;
        dispatch
    }

    // ── Media ─────────────────────────────────────────────────────────────────

    /// `cdload <id> <path...>`: every argument after the id is part of the
    /// path, so unquoted paths with spaces still work.
    fn load_cdrom(&self, command: &Command) -> Result<Dispatch, CommandError> {
        let args = command.args();
        if args.len() < 2 {
            return Err(CommandError::MissingArguments);
        }
        let slot = parse_index(&args[0])
            .filter(|slot| *slot < self.config.devices.media_slots(MediaClass::Cdrom))
            .ok_or(CommandError::InvalidDriveId)?;
        let path = args[1..].join(" ");
        self.check_path(&path)?;

        self.mount(MediaClass::Cdrom, slot, &path, false)
    }

    /// `<class>load <id> <path...> <wp>`: the last argument is the
    /// write-protect flag and everything between it and the id is the path.
    fn load_media(&self, class: MediaClass, command: &Command) -> Result<Dispatch, CommandError> {
        let args = command.args();
        if args.len() < 3 {
            return Err(CommandError::MissingArguments);
        }
        let slot = parse_index(&args[0])
            .filter(|slot| *slot < self.config.devices.media_slots(class))
            .ok_or(CommandError::InvalidArguments)?;
        let (write_protect, path_parts) = args[1..]
            .split_last()
            .ok_or(CommandError::MissingArguments)?;
        let path = path_parts.join(" ");
        self.check_path(&path)?;
        let write_protect = write_protect
            .parse::<i64>()
            .map(|flag| flag != 0)
            .map_err(|_| CommandError::InvalidArguments)?;

        self.mount(class, slot, &path, write_protect)
    }

    fn mount(
        &self,
        class: MediaClass,
        slot: usize,
        path: &str,
        write_protect: bool,
    ) -> Result<Dispatch, CommandError> {
        info!(%class, slot, path, write_protect, "mounting image");
        self.host.mount(class, slot, path, write_protect);
        Ok(Dispatch::reply(Reply::ok_with(format!(
            "{class} {slot} loaded"
        ))))
    }

    fn eject(&self, class: MediaClass, command: &Command) -> Result<Dispatch, CommandError> {
        let arg = command.arg(0).ok_or(CommandError::MissingArguments)?;
        let slot = parse_index(arg)
            .filter(|slot| *slot < self.config.devices.media_slots(class))
            .ok_or(CommandError::InvalidDriveId)?;

        info!(%class, slot, "ejecting medium");
        self.host.eject(class, slot);
        Ok(Dispatch::reply(Reply::ok_with(format!(
            "{class} {slot} ejected"
        ))))
    }

    fn check_path(&self, path: &str) -> Result<(), CommandError> {
        if path.len() >= self.config.max_path_len {
            return Err(CommandError::PathTooLong);
        }
        Ok(())
    }

    // ── Screen ────────────────────────────────────────────────────────────────

    fn screenshot(&self, command: &Command) -> Result<Dispatch, CommandError> {
        let monitor = self.resolve_monitor(command)?;
        let framebuffer = self.framebuffer(monitor)?;
        let area = self.visible_area(monitor, &framebuffer)?;

        let header = Reply::ok_with(format!(
            "{} {} {}",
            area.width(),
            area.height(),
            area.byte_len()
        ));
        debug!(monitor, bytes = area.byte_len(), "sending screenshot");
        Ok(Dispatch {
            frames: vec![header.into(), Frame::Binary(area.copy_bgra())],
            ..Dispatch::default()
        })
    }

    /// `screencrc [mon [x y w h]]`. A region is only used when all four
    /// coordinates are present.
    fn screen_crc(&self, command: &Command) -> Result<Dispatch, CommandError> {
        let monitor = self.resolve_monitor(command)?;
        let coords = match command.args().get(1..5) {
            Some(raw) => Some(parse_region_args(raw)?),
            None => None,
        };
        let framebuffer = self.framebuffer(monitor)?;
        let area = self.visible_area(monitor, &framebuffer)?;

        let region = match coords {
            Some([x, y, width, height]) => {
                Region::clamp(x, y, width, height, area.width(), area.height())
                    .ok_or(CommandError::RegionOutOfBounds)?
            }
            None => area.full_region(),
        };
        let crc = area.crc32_bgr(region);
        debug!(monitor, ?region, crc, "screen checksum");

        Ok(Dispatch::reply(Reply::ok_with(format!(
            "{crc:08X} {} {}",
            area.width(),
            area.height()
        ))))
    }

    /// Monitor argument defaults to 0; it must be in range and rendering.
    fn resolve_monitor(&self, command: &Command) -> Result<usize, CommandError> {
        let monitor = match command.arg(0) {
            Some(arg) => parse_index(arg),
            None => Some(0),
        }
        .filter(|monitor| *monitor < self.config.monitors)
        .ok_or(CommandError::InvalidMonitor)?;

        if !self.host.monitor_active(monitor) {
            return Err(CommandError::MonitorNotActive);
        }
        Ok(monitor)
    }

    fn framebuffer(&self, monitor: usize) -> Result<Framebuffer, CommandError> {
        self.host
            .framebuffer(monitor)
            .ok_or(CommandError::NoFramebuffer)
    }

    fn visible_area<'a>(
        &self,
        monitor: usize,
        framebuffer: &'a Framebuffer,
    ) -> Result<VisibleArea<'a>, CommandError> {
        let rect = self.host.blit_rect(monitor);
        VisibleArea::new(framebuffer, rect).ok_or(CommandError::NoFramebuffer)
    }
}

/// Parses a slot or monitor index: plain decimal digits only.
fn parse_index(arg: &str) -> Option<usize> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    arg.parse().ok()
}

fn parse_region_args(raw: &[String]) -> Result<[i64; 4], CommandError> {
    let mut coords = [0i64; 4];
    for (slot, arg) in coords.iter_mut().zip(raw) {
        *slot = arg
            .parse()
            .map_err(|_| CommandError::InvalidArguments)?;
    }
    Ok(coords)
}
