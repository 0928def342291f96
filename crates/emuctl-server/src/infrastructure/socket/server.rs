//! Control socket server: bind, event loop and shutdown.
//!
//! This module is responsible for:
//!
//! 1. Validating the socket path and removing a stale socket file left by a
//!    previous run.
//! 2. Binding a Unix-domain stream listener.
//! 3. Running a single event-loop task that waits on the listener, every
//!    client socket, the poller's event channel and the shutdown signal at
//!    once, and reacts to whichever is ready first.
//! 4. Running the [`StatePoller`] as a second task.
//! 5. Stopping both tasks, closing all clients and removing the socket file
//!    in [`ControlSocket::stop`].
//!
//! # One task owns everything (for beginners)
//!
//! All client state lives in the [`ClientRegistry`], which is owned by the
//! event-loop task alone.  The poller never touches clients; it sends its
//! events over an `mpsc` channel and the event loop fans them out.  Because
//! only one task reads from and writes to client sockets, replies and push
//! events can never interleave mid-line.
//!
//! ```text
//!                ┌──────────────┐   PushEvent    ┌──────────────────────┐
//!   host ◀───────│ StatePoller  │──── mpsc ─────▶│                      │
//!                └──────────────┘                │   event loop task    │
//!                      ▲ client count            │  (owns registry)     │
//!                      └──── AtomicUsize ◀───────│                      │
//!   listener.accept() ──────────────────────────▶│  accept / reject     │
//!   client readable   ──────────────────────────▶│  read → dispatch     │
//!   shutdown Notify   ──────────────────────────▶│  exit loop           │
//!                                                └──────────────────────┘
//! ```
//!
//! Every wait is bounded by the select timeout (200 ms by default), so the
//! loop re-checks the `running` flag at least that often even when nothing
//! happens.  Client writes are the one unbounded wait (unless a write
//! timeout is configured); they race the shutdown signal instead.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use emuctl_core::{PushEvent, Reply};
use futures_util::future::select_all;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::application::dispatch::{Dispatch, DispatchConfig, Dispatcher, Session};
use crate::application::host::HostControl;
use crate::application::poller::{StatePoller, DEFAULT_POLL_INTERVAL};
use crate::infrastructure::socket::registry::{ClientRegistry, ConnectionId, DEFAULT_MAX_CLIENTS};

/// Size of `sockaddr_un.sun_path` on Linux; the path must fit with its NUL.
pub const MAX_SOCKET_PATH_LEN: usize = 108;

/// Default upper bound on one wait of the event loop.
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_millis(200);

/// Pending poller events before the poller has to wait for the event loop.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Bound on writing the rejection line to a client turned away at capacity.
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// Errors raised while starting the control socket.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The path does not fit into `sockaddr_un.sun_path`.
    #[error("socket path {path} is {len} bytes; must be shorter than {limit}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    /// A file already exists at the socket path and could not be removed.
    #[error("failed to remove stale socket {path}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind control socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Runtime settings for one control socket instance.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub socket_path: PathBuf,
    pub max_clients: usize,
    /// Per-client receive buffer; a line must fit in it.
    pub buffer_size: usize,
    pub select_timeout: Duration,
    pub poll_interval: Duration,
    /// `None` waits for slow readers indefinitely.
    pub write_timeout: Option<Duration>,
    pub dispatch: DispatchConfig,
}

impl ServerSettings {
    /// Default settings for a socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_clients: DEFAULT_MAX_CLIENTS,
            buffer_size: emuctl_core::DEFAULT_BUFFER_SIZE,
            select_timeout: DEFAULT_SELECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            write_timeout: None,
            dispatch: DispatchConfig::default(),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A running control socket.
///
/// Dropping a `ControlSocket` without calling [`ControlSocket::stop`] leaves
/// its tasks running until the runtime shuts down and leaves the socket file
/// behind.
#[derive(Debug)]
pub struct ControlSocket {
    socket_path: PathBuf,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    server_task: JoinHandle<ClientRegistry>,
    poller_task: JoinHandle<()>,
}

impl ControlSocket {
    /// Binds the socket and spawns the event loop and the state poller.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the path is too long, a stale socket file
    /// cannot be removed, or binding fails.  Nothing is left running on error.
    pub fn start(
        settings: ServerSettings,
        host: Arc<dyn HostControl>,
    ) -> Result<Self, ServerError> {
        let listener = bind_listener(&settings.socket_path)?;
        info!(
            path = %settings.socket_path.display(),
            max_clients = settings.max_clients,
            "control socket listening"
        );

        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let registry = ClientRegistry::new(settings.max_clients, settings.buffer_size);
        let clients = registry.live_counter();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let poller = StatePoller::new(
            Arc::clone(&host),
            &settings.dispatch.devices,
            settings.poll_interval,
        );
        let event_loop = EventLoop {
            listener,
            registry,
            dispatcher: Dispatcher::new(host, settings.dispatch.clone()),
            events: event_rx,
            running: Arc::clone(&running),
            shutdown: Arc::clone(&shutdown),
            select_timeout: settings.select_timeout,
            write_timeout: settings.write_timeout,
        };

        let server_task = tokio::spawn(event_loop.run());
        let poller_task = tokio::spawn(poller.run(event_tx, clients, Arc::clone(&running)));

        Ok(Self {
            socket_path: settings.socket_path,
            running,
            shutdown,
            server_task,
            poller_task,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.server_task.is_finished()
    }

    /// Stops the event loop and the poller, closes every client and removes
    /// the socket file.
    pub async fn stop(self) {
        info!("stopping control socket");
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_one();

        let registry = match self.server_task.await {
            Ok(registry) => Some(registry),
            Err(e) => {
                error!("control socket task failed: {e}");
                None
            }
        };
        if let Err(e) = self.poller_task.await {
            error!("state poller task failed: {e}");
        }

        if let Some(mut registry) = registry {
            let closed = registry.close_all().await;
            debug!(closed, "closed client connections");
        }

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.socket_path.display(),
                "failed to remove socket file: {e}"
            ),
        }
        info!("control socket stopped");
    }
}

/// Checks the path, clears a stale socket file and binds.
fn bind_listener(path: &Path) -> Result<UnixListener, ServerError> {
    let len = path.as_os_str().len();
    if len >= MAX_SOCKET_PATH_LEN {
        return Err(ServerError::PathTooLong {
            path: path.to_path_buf(),
            len,
            limit: MAX_SOCKET_PATH_LEN,
        });
    }

    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ServerError::StaleSocket {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    UnixListener::bind(path).map_err(|source| ServerError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

// ── Event loop ────────────────────────────────────────────────────────────────

/// What woke the event loop.
enum Readiness {
    Accepted(UnixStream),
    AcceptFailed(io::Error),
    Readable(ConnectionId),
    Broadcast(PushEvent),
    /// Timeout or shutdown signal; re-check the running flag.
    Idle,
}

struct EventLoop {
    listener: UnixListener,
    registry: ClientRegistry,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<PushEvent>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    select_timeout: Duration,
    write_timeout: Option<Duration>,
}

impl EventLoop {
    /// Runs until the running flag is cleared and hands the registry back so
    /// the caller can close the remaining clients.
    async fn run(mut self) -> ClientRegistry {
        while self.running.load(Ordering::Acquire) {
            match self.wait_ready().await {
                Readiness::Accepted(stream) => self.accept(stream).await,
                Readiness::AcceptFailed(e) => warn!("accept failed: {e}"),
                Readiness::Readable(id) => self.service_client(id).await,
                Readiness::Broadcast(event) => self.broadcast(&event).await,
                Readiness::Idle => {}
            }
        }
        debug!(clients = self.registry.len(), "event loop exiting");
        self.registry
    }

    async fn wait_ready(&mut self) -> Readiness {
        let listener = &self.listener;
        let registry = &self.registry;
        let events = &mut self.events;
        let shutdown = &self.shutdown;
        let select_timeout = self.select_timeout;

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => Readiness::Accepted(stream),
                Err(e) => Readiness::AcceptFailed(e),
            },
            id = next_readable(registry) => Readiness::Readable(id),
            Some(event) = events.recv() => Readiness::Broadcast(event),
            () = shutdown.notified() => Readiness::Idle,
            () = tokio::time::sleep(select_timeout) => Readiness::Idle,
        }
    }

    async fn accept(&mut self, stream: UnixStream) {
        match self.registry.insert(stream) {
            Ok(id) => info!(client = %id, clients = self.registry.len(), "client connected"),
            Err(mut stream) => {
                warn!(
                    capacity = self.registry.capacity(),
                    "rejecting client: too many clients"
                );
                let line = Reply::err("too many clients").to_line();
                let sent =
                    write_frame(&mut stream, line.as_bytes(), Some(REJECT_WRITE_TIMEOUT)).await;
                if let Err(e) = sent {
                    debug!("failed to send rejection: {e}");
                }
                let _ = stream.shutdown().await;
            }
        }
    }

    /// Reads what the client sent and runs every complete line through the
    /// dispatcher, in order.
    async fn service_client(&mut self, id: ConnectionId) {
        let Some(client) = self.registry.get_mut(id) else {
            return;
        };
        match client.read_available() {
            Ok(0) => {
                self.disconnect(id, "peer closed connection");
                return;
            }
            Ok(n) => trace!(client = %id, bytes = n, "received"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                self.disconnect(id, &format!("read failed: {e}"));
                return;
            }
        }

        while let Some(line) = self
            .registry
            .get_mut(id)
            .and_then(|client| client.buffer_mut().next_line())
        {
            let dispatch = self.dispatcher.handle(&line);
            if dispatch.is_empty() {
                continue;
            }
            if !self.deliver(id, dispatch).await {
                return;
            }
        }

        if let Some(client) = self.registry.get_mut(id) {
            client.buffer_mut().compact();
            if client.buffer().is_full() {
                self.disconnect(id, "line exceeds receive buffer");
            }
        }
    }

    /// Writes a dispatch result. Returns `false` once the client is gone.
    async fn deliver(&mut self, id: ConnectionId, dispatch: Dispatch) -> bool {
        for frame in &dispatch.frames {
            if let Err(e) = self.send_to(id, frame.as_bytes()).await {
                self.disconnect(id, &format!("write failed: {e}"));
                return false;
            }
        }
        for event in &dispatch.broadcasts {
            self.broadcast(event).await;
        }
        if dispatch.session == Session::End {
            self.disconnect(id, "session ended");
            return false;
        }
        self.registry.contains(id)
    }

    /// Sends `event` to every client; clients whose write fails are dropped.
    async fn broadcast(&mut self, event: &PushEvent) {
        let line = event.to_line();
        let mut failed = Vec::new();
        for id in self.registry.ids() {
            if let Err(e) = self.send_to(id, line.as_bytes()).await {
                failed.push((id, e));
            }
        }
        for (id, e) in failed {
            self.disconnect(id, &format!("broadcast failed: {e}"));
        }
    }

    /// Writes to one client. A pending write is abandoned as soon as the
    /// server is stopped, so a client that never reads cannot block `stop`.
    async fn send_to(&mut self, id: ConnectionId, bytes: &[u8]) -> io::Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(shutting_down());
        }
        let write_timeout = self.write_timeout;
        let shutdown = &self.shutdown;
        let client = self
            .registry
            .get_mut(id)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        tokio::select! {
            written = write_frame(client.stream_mut(), bytes, write_timeout) => written,
            () = shutdown.notified() => Err(shutting_down()),
        }
    }

    fn disconnect(&mut self, id: ConnectionId, reason: &str) {
        if self.registry.remove(id).is_some() {
            info!(client = %id, clients = self.registry.len(), "client disconnected: {reason}");
        }
    }
}

/// Resolves with the id of the first client whose socket becomes readable
/// (or errors); never resolves while there are no clients.
async fn next_readable(registry: &ClientRegistry) -> ConnectionId {
    if registry.is_empty() {
        return std::future::pending().await;
    }
    let waits = registry.iter().map(|client| {
        Box::pin(async move {
            if let Err(e) = client.stream().readable().await {
                debug!(client = %client.id(), "readiness error: {e}");
            }
            client.id()
        })
    });
    let (id, _index, _rest) = select_all(waits).await;
    id
}

fn shutting_down() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "server shutting down")
}

/// Writes all of `bytes`, optionally bounded by `limit`.
async fn write_frame(
    stream: &mut UnixStream,
    bytes: &[u8],
    limit: Option<Duration>,
) -> io::Result<()> {
    match limit {
        Some(limit) => timeout(limit, stream.write_all(bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?,
        None => stream.write_all(bytes).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        // Arrange / Act
        let settings = ServerSettings::new("/tmp/emuctl-test.sock");

        // Assert
        assert_eq!(settings.max_clients, 8);
        assert_eq!(settings.buffer_size, 4096);
        assert_eq!(settings.select_timeout, Duration::from_millis(200));
        assert_eq!(settings.poll_interval, Duration::from_millis(50));
        assert_eq!(settings.write_timeout, None);
    }

    #[test]
    fn test_bind_rejects_path_that_overflows_sun_path() {
        // Arrange
        let path = PathBuf::from(format!("/tmp/{}", "s".repeat(MAX_SOCKET_PATH_LEN)));

        // Act
        let result = bind_listener(&path);

        // Assert
        match result {
            Err(ServerError::PathTooLong { len, limit, .. }) => {
                assert_eq!(len, MAX_SOCKET_PATH_LEN + 5);
                assert_eq!(limit, MAX_SOCKET_PATH_LEN);
            }
            other => panic!("expected PathTooLong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!("emuctl-stale-{}.sock", std::process::id()));
        std::fs::write(&path, b"left over").expect("create stale file");

        // Act
        let listener = bind_listener(&path);

        // Assert
        assert!(listener.is_ok(), "stale file must be replaced: {listener:?}");
        drop(listener);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_write_frame_times_out_on_full_peer() {
        // Arrange – the peer never reads, so the socket buffer fills up
        let (mut writer, _reader) = UnixStream::pair().expect("socketpair");
        let big = vec![0u8; 8 * 1024 * 1024];

        // Act
        let result = write_frame(&mut writer, &big, Some(Duration::from_millis(50))).await;

        // Assert
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(io::ErrorKind::TimedOut)
        );
    }
}
