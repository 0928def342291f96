//! Bounded registry of connected control clients.
//!
//! The registry is owned by the socket server's event loop and is never
//! shared, so it needs no lock.  The only thing other tasks need to know is
//! *how many* clients are connected (the poller idles at zero); that count is
//! published through an `Arc<AtomicUsize>` kept in step with every insert and
//! removal.
//!
//! # Connection ids
//!
//! Each accepted connection gets a [`ConnectionId`] from a monotonically
//! increasing counter.  Ids are never reused, so a stale id held across an
//! `.await` can at worst miss; it can never address a different client.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use emuctl_core::LineBuffer;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

/// Default maximum number of simultaneously connected clients.
pub const DEFAULT_MAX_CLIENTS: usize = 8;

/// Identifies one accepted connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One connected client: its stream and its partially received input.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    stream: UnixStream,
    buffer: LineBuffer,
}

impl ClientConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn stream(&self) -> &UnixStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut UnixStream {
        &mut self.stream
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut LineBuffer {
        &mut self.buffer
    }

    /// Reads whatever is available without blocking into the free part of
    /// the receive buffer.
    ///
    /// `Ok(0)` means the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::WouldBlock`] when readiness was spurious, or
    /// any other socket error.
    pub fn read_available(&mut self) -> io::Result<usize> {
        let stream = &self.stream;
        self.buffer.fill(|spare| stream.try_read(spare))
    }
}

/// Bounded table of live connections, ordered by id.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: BTreeMap<ConnectionId, ClientConnection>,
    capacity: usize,
    buffer_size: usize,
    next_id: u64,
    live: Arc<AtomicUsize>,
}

impl ClientRegistry {
    /// Creates an empty registry admitting at most `capacity` clients, each
    /// with a `buffer_size`-byte receive buffer.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            capacity,
            buffer_size,
            next_id: 0,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter mirroring [`Self::len`], for tasks that only need the
    /// number of connected clients.
    pub fn live_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.capacity
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Admits `stream` and returns its new id.
    ///
    /// # Errors
    ///
    /// When the registry is full the stream is handed back untouched so the
    /// caller can tell the peer why it is being turned away.
    pub fn insert(&mut self, stream: UnixStream) -> Result<ConnectionId, UnixStream> {
        if self.is_full() {
            return Err(stream);
        }
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.clients.insert(
            id,
            ClientConnection {
                id,
                stream,
                buffer: LineBuffer::new(self.buffer_size),
            },
        );
        self.publish();
        Ok(id)
    }

    /// Removes a client. Dropping the returned connection closes its socket.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ClientConnection> {
        let removed = self.clients.remove(&id);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&id)
    }

    /// Snapshot of the current ids, so callers can remove while walking.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    /// Shuts down and drops every connection, returning how many there were.
    pub async fn close_all(&mut self) -> usize {
        let clients = std::mem::take(&mut self.clients);
        self.publish();
        let count = clients.len();
        for (id, mut client) in clients {
            if let Err(e) = client.stream.shutdown().await {
                debug!(client = %id, "shutdown on close failed: {e}");
            }
        }
        count
    }

    fn publish(&self) {
        self.live.store(self.clients.len(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn pair() -> (UnixStream, UnixStream) {
        UnixStream::pair().expect("socketpair")
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        // Arrange
        let mut registry = ClientRegistry::new(4, 64);
        let (a, _peer_a) = pair();
        let (b, _peer_b) = pair();

        // Act
        let first = registry.insert(a).expect("room");
        let second = registry.insert(b).expect("room");

        // Assert
        assert!(second > first);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), [first, second]);
    }

    #[tokio::test]
    async fn test_insert_hands_stream_back_when_full() {
        // Arrange
        let mut registry = ClientRegistry::new(1, 64);
        let (a, _peer_a) = pair();
        let (b, _peer_b) = pair();
        registry.insert(a).expect("room");

        // Act
        let rejected = registry.insert(b);

        // Assert
        assert!(rejected.is_err());
        assert!(registry.is_full());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_removal() {
        // Arrange
        let mut registry = ClientRegistry::new(1, 64);
        let (a, _peer_a) = pair();
        let (b, _peer_b) = pair();

        // Act
        let first = registry.insert(a).expect("room");
        registry.remove(first);
        let second = registry.insert(b).expect("room after removal");

        // Assert
        assert_ne!(first, second);
        assert!(!registry.contains(first));
        assert!(registry.contains(second));
    }

    #[tokio::test]
    async fn test_live_counter_tracks_membership() {
        // Arrange
        let mut registry = ClientRegistry::new(4, 64);
        let counter = registry.live_counter();
        let (a, _peer_a) = pair();
        let (b, _peer_b) = pair();

        // Act / Assert
        let id = registry.insert(a).expect("room");
        registry.insert(b).expect("room");
        assert_eq!(counter.load(Ordering::Acquire), 2);

        registry.remove(id);
        assert_eq!(counter.load(Ordering::Acquire), 1);

        registry.close_all().await;
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn test_read_available_fills_line_buffer() {
        // Arrange
        let mut registry = ClientRegistry::new(1, 64);
        let (server_side, mut peer) = pair();
        let id = registry.insert(server_side).expect("room");
        peer.write_all(b"status\n").await.expect("write");

        // Act
        let client = registry.get_mut(id).expect("registered");
        client.stream().readable().await.expect("readable");
        let n = client.read_available().expect("read");

        // Assert
        assert_eq!(n, 7);
        assert_eq!(client.buffer_mut().next_line().as_deref(), Some("status"));
    }

    #[tokio::test]
    async fn test_close_all_shuts_down_peers() {
        // Arrange
        let mut registry = ClientRegistry::new(2, 64);
        let (server_side, mut peer) = pair();
        registry.insert(server_side).expect("room");

        // Act
        let closed = registry.close_all().await;
        let mut buf = [0u8; 8];
        let n = peer.read(&mut buf).await.expect("read after close");

        // Assert
        assert_eq!(closed, 1);
        assert_eq!(n, 0, "peer must observe EOF");
        assert!(registry.is_empty());
    }
}
