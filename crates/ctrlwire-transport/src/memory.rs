//! In-process transport for tests and simulations.
//!
//! [`memory_channel`] returns a connector for the client side and a
//! listener that plays the device. Every successful
//! [`connect`](Connector::connect) hands the listener a [`MemoryPeer`]
//! wired to the new [`MemoryConnection`]. The listener can also refuse or
//! stall connection attempts, which is how reconnect behaviour is tested
//! without a network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Creates a connected connector/listener pair.
pub fn memory_channel() -> (MemoryConnector, MemoryListener) {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (stall, _) = watch::channel(false);
    let shared = Arc::new(Shared {
        refuse: AtomicBool::new(false),
        attempts: AtomicU64::new(0),
        stall,
    });

    let connector = MemoryConnector {
        shared: Arc::clone(&shared),
        incoming: incoming_tx,
    };
    let listener = MemoryListener {
        shared,
        incoming: incoming_rx,
    };
    (connector, listener)
}

struct Shared {
    refuse: AtomicBool,
    attempts: AtomicU64,
    stall: watch::Sender<bool>,
}

/// Client side of an in-memory channel.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedSender<MemoryPeer>,
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        let mut stall = self.shared.stall.subscribe();
        stall.wait_for(|stalled| !*stalled).await.map_err(|_| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "listener gone",
            ))
        })?;

        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let id = ConnectionId::next();
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let peer = MemoryPeer {
            id,
            outbound: to_client,
            inbound: from_client,
        };
        self.incoming.send(peer).map_err(|_| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "listener dropped",
            ))
        })?;

        tracing::debug!(%id, "opened in-memory connection");
        Ok(MemoryConnection {
            id,
            outbound: Mutex::new(Some(to_peer)),
            inbound: Mutex::new(from_peer),
            closed,
        })
    }
}

/// Device side of an in-memory channel.
pub struct MemoryListener {
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next client connection.
    ///
    /// Returns `None` once every connector has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Returns an already opened connection, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }

    /// Makes subsequent connection attempts fail immediately.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Makes connection attempts hang until stalling is switched off.
    pub fn stall_connections(&self, stall: bool) {
        self.shared.stall.send_replace(stall);
    }

    /// Total number of connection attempts seen so far.
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// The device's end of one in-memory connection.
pub struct MemoryPeer {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryPeer {
    /// Id of the client-side connection this peer is wired to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Delivers a message to the client.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.outbound
            .send(data.into())
            .map_err(|_| TransportError::ConnectionClosed("client dropped".into()))
    }

    /// Waits for the next message written by the client.
    ///
    /// Returns `None` once the client has closed the connection.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Returns a message the client already wrote, if any.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    /// Closes the connection from the device side.
    pub fn close(self) {
        drop(self);
    }
}

/// The client's end of one in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let guard = self.outbound.lock().await;
        let Some(tx) = guard.as_ref() else {
            return Err(TransportError::ConnectionClosed("closed locally".into()));
        };
        tx.send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut closed = self.closed.subscribe();
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            msg = inbound.recv() => Ok(msg),
            _ = closed.wait_for(|c| *c) => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.outbound.lock().await.take();
        self.closed.send_replace(true);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
