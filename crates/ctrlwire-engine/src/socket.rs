//! The engine's handle on its current socket.
//!
//! At most one socket is current. Replacing it detaches the old one: its
//! reader task is stopped and it is closed in the background, so late
//! events from it can never reach the engine.

use std::sync::Arc;
use std::time::Duration;

use ctrlwire_transport::{Connection, ConnectionId, TransportError};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, trace, warn};

pub(crate) enum Socket<C: Connection> {
    /// No socket.
    Idle,
    /// A connect attempt is running.
    Connecting {
        task: JoinHandle<Result<C, TransportError>>,
    },
    /// The socket is open and a reader task forwards its messages.
    Open { conn: Arc<C>, reader: JoinHandle<()> },
}

impl<C: Connection> Socket<C> {
    /// Returns `true` if `id` names the open socket.
    pub(crate) fn is_current(&self, id: ConnectionId) -> bool {
        matches!(self, Self::Open { conn, .. } if conn.id() == id)
    }

    /// The open connection, if any.
    pub(crate) fn connection(&self) -> Option<Arc<C>> {
        match self {
            Self::Open { conn, .. } => Some(Arc::clone(conn)),
            _ => None,
        }
    }

    /// Resolves when the running connect attempt finishes.
    ///
    /// Pends forever unless the socket is `Connecting`. The caller must
    /// replace `self` once this resolves.
    pub(crate) async fn wait_connected(&mut self) -> Result<C, TransportError> {
        match self {
            Self::Connecting { task } => match task.await {
                Ok(result) => result,
                Err(join) => Err(TransportError::ConnectFailed(std::io::Error::other(join))),
            },
            _ => std::future::pending().await,
        }
    }

    /// Detaches the socket and closes it in the background.
    ///
    /// A socket that is still connecting is polled every `interval` until
    /// the attempt finishes, and closed then. After `attempts` polls the
    /// attempt is aborted instead.
    pub(crate) fn detach(self, interval: Duration, attempts: u32) {
        match self {
            Self::Idle => {}
            Self::Connecting { task } => {
                tokio::spawn(close_when_connected(task, interval, attempts));
            }
            Self::Open { conn, reader } => {
                reader.abort();
                tokio::spawn(async move {
                    let id = conn.id();
                    match time::timeout(interval, conn.close()).await {
                        Ok(Ok(())) => debug!(%id, "socket closed"),
                        Ok(Err(e)) => debug!(%id, error = %e, "socket close failed"),
                        Err(_) => warn!(%id, "socket close timed out"),
                    }
                });
            }
        }
    }
}

async fn close_when_connected<C: Connection>(
    mut task: JoinHandle<Result<C, TransportError>>,
    interval: Duration,
    attempts: u32,
) {
    for attempt in 1..=attempts {
        time::sleep(interval).await;
        if !task.is_finished() {
            trace!(attempt, "detached socket still connecting");
            continue;
        }
        if let Ok(Ok(conn)) = (&mut task).await {
            let id = conn.id();
            let _ = conn.close().await;
            debug!(%id, "closed socket that finished connecting after detach");
        }
        return;
    }
    task.abort();
    warn!(attempts, "detached socket never finished connecting, abandoned");
}
