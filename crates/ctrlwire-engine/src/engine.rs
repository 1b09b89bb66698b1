//! The engine actor and its handle.
//!
//! One Tokio task owns every piece of connection state: the socket, the
//! state machine, the request id counter, the pending-request table and
//! the backoff. Callers talk to it through [`EngineHandle`], which sends
//! commands over an mpsc channel and waits for the reply on a oneshot.
//! Because a single task writes to the socket, frames from concurrent
//! callers never interleave.
//!
//! The actor loop multiplexes five sources:
//!
//! ```text
//! commands ─────────┐
//! socket messages ──┤
//! connect finished ─┼──→ select! ──→ state change / reply / reconnect
//! reconnect timer ──┤
//! request deadline ─┘
//! ```

use std::sync::Arc;

use ctrlwire_protocol::{
    Frame, RESPONSE_STRING, SUCCESS_TOKEN, decode_frame, encode_request,
};
use ctrlwire_transport::{Connection, ConnectionId, Connector, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::pending::{PendingRequest, PendingRequests, Reply, RequestIdAllocator};
use crate::socket::Socket;
use crate::{ConnectionState, EngineConfig, EngineError, StateChange};

/// Capacity of the command channel between handles and the actor.
const COMMAND_CHANNEL_SIZE: usize = 64;
const STATE_CHANGE_BUFFER: usize = 64;

/// Commands sent to the engine actor.
enum EngineCommand {
    Begin {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Connect {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Request {
        command: u8,
        payload: Option<Vec<u8>>,
        reply: Reply,
    },
}

/// Events forwarded from a socket's reader task.
enum Inbound {
    Data(ConnectionId, Vec<u8>),
    Closed(ConnectionId, Option<TransportError>),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running engine. Cheap to clone.
///
/// Every method fails with [`EngineError::Shutdown`] once the actor task
/// has stopped.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    state: watch::Receiver<ConnectionState>,
    changes: broadcast::Sender<StateChange>,
    notifications: broadcast::Sender<Frame>,
}

impl EngineHandle {
    async fn call(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), EngineError>>) -> EngineCommand,
    ) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::Shutdown)?;
        reply_rx.await.map_err(|_| EngineError::Shutdown)?
    }

    /// Leaves `Uninitialized` and starts connecting.
    pub async fn begin(&self) -> Result<(), EngineError> {
        self.call(|reply| EngineCommand::Begin { reply }).await
    }

    /// Connects now if `Disconnected` or `Reconnecting`; otherwise a no-op.
    pub async fn connect(&self) -> Result<(), EngineError> {
        self.call(|reply| EngineCommand::Connect { reply }).await
    }

    /// Disconnects and stays disconnected until [`connect`](Self::connect).
    ///
    /// Every in-flight request fails with [`EngineError::RequestAborted`].
    pub async fn close(&self) -> Result<(), EngineError> {
        self.call(|reply| EngineCommand::Close { reply }).await
    }

    /// Sends `command` with an optional payload and waits for the reply.
    ///
    /// Resolves with the reply frame, or fails with the request's own
    /// timeout, an abort caused by a teardown, or the device's error text.
    pub async fn request(
        &self,
        command: u8,
        payload: Option<&[u8]>,
    ) -> Result<Frame, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Request {
                command,
                payload: payload.map(<[u8]>::to_vec),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::Shutdown)?;
        reply_rx.await.map_err(|_| EngineError::Shutdown)?
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribes to every state transition, in order.
    pub fn state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Subscribes to device notifications (frames with request id 0).
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.notifications.subscribe()
    }
}

/// Spawns an engine actor for `connector` and returns its handle.
///
/// The engine starts `Uninitialized`; call [`EngineHandle::begin`] to
/// connect. The actor stops when the last handle is dropped.
pub fn spawn_engine<K: Connector>(connector: K, config: EngineConfig) -> EngineHandle {
    let config = config.validated();
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Uninitialized);
    let (changes_tx, _) = broadcast::channel(STATE_CHANGE_BUFFER);
    let (notify_tx, _) = broadcast::channel(config.notification_buffer);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let actor = EngineActor {
        connector: Arc::new(connector),
        backoff: Backoff::new(config.reconnect_step(), config.reconnect_max_delay()),
        config,
        state: ConnectionState::Uninitialized,
        state_tx,
        changes_tx: changes_tx.clone(),
        notify_tx: notify_tx.clone(),
        commands: commands_rx,
        inbound_tx,
        inbound_rx,
        socket: Socket::Idle,
        ids: RequestIdAllocator::new(),
        pending: PendingRequests::default(),
        reconnect_at: None,
    };

    tokio::spawn(actor.run());

    EngineHandle {
        commands: commands_tx,
        state: state_rx,
        changes: changes_tx,
        notifications: notify_tx,
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct EngineActor<K: Connector> {
    connector: Arc<K>,
    config: EngineConfig,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    changes_tx: broadcast::Sender<StateChange>,
    notify_tx: broadcast::Sender<Frame>,
    commands: mpsc::Receiver<EngineCommand>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    socket: Socket<K::Connection>,
    ids: RequestIdAllocator,
    pending: PendingRequests,
    backoff: Backoff,
    /// When the scheduled reconnect fires. `Some` only while `Reconnecting`.
    reconnect_at: Option<Instant>,
}

impl<K: Connector> EngineActor<K> {
    async fn run(mut self) {
        debug!("engine actor started");

        loop {
            let reconnect_at = self.reconnect_at;
            let request_deadline = self.pending.next_deadline();

            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(event) = self.inbound_rx.recv() => self.handle_inbound(event),
                result = self.socket.wait_connected() => self.handle_connect_result(result),
                () = sleep_until(reconnect_at) => {
                    self.reconnect_at = None;
                    self.open_socket();
                }
                () = sleep_until(request_deadline) => self.expire_requests(),
            }
        }

        self.pending.fail_all(&EngineError::Shutdown);
        let socket = std::mem::replace(&mut self.socket, Socket::Idle);
        socket.detach(
            self.config.close_poll_interval(),
            self.config.close_poll_attempts,
        );
        debug!("engine actor stopped");
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Begin { reply } => {
                let _ = reply.send(self.handle_begin());
            }
            EngineCommand::Connect { reply } => {
                let _ = reply.send(self.handle_connect());
            }
            EngineCommand::Close { reply } => {
                let _ = reply.send(self.handle_close());
            }
            EngineCommand::Request {
                command,
                payload,
                reply,
            } => self.handle_request(command, payload, reply).await,
        }
    }

    fn handle_begin(&mut self) -> Result<(), EngineError> {
        if self.state != ConnectionState::Uninitialized {
            return Err(EngineError::AlreadyInitialized);
        }
        self.set_state(ConnectionState::Disconnected);
        self.handle_connect()
    }

    fn handle_connect(&mut self) -> Result<(), EngineError> {
        match self.state {
            ConnectionState::Uninitialized => Err(EngineError::NotInitialized),
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.reconnect_at = None;
                self.open_socket();
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Connected => Ok(()),
        }
    }

    fn handle_close(&mut self) -> Result<(), EngineError> {
        match self.state {
            ConnectionState::Uninitialized => Err(EngineError::NotInitialized),
            ConnectionState::Disconnected => Ok(()),
            _ => {
                info!(state = %self.state, "closing connection");
                self.teardown(true);
                Ok(())
            }
        }
    }

    async fn handle_request(&mut self, command: u8, payload: Option<Vec<u8>>, reply: Reply) {
        let conn = match self.socket.connection() {
            Some(conn) if self.state.is_connected() => conn,
            _ => {
                let _ = reply.send(Err(EngineError::NotConnected));
                return;
            }
        };

        let pending = &self.pending;
        let Some(id) = self.ids.allocate(|id| pending.contains(id)) else {
            warn!(outstanding = self.pending.len(), "request ids exhausted");
            let _ = reply.send(Err(EngineError::RequestIdsExhausted));
            return;
        };

        let bytes = match encode_request(self.config.signature, id, command, payload.as_deref()) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        let deadline = Instant::now() + self.config.request_timeout();
        self.pending
            .insert(id, PendingRequest::new(command, deadline, reply));
        debug!(request_id = id, command, len = bytes.len(), "sending request");

        let sent = time::timeout(self.config.request_timeout(), conn.send(&bytes)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(request_id = id, error = %e, "send failed, reconnecting");
                self.teardown(false);
            }
            Err(_) => {
                warn!(request_id = id, "send stalled, reconnecting");
                self.teardown(false);
            }
        }
    }

    fn handle_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Data(id, data) => {
                if !self.socket.is_current(id) {
                    trace!(%id, "dropping message from detached socket");
                    return;
                }
                self.process_frame(&data);
            }
            Inbound::Closed(id, error) => {
                if !self.socket.is_current(id) {
                    return;
                }
                match error {
                    Some(e) => warn!(%id, error = %e, "socket error"),
                    None => info!(%id, "socket closed by peer"),
                }
                self.teardown(false);
            }
        }
    }

    fn process_frame(&mut self, data: &[u8]) {
        let frame = match decode_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        if frame.is_notification() {
            debug!(frame_type = frame.frame_type, "notification received");
            // No subscribers is fine.
            let _ = self.notify_tx.send(frame);
            return;
        }

        let Some(request) = self.pending.take(frame.request_id) else {
            warn!(
                request_id = frame.request_id,
                frame_type = frame.frame_type,
                "reply for unknown request, dropping"
            );
            return;
        };

        let result = if frame.frame_type == RESPONSE_STRING {
            let text = frame.parse_string();
            if text == SUCCESS_TOKEN {
                Ok(frame)
            } else {
                debug!(request_id = frame.request_id, %text, "command rejected");
                Err(EngineError::CommandFailed(text))
            }
        } else {
            Ok(frame)
        };
        request.complete(result);
    }

    fn expire_requests(&mut self) {
        let expired = self.pending.expire(Instant::now());
        if expired.is_empty() {
            return;
        }
        for (id, request) in expired {
            warn!(request_id = id, command = request.command, "request timed out");
            request.complete(Err(EngineError::RequestTimeout(id)));
        }
        self.teardown(false);
    }

    fn handle_connect_result(&mut self, result: Result<K::Connection, TransportError>) {
        match result {
            Ok(conn) => {
                let conn = Arc::new(conn);
                let id = conn.id();
                let reader = tokio::spawn(read_loop(Arc::clone(&conn), self.inbound_tx.clone()));
                self.socket = Socket::Open { conn, reader };
                self.backoff.reset();
                self.set_state(ConnectionState::Connected);
                info!(%id, "connection established");
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.socket = Socket::Idle;
                self.teardown(false);
            }
        }
    }

    fn open_socket(&mut self) {
        info!("connecting");
        let connector = Arc::clone(&self.connector);
        let task = tokio::spawn(async move { connector.connect().await });
        let previous = std::mem::replace(&mut self.socket, Socket::Connecting { task });
        previous.detach(
            self.config.close_poll_interval(),
            self.config.close_poll_attempts,
        );
        self.set_state(ConnectionState::Connecting);
    }

    /// Drops the current socket and every pending request.
    ///
    /// A user-initiated teardown ends in `Disconnected`; any other one
    /// schedules a reconnect.
    fn teardown(&mut self, user_initiated: bool) {
        let aborted = self.pending.abort_all();
        if aborted > 0 {
            debug!(aborted, "aborted in-flight requests");
        }

        let socket = std::mem::replace(&mut self.socket, Socket::Idle);
        socket.detach(
            self.config.close_poll_interval(),
            self.config.close_poll_attempts,
        );

        if user_initiated {
            self.reconnect_at = None;
            self.backoff.reset();
            self.set_state(ConnectionState::Disconnected);
        } else {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.state == ConnectionState::Reconnecting {
            trace!("reconnect already scheduled");
            return;
        }
        let delay = self.backoff.advance();
        self.reconnect_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "state change");
            let _ = self.changes_tx.send(StateChange {
                from: self.state,
                to: state,
            });
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Forwards every message from `conn` to the actor until the socket ends.
async fn read_loop<C: Connection>(conn: Arc<C>, tx: mpsc::UnboundedSender<Inbound>) {
    let id = conn.id();
    loop {
        let event = match conn.recv().await {
            Ok(Some(data)) => Inbound::Data(id, data),
            Ok(None) => Inbound::Closed(id, None),
            Err(e) => Inbound::Closed(id, Some(e)),
        };
        let done = matches!(event, Inbound::Closed(..));
        if tx.send(event).is_err() || done {
            return;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
