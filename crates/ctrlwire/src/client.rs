//! `ControlClient` builder and the client handle.
//!
//! This is the entry point for talking to a device. It ties together all
//! the layers: transport → engine → commit pipeline and notification
//! router → property snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use ctrlwire_engine::{ConnectionState, EngineError, EngineHandle, spawn_engine};
use ctrlwire_props::{
    ConfigNode, FieldLayout, PropertyDescriptor, PropertyDirectory, PropertyPath, PropertyRole,
};
use ctrlwire_protocol::{RESTART, Value};
use ctrlwire_transport::{Connector, WebSocketConnector};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::commit::{CommitCommand, CommitJob, spawn_pipeline};
use crate::{ChangeOrigin, ClientConfig, ClientEvent, ConfigSchema, CtrlwireError};

const EVENT_CHANNEL_SIZE: usize = 256;

/// State shared by the client handle and its background tasks.
pub(crate) struct Shared {
    pub(crate) engine: EngineHandle,
    pub(crate) directory: PropertyDirectory,
    pub(crate) schema: Arc<dyn ConfigSchema>,
    /// Bumped by every user `connect()` or `close()`; a retry scheduled
    /// under an older value is dropped.
    pub(crate) user_epoch: Arc<AtomicU64>,
    snapshot: RwLock<ConfigNode>,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    pub(crate) fn read_snapshot(&self) -> RwLockReadGuard<'_, ConfigNode> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn replace_snapshot(&self, tree: ConfigNode) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = tree;
    }

    /// Writes one value into the snapshot and announces it.
    pub(crate) fn store(&self, key: &PropertyPath, value: Value, origin: ChangeOrigin) {
        let result = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(key, value.clone());
        match result {
            Ok(_) => self.emit(ClientEvent::PropertyChanged {
                key: key.clone(),
                value,
                origin,
            }),
            Err(e) => warn!(%key, error = %e, "cannot store value"),
        }
    }

    /// Stores the confirmed result of a write, but only if the snapshot
    /// still holds the value that was sent.
    pub(crate) fn confirm(&self, key: &PropertyPath, sent: &Value, confirmed: Value) {
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            if snapshot.get_value(key) != Some(sent) {
                debug!(%key, "snapshot moved on, confirmation not stored");
                return;
            }
            if let Err(e) = snapshot.set(key, confirmed.clone()) {
                warn!(%key, error = %e, "cannot store value");
                return;
            }
        }
        self.emit(ClientEvent::PropertyChanged {
            key: key.clone(),
            value: confirmed,
            origin: ChangeOrigin::Confirmed,
        });
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`ControlClient`].
///
/// # Example
///
/// ```rust,ignore
/// let directory = PropertyDirectory::from_json_str(&std::fs::read_to_string("props.json")?)?;
/// let client = ControlClient::builder()
///     .directory(directory)
///     .connect_websocket("ws://lamp.local/ws")?;
/// client.begin().await?;
/// client.set("brightness", 8000i64.into()).await?;
/// ```
pub struct ControlClientBuilder {
    config: ClientConfig,
    directory: Option<PropertyDirectory>,
    schema: Option<Arc<dyn ConfigSchema>>,
}

impl ControlClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            directory: None,
            schema: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the property directory. Required.
    pub fn directory(mut self, directory: PropertyDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Sets how the `GET_CONFIG` reply is parsed.
    ///
    /// Defaults to a [`FieldLayout`] with one field per value property, in
    /// directory order.
    pub fn schema(mut self, schema: impl ConfigSchema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Builds a client that talks WebSocket to `url`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn connect_websocket(self, url: &str) -> Result<ControlClient, CtrlwireError> {
        self.build_with(WebSocketConnector::new(url))
    }

    /// Builds a client on top of any socket provider.
    ///
    /// Spawns the engine and the client's background tasks, so it must be
    /// called inside a Tokio runtime. The client does not connect until
    /// [`ControlClient::begin`].
    pub fn build_with<K: Connector>(self, connector: K) -> Result<ControlClient, CtrlwireError> {
        let directory = self
            .directory
            .ok_or_else(|| CtrlwireError::Builder("a property directory is required".into()))?;
        let config = self.config.validated();
        let schema = self
            .schema
            .unwrap_or_else(|| Arc::new(FieldLayout::from_directory(&directory)));

        let engine = spawn_engine(connector, config.engine.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let shared = Arc::new(Shared {
            engine,
            directory,
            schema,
            user_epoch: Arc::new(AtomicU64::new(0)),
            snapshot: RwLock::new(ConfigNode::default()),
            events,
        });

        tokio::spawn(crate::router::run(
            Arc::downgrade(&shared),
            shared.engine.subscribe(),
        ));
        tokio::spawn(crate::lifecycle::run(
            Arc::downgrade(&shared),
            shared.engine.state_changes(),
            config.engine.reconnect_max_delay(),
        ));
        let commits = spawn_pipeline(Arc::clone(&shared), config.throttle);

        debug!(properties = shared.directory.len(), "control client built");
        Ok(ControlClient { shared, commits })
    }
}

impl Default for ControlClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle to a device. Cheap to clone.
///
/// Holds a local snapshot of the device's configuration. Reads come from
/// the snapshot; writes update it at once and reach the device through the
/// commit pipeline. Dropping the last handle stops the background tasks
/// and closes the connection.
#[derive(Clone)]
pub struct ControlClient {
    shared: Arc<Shared>,
    commits: mpsc::Sender<CommitCommand>,
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient").finish_non_exhaustive()
    }
}

impl ControlClient {
    pub fn builder() -> ControlClientBuilder {
        ControlClientBuilder::new()
    }

    /// Starts connecting. The configuration is loaded once connected.
    pub async fn begin(&self) -> Result<(), CtrlwireError> {
        Ok(self.shared.engine.begin().await?)
    }

    /// Connects now if disconnected or waiting to reconnect.
    pub async fn connect(&self) -> Result<(), CtrlwireError> {
        self.shared.user_epoch.fetch_add(1, Ordering::AcqRel);
        Ok(self.shared.engine.connect().await?)
    }

    /// Disconnects and stays disconnected until [`connect`](Self::connect).
    ///
    /// Also cancels a reconnect scheduled after a failed config load.
    pub async fn close(&self) -> Result<(), CtrlwireError> {
        self.shared.user_epoch.fetch_add(1, Ordering::AcqRel);
        Ok(self.shared.engine.close().await?)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.engine.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    pub fn directory(&self) -> &PropertyDirectory {
        &self.shared.directory
    }

    /// The underlying engine, for raw requests.
    pub fn engine(&self) -> &EngineHandle {
        &self.shared.engine
    }

    /// The current value of `key`, if known.
    pub fn get(&self, key: &str) -> Option<Value> {
        let path: PropertyPath = key.parse().ok()?;
        self.shared.read_snapshot().get_value(&path).cloned()
    }

    /// A copy of the whole configuration tree.
    pub fn snapshot(&self) -> ConfigNode {
        self.shared.read_snapshot().clone()
    }

    /// Whether `key` and its section are visible under the current
    /// snapshot. `None` for unknown keys.
    pub fn is_visible(&self, key: &str) -> Option<bool> {
        let snapshot = self.shared.read_snapshot();
        self.shared.directory.is_visible(key, &snapshot)
    }

    /// Changes a property.
    ///
    /// Numeric values are clamped to the property's bounds and converted to
    /// its kind. If the result equals the current value nothing happens and
    /// `Ok(false)` is returned. Otherwise the snapshot is updated at once,
    /// the write is queued and `Ok(true)` is returned. A failed write
    /// restores the old value later and is reported through
    /// [`ClientEvent`]s, not here.
    pub async fn set(&self, key: &str, value: Value) -> Result<bool, CtrlwireError> {
        let descriptor = self.descriptor(key)?;
        if descriptor.role == PropertyRole::Action {
            return Err(CtrlwireError::NotAValue(key.to_string()));
        }
        let value = descriptor.prepare(value)?;

        let previous = {
            let mut snapshot = self
                .shared
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let current = snapshot.get_value(&descriptor.key).cloned();
            if current.as_ref() == Some(&value) {
                return Ok(false);
            }
            snapshot.set(&descriptor.key, value.clone())?;
            current
        };
        self.shared.emit(ClientEvent::PropertyChanged {
            key: descriptor.key.clone(),
            value: value.clone(),
            origin: ChangeOrigin::Local,
        });

        self.commits
            .send(CommitCommand::Write(CommitJob {
                descriptor,
                value,
                previous,
            }))
            .await
            .map_err(|_| EngineError::Shutdown)?;
        Ok(true)
    }

    /// Sends an action property's command and waits for the device.
    ///
    /// Fails with [`CtrlwireError::Busy`] if the previous trigger of the
    /// same action has not finished.
    pub async fn trigger(&self, key: &str) -> Result<(), CtrlwireError> {
        let descriptor = self.descriptor(key)?;
        if descriptor.role != PropertyRole::Action {
            return Err(CtrlwireError::NotAnAction(key.to_string()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commits
            .send(CommitCommand::Trigger {
                descriptor,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::Shutdown)?;
        reply_rx.await.map_err(|_| EngineError::Shutdown)?
    }

    /// Asks the device to restart.
    pub async fn restart(&self) -> Result<(), CtrlwireError> {
        self.shared.engine.request(RESTART, None).await?;
        Ok(())
    }

    /// Fetches the full configuration now instead of waiting for the next
    /// connect.
    pub async fn reload(&self) -> Result<(), CtrlwireError> {
        crate::lifecycle::load_config(&self.shared).await?;
        self.shared.emit(ClientEvent::ConfigLoaded);
        Ok(())
    }

    fn descriptor(&self, key: &str) -> Result<Arc<PropertyDescriptor>, CtrlwireError> {
        self.shared
            .directory
            .find(key)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| CtrlwireError::UnknownProperty(key.to_string()))
    }
}
