//! Follows the engine's connection state.
//!
//! Every time the engine reaches `Connected` the full configuration is
//! fetched and replaces the snapshot. If that fails the connection is
//! considered unusable: it is closed and reopened after the longest
//! reconnect delay, unless the user closes or connects in the meantime.

use std::sync::{Arc, Weak};
use std::sync::atomic::Ordering;
use std::time::Duration;

use ctrlwire_engine::{ConnectionState, EngineError, StateChange};
use ctrlwire_protocol::GET_CONFIG;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::client::Shared;
use crate::{ClientEvent, CtrlwireError};

pub(crate) async fn run(
    shared: Weak<Shared>,
    mut changes: broadcast::Receiver<StateChange>,
    retry_delay: Duration,
) {
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "lifecycle lagged behind state changes");
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                // Resync: a connection may have opened among the skipped.
                if shared.engine.is_connected() {
                    on_connected(&shared, retry_delay).await;
                }
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(shared) = shared.upgrade() else {
            break;
        };
        match change.to {
            ConnectionState::Connected => {
                on_connected(&shared, retry_delay).await;
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting
                if matches!(
                    change.from,
                    ConnectionState::Connected | ConnectionState::Connecting
                ) =>
            {
                shared.emit(ClientEvent::Disconnected);
            }
            _ => {}
        }
    }
    debug!("lifecycle watcher stopped");
}

async fn on_connected(shared: &Shared, retry_delay: Duration) {
    let epoch = shared.user_epoch.load(Ordering::Acquire);
    match load_config(shared).await {
        Ok(()) => {
            shared.emit(ClientEvent::ConfigLoaded);
            shared.emit(ClientEvent::Connected);
        }
        // The connection went away under the request; the engine is
        // already reconnecting or was closed on purpose.
        Err(CtrlwireError::Engine(
            e @ (EngineError::NotConnected
            | EngineError::RequestAborted(_)
            | EngineError::RequestTimeout(_)),
        )) => {
            debug!(error = %e, "config load interrupted");
        }
        Err(e) => {
            error!(error = %e, "config load failed after connect");
            if let Err(e) = shared.engine.close().await {
                debug!(error = %e, "close after failed config load");
                return;
            }
            info!(delay_ms = retry_delay.as_millis() as u64, "reconnect scheduled");
            let engine = shared.engine.clone();
            let user_epoch = Arc::clone(&shared.user_epoch);
            tokio::spawn(async move {
                time::sleep(retry_delay).await;
                if user_epoch.load(Ordering::Acquire) != epoch {
                    debug!("reconnect after failed config load superseded by user");
                    return;
                }
                if let Err(e) = engine.connect().await {
                    debug!(error = %e, "reconnect after failed config load");
                }
            });
        }
    }
}

/// Fetches the configuration and swaps it into the snapshot.
pub(crate) async fn load_config(shared: &Shared) -> Result<(), CtrlwireError> {
    let frame = shared.engine.request(GET_CONFIG, None).await?;
    let tree = shared.schema.parse(&frame)?;
    shared.replace_snapshot(tree);
    info!(bytes = frame.payload.len(), "config loaded");
    Ok(())
}
