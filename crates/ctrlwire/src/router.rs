//! Routes device notifications into the snapshot.

use std::sync::Weak;

use ctrlwire_protocol::Frame;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace, warn};

use crate::ChangeOrigin;
use crate::client::Shared;

/// Applies every notification the engine broadcasts until the engine stops
/// or the client is dropped.
pub(crate) async fn run(shared: Weak<Shared>, mut notifications: broadcast::Receiver<Frame>) {
    loop {
        let frame = match notifications.recv().await {
            Ok(frame) => frame,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "notification router fell behind, frames dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        apply(&shared, &frame);
    }
    debug!("notification router stopped");
}

/// Decodes one notification and stores its value. Does not trigger a
/// write back to the device.
pub(crate) fn apply(shared: &Shared, frame: &Frame) {
    let descriptor = {
        let snapshot = shared.read_snapshot();
        shared
            .directory
            .route(frame.frame_type, &snapshot)
            .cloned()
    };
    let Some(descriptor) = descriptor else {
        warn!(frame_type = frame.frame_type, "notification for unknown property");
        return;
    };

    match descriptor.decode_notification(frame.frame_type, &mut frame.reader()) {
        Ok(value) => {
            trace!(key = %descriptor.key, %value, "notification");
            shared.store(&descriptor.key, value, ChangeOrigin::Device);
        }
        Err(e) => {
            warn!(key = %descriptor.key, error = %e, "undecodable notification");
        }
    }
}
