//! The commit pipeline: throttled, one-at-a-time writes per property.
//!
//! `set()` updates the snapshot right away and hands the write to this
//! actor. The actor guarantees two things per property:
//!
//! - **Spacing.** Writes go through a [`Throttle`], so a slider dragged
//!   across its range produces one write per interval, carrying the latest
//!   value, instead of one per pixel.
//! - **No overlap.** While a write is on the wire the property is busy.
//!   A value that comes due in that time is parked and sent once the
//!   in-flight write finishes. Later values replace the parked one.
//!
//! When a write succeeds the snapshot takes the value the device confirmed,
//! unless it has moved on in the meantime. When a write fails the snapshot
//! is restored to the last value the device accepted, unless a newer value
//! is still waiting to be sent, parked or in the throttle window. That
//! newer write inherits the revert target instead.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ctrlwire_engine::EngineError;
use ctrlwire_props::{PropertyDescriptor, PropertyPath};
use ctrlwire_protocol::Value;
use ctrlwire_throttle::{Throttle, ThrottleConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::client::Shared;
use crate::{ChangeOrigin, ClientEvent, CtrlwireError};

/// Commands accepted by the pipeline actor.
pub(crate) enum CommitCommand {
    Write(CommitJob),
    Trigger {
        descriptor: Arc<PropertyDescriptor>,
        reply: oneshot::Sender<Result<(), CtrlwireError>>,
    },
}

/// One pending write.
pub(crate) struct CommitJob {
    pub(crate) descriptor: Arc<PropertyDescriptor>,
    pub(crate) value: Value,
    /// Snapshot value before the change; the revert target.
    pub(crate) previous: Option<Value>,
}

impl CommitJob {
    fn key(&self) -> &PropertyPath {
        &self.descriptor.key
    }

    /// Keeps the newest value but the oldest revert target.
    fn merge(older: CommitJob, newer: CommitJob) -> CommitJob {
        CommitJob {
            descriptor: newer.descriptor,
            value: newer.value,
            previous: older.previous,
        }
    }
}

/// How a write or action on the wire ended.
enum Completion {
    Write {
        job: CommitJob,
        result: Result<Value, EngineError>,
    },
    Action { success: bool },
}

pub(crate) fn spawn_pipeline(
    shared: Arc<Shared>,
    config: ThrottleConfig,
) -> mpsc::Sender<CommitCommand> {
    let (tx, rx) = mpsc::channel(64);
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let actor = CommitPipeline {
        shared,
        commands: rx,
        throttle: Throttle::new(config),
        busy: HashSet::new(),
        parked: HashMap::new(),
        done_tx,
        done_rx,
    };
    tokio::spawn(actor.run());
    tx
}

struct CommitPipeline {
    shared: Arc<Shared>,
    commands: mpsc::Receiver<CommitCommand>,
    throttle: Throttle<PropertyPath, CommitJob>,
    busy: HashSet<PropertyPath>,
    /// Jobs that came due while their property was busy.
    parked: HashMap<PropertyPath, CommitJob>,
    done_tx: mpsc::UnboundedSender<(PropertyPath, Completion)>,
    done_rx: mpsc::UnboundedReceiver<(PropertyPath, Completion)>,
}

impl CommitPipeline {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(CommitCommand::Write(job)) => {
                        let key = job.key().clone();
                        if let Some(job) = self.throttle.offer_with(key, job, CommitJob::merge) {
                            self.dispatch(job);
                        }
                    }
                    Some(CommitCommand::Trigger { descriptor, reply }) => {
                        self.trigger(descriptor, reply);
                    }
                    None => break,
                },
                due = self.throttle.wait_expired() => {
                    for (_, job) in due {
                        self.dispatch(job);
                    }
                }
                Some((key, completion)) = self.done_rx.recv() => {
                    self.complete(key, completion);
                }
            }
        }
        debug!(in_flight = self.busy.len(), "commit pipeline stopped");
    }

    /// Sends `job` now, or parks it if its property is busy.
    fn dispatch(&mut self, job: CommitJob) {
        let key = job.key().clone();
        if self.busy.contains(&key) {
            debug!(%key, "property busy, parking write");
            let job = match self.parked.remove(&key) {
                Some(older) => CommitJob::merge(older, job),
                None => job,
            };
            self.parked.insert(key, job);
            return;
        }

        let write = match job.descriptor.encode_write(&job.value) {
            Ok(write) => write,
            Err(e) => {
                warn!(%key, error = %e, "cannot encode write");
                self.revert(&job);
                return;
            }
        };

        self.busy.insert(key.clone());
        self.shared.emit(ClientEvent::CommitStarted { key: key.clone() });

        let engine = self.shared.engine.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = engine
                .request(write.command, write.payload.as_deref())
                .await
                .map(|_| write.confirmed);
            let _ = done.send((key, Completion::Write { job, result }));
        });
    }

    fn trigger(
        &mut self,
        descriptor: Arc<PropertyDescriptor>,
        reply: oneshot::Sender<Result<(), CtrlwireError>>,
    ) {
        let key = descriptor.key.clone();
        if !self.busy.insert(key.clone()) {
            let _ = reply.send(Err(CtrlwireError::Busy(key.to_string())));
            return;
        }
        self.shared.emit(ClientEvent::CommitStarted { key: key.clone() });

        let engine = self.shared.engine.clone();
        let done = self.done_tx.clone();
        let command = descriptor.action_command();
        tokio::spawn(async move {
            let result = engine.request(command, None).await;
            if let Err(e) = &result {
                warn!(key = %key, error = %e, "action failed");
            }
            let success = result.is_ok();
            let _ = reply.send(result.map(|_| ()).map_err(CtrlwireError::from));
            let _ = done.send((key, Completion::Action { success }));
        });
    }

    fn complete(&mut self, key: PropertyPath, completion: Completion) {
        self.busy.remove(&key);

        match completion {
            Completion::Action { success } => {
                self.shared.emit(ClientEvent::CommitFinished {
                    key: key.clone(),
                    success,
                });
            }
            Completion::Write { job, result } => {
                let success = result.is_ok();
                match result {
                    Ok(confirmed) => {
                        debug!(%key, value = %confirmed, "write confirmed");
                        if let Some(next) = self.next_write(&key) {
                            next.previous = Some(confirmed.clone());
                        }
                        self.shared.confirm(&key, &job.value, confirmed);
                    }
                    Err(e) => {
                        warn!(%key, error = %e, "write failed");
                        // A newer value still goes out; if that one fails
                        // too, restore what this write started from.
                        match self.next_write(&key) {
                            Some(next) => next.previous = job.previous,
                            None => self.revert(&job),
                        }
                    }
                }
                self.shared.emit(ClientEvent::CommitFinished {
                    key: key.clone(),
                    success,
                });
            }
        }

        if let Some(job) = self.parked.remove(&key) {
            self.dispatch(job);
        }
    }

    /// The write for `key` that goes out next: a parked job first, then
    /// one waiting in the throttle window.
    fn next_write(&mut self, key: &PropertyPath) -> Option<&mut CommitJob> {
        match self.parked.get_mut(key) {
            Some(job) => Some(job),
            None => self.throttle.queued_mut(key),
        }
    }

    fn revert(&self, job: &CommitJob) {
        match &job.previous {
            Some(previous) => {
                self.shared
                    .store(job.key(), previous.clone(), ChangeOrigin::Reverted);
            }
            None => debug!(key = %job.key(), "no previous value to restore"),
        }
    }
}
