//! Request id allocation and the pending-request table.
//!
//! A pending request is removed from the table exactly once: by its reply,
//! by its deadline, or by a teardown. Removal hands back the only
//! `oneshot::Sender` for that request, so completing it twice cannot
//! happen.

use std::collections::HashMap;

use ctrlwire_protocol::Frame;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::EngineError;

/// One past the largest id ever handed out. Ids run `1..MAX_REQUEST_ID`.
pub(crate) const MAX_REQUEST_ID: u16 = u16::MAX;

/// Hands out request ids `1, 2, …, 65534, 1, …`.
///
/// Id `0` is reserved for notifications and never produced.
#[derive(Debug)]
pub(crate) struct RequestIdAllocator {
    next: u16,
}

impl RequestIdAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    fn next_raw(&mut self) -> u16 {
        if self.next >= MAX_REQUEST_ID {
            self.next = 1;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    /// Returns the next id for which `in_use` is false.
    ///
    /// `None` only if every id is in use.
    pub(crate) fn allocate(&mut self, in_use: impl Fn(u16) -> bool) -> Option<u16> {
        (1..MAX_REQUEST_ID)
            .map(|_| self.next_raw())
            .find(|&id| !in_use(id))
    }
}

pub(crate) type Reply = oneshot::Sender<Result<Frame, EngineError>>;

/// A request waiting for its reply.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) command: u8,
    pub(crate) deadline: Instant,
    reply: Reply,
}

impl PendingRequest {
    pub(crate) fn new(command: u8, deadline: Instant, reply: Reply) -> Self {
        Self {
            command,
            deadline,
            reply,
        }
    }

    /// Delivers the outcome. A caller that stopped waiting is not an error.
    pub(crate) fn complete(self, result: Result<Frame, EngineError>) {
        let _ = self.reply.send(result);
    }
}

/// Outstanding requests keyed by request id.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    entries: HashMap<u16, PendingRequest>,
}

impl PendingRequests {
    pub(crate) fn insert(&mut self, id: u16, request: PendingRequest) {
        let previous = self.entries.insert(id, request);
        debug_assert!(previous.is_none(), "request id {id} allocated twice");
    }

    pub(crate) fn contains(&self, id: u16) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn take(&mut self, id: u16) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|r| r.deadline).min()
    }

    /// Removes and returns every request whose deadline is at or before
    /// `now`.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<(u16, PendingRequest)> {
        let due: Vec<u16> = self
            .entries
            .iter()
            .filter(|(_, r)| r.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        due.into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|r| (id, r)))
            .collect()
    }

    /// Rejects every outstanding request with `RequestAborted`.
    pub(crate) fn abort_all(&mut self) -> usize {
        let count = self.entries.len();
        for (id, request) in self.entries.drain() {
            request.complete(Err(EngineError::RequestAborted(id)));
        }
        count
    }

    /// Rejects every outstanding request with `err`.
    pub(crate) fn fail_all(&mut self, err: &EngineError) {
        for (_, request) in self.entries.drain() {
            request.complete(Err(err.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
