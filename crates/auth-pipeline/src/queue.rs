//! Requests parked behind an in-flight renewal
//!
//! Each parked request holds the sending half of a oneshot channel; the
//! caller awaits the receiving half. Sending consumes the sender, so an
//! entry can be settled at most once. Entries are settled in the order they
//! were enqueued.
//!
//! Draining goes through `Drain`, which owns the entries taken out of the
//! queue. Whatever path ends the drain (completion, early return, unwinding,
//! or the draining future being dropped), `Drain`'s destructor rejects every
//! entry it still holds, so no caller is left waiting.

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::oneshot;
use tracing::{debug, warn};
use transport::{ApiRequest, ApiResponse};

use crate::error::{Error, Result};

/// Receiving half handed to a parked caller.
pub type Settled = oneshot::Receiver<Result<ApiResponse>>;

/// One caller blocked behind a renewal.
#[derive(Debug)]
pub struct PendingRequest {
    id: u64,
    request: ApiRequest,
    settle: oneshot::Sender<Result<ApiResponse>>,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }
}

fn settle(id: u64, sender: oneshot::Sender<Result<ApiResponse>>, outcome: Result<ApiResponse>) {
    if sender.send(outcome).is_err() {
        debug!(id, "parked caller went away before settlement");
    }
}

/// FIFO of parked requests.
///
/// Only valid while a renewal is in progress; the coordinator enforces that.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: VecDeque<PendingRequest>,
    next_id: u64,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request; returns its sequence number and settlement receiver.
    pub fn enqueue(&mut self, request: ApiRequest) -> (u64, Settled) {
        let id = self.next_id;
        self.next_id += 1;
        let (settle, settled) = oneshot::channel();
        self.entries.push_back(PendingRequest {
            id,
            request,
            settle,
        });
        (id, settled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry, leaving the queue empty.
    pub fn take(&mut self) -> Drain {
        Drain {
            entries: std::mem::take(&mut self.entries),
        }
    }

    /// Replay every entry in order. No-op on an empty queue.
    pub async fn drain_success<F, Fut>(&mut self, replay: F)
    where
        F: FnMut(ApiRequest) -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        self.take().succeed(replay).await;
    }

    /// Reject every entry in order with `error`. No-op on an empty queue.
    pub fn drain_failure(&mut self, error: &Error) {
        self.take().fail(error);
    }
}

/// Entries taken out of a `RetryQueue`, pending settlement.
#[derive(Debug)]
pub struct Drain {
    entries: VecDeque<PendingRequest>,
}

impl Drain {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay each entry in arrival order and settle it with the outcome.
    ///
    /// An entry is settled before the next one is replayed.
    pub async fn succeed<F, Fut>(mut self, mut replay: F)
    where
        F: FnMut(ApiRequest) -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        while let Some(PendingRequest {
            id,
            request,
            settle: sender,
        }) = self.entries.pop_front()
        {
            let outcome = replay(request).await;
            settle(id, sender, outcome);
        }
    }

    /// Reject each entry in arrival order.
    pub fn fail(mut self, error: &Error) {
        for entry in self.entries.drain(..) {
            settle(entry.id, entry.settle, Err(error.clone()));
        }
    }
}

impl Drop for Drain {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        warn!(
            unsettled = self.entries.len(),
            "drain ended early, rejecting remaining requests"
        );
        let error = Error::Cancelled("request was not replayed before its drain ended".into());
        for entry in self.entries.drain(..) {
            settle(entry.id, entry.settle, Err(error.clone()));
        }
    }
}
