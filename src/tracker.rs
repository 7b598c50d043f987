//! Correlation of outgoing requests with their eventual results.
//!
//! Every `submit` registers a pending call keyed by a strictly increasing
//! request id. A pending call has exactly one fulfiller: the reader task on a
//! matching response, or the session on cancel or drain. Whichever arrives
//! first removes the entry atomically, so the loser of any race finds nothing
//! and the awaiting caller observes exactly one result.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::result::QueryResult;

/// Message delivered to a caller when its query is cancelled locally.
pub const CANCELLED_MESSAGE: &str = "query cancelled";

struct PendingCall {
    tx: oneshot::Sender<QueryResult>,
    submitted_at: Instant,
}

/// Table of in-flight requests awaiting their results.
#[derive(Default)]
pub struct RequestTracker {
    next_id: AtomicU64,
    pending: DashMap<u64, PendingCall>,
}

impl RequestTracker {
    /// Create an empty tracker. Ids start at 1.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a new pending call.
    ///
    /// Returns the assigned request id and the receiver the caller awaits.
    /// Transmission of the request is the caller's responsibility.
    #[must_use]
    pub fn submit(&self) -> (u64, oneshot::Receiver<QueryResult>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                tx,
                submitted_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Fulfill the pending call for `id` with `result`.
    ///
    /// Unknown or already-resolved ids are a silent no-op; a response may
    /// legitimately race with cancellation or disconnect. Returns whether a
    /// pending call was fulfilled.
    pub fn resolve(&self, id: u64, result: QueryResult) -> bool {
        let Some((_, call)) = self.pending.remove(&id) else {
            debug!(id, "response for unknown or resolved request discarded");
            return false;
        };
        debug!(id, elapsed = ?call.submitted_at.elapsed(), "request resolved");
        // The receiver may already be dropped (caller gave up); still counts
        // as resolved for the at-most-once law.
        let _ = call.tx.send(result);
        true
    }

    /// Cancel the pending call for `id`, if still pending.
    ///
    /// The caller receives an error result carrying [`CANCELLED_MESSAGE`].
    /// Returns whether a pending call was cancelled.
    pub fn cancel(&self, id: u64) -> bool { self.resolve(id, QueryResult::failed(CANCELLED_MESSAGE)) }

    /// Resolve every outstanding pending call with an error carrying `reason`.
    ///
    /// Invoked on disconnect or fatal connection error so no caller blocks
    /// forever. Returns the number of calls drained; the table is empty
    /// afterwards.
    pub fn drain_all(&self, reason: &str) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut drained = 0;
        for id in ids {
            if let Some((_, call)) = self.pending.remove(&id) {
                let _ = call.tx.send(QueryResult::failed(reason));
                drained += 1;
            }
        }
        if drained > 0 {
            debug!(drained, reason, "pending calls drained");
        }
        drained
    }

    /// Number of requests currently awaiting a result.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.pending.len() }
}
