//! Correlation of outstanding calls with their eventual responses.
//!
//! Each call registered here gets a fresh integer id, unique among calls
//! that are still outstanding, and a oneshot slot the dispatcher resolves
//! when the matching response arrives. The oneshot channel enforces the
//! exactly-once delivery guarantee by construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use crate::error::RpcError;

/// Outcome delivered to a waiting caller.
pub type CallReply = Result<Value, RpcError>;

/// The set of calls awaiting a response.
pub struct PendingCalls {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<CallReply>>>,
}

impl PendingCalls {
    /// Creates an empty correlation table. Ids start at 1 and are never
    /// reused for the lifetime of the connection.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates the next call id and a slot for its reply.
    ///
    /// The caller awaits the returned receiver; the entry is removed when
    /// the dispatcher resolves it or the connection is invalidated.
    pub async fn register(&self) -> (u64, oneshot::Receiver<CallReply>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        (id, rx)
    }

    /// Delivers a reply to the caller waiting on `id`.
    ///
    /// A reply for an id that was never registered, or that was already
    /// resolved, indicates a non-conforming server rather than corrupted
    /// local state; it is logged and dropped.
    pub async fn resolve(&self, id: u64, reply: CallReply) {
        let Some(waiter) = self.waiters.lock().await.remove(&id) else {
            debug!(id, "dropping response for unknown request id");
            return;
        };

        if waiter.send(reply).is_err() {
            debug!(id, "caller gave up before its response arrived");
        }
    }

    /// Removes an entry that will never be resolved (its request could not
    /// be sent, or the dispatcher is gone). Returns whether the entry was
    /// still present.
    pub async fn discard(&self, id: u64) -> bool {
        self.waiters.lock().await.remove(&id).is_some()
    }

    /// Fails every still-pending call with [`RpcError::ConnectionClosed`].
    ///
    /// Called on connection loss so no caller blocks forever past process
    /// death.
    pub async fn invalidate_all(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock().await);
        if !waiters.is_empty() {
            debug!(count = waiters.len(), "invalidating pending calls");
        }
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(RpcError::ConnectionClosed));
        }
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}
