use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePriority {
    Urgent,
    Normal,
    Informational,
}

impl ResponsePriority {
    /// Lower ranks dequeue first.
    fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::Normal => 1,
            Self::Informational => 2,
        }
    }
}

/// One spoken response waiting for the TTS loop. Owned by the queue until
/// dequeued, at which point ownership transfers to the output loop and the
/// item can no longer be cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub text: String,
    pub priority: ResponsePriority,
    pub source_request_id: Uuid,
    /// All requests of one engine session share a lineage; preemption only
    /// drops stale narration within it.
    pub lineage: Uuid,
    pub supersedes_previous: bool,
}

struct PendingItem {
    response: QueuedResponse,
    seq: u64,
}

struct QueueInner {
    pending: VecDeque<PendingItem>,
    next_seq: u64,
}

/// Serializes spoken output: strict priority order, FIFO within a
/// priority, preemption of stale queued narration. A single output loop
/// consumes it, so responses can never overlap.
pub struct ResponseQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    closed: AtomicBool,
    delivered: AtomicU64,
    cancelled: AtomicU64,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    pub fn enqueue(&self, response: QueuedResponse) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::error!("response queue lock poisoned; response dropped");
            return;
        };

        // An urgent superseding response makes queued narration for the
        // same lineage stale. Stale narration is actively harmful to a
        // blind user mid-navigation, not merely redundant.
        if response.priority == ResponsePriority::Urgent && response.supersedes_previous {
            let before = inner.pending.len();
            inner.pending.retain(|item| {
                item.response.lineage != response.lineage
                    || item.response.priority == ResponsePriority::Urgent
            });
            let dropped = before - inner.pending.len();
            if dropped > 0 {
                self.cancelled.fetch_add(dropped as u64, Ordering::Relaxed);
                tracing::info!(
                    dropped,
                    lineage = %response.lineage,
                    "superseded stale queued responses"
                );
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        tracing::debug!(
            request_id = %response.source_request_id,
            priority = ?response.priority,
            seq,
            "response enqueued"
        );
        inner.pending.push_back(PendingItem { response, seq });
        drop(inner);
        self.notify.notify_one();
    }

    /// Blocks until a response is available. Returns `None` only after
    /// `close()` once the queue has drained.
    pub async fn dequeue_next(&self) -> Option<QueuedResponse> {
        loop {
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn try_dequeue(&self) -> Option<QueuedResponse> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        let best = inner
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, item)| (item.response.priority.rank(), item.seq))
            .map(|(i, _)| i)?;
        let item = inner.pending.remove(best)?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(item.response)
    }

    /// Drops still-queued responses for one request. Items already handed
    /// to the output loop are past cancellation.
    pub fn cancel_pending(&self, request_id: Uuid) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let before = inner.pending.len();
        inner
            .pending
            .retain(|item| item.response.source_request_id != request_id);
        let dropped = before - inner.pending.len();
        self.cancelled.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    /// Wakes the output loop for shutdown; `dequeue_next` returns `None`
    /// once the queue is empty.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn cancelled_count(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.pending.len()).unwrap_or(0)
    }
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new()
    }
}
