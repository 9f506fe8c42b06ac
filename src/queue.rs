//! The primary (bounded) flush queue and its unbounded backup overflow,
//! plus the cooperative cancellation flag shared between a sealer and the
//! flush loop.

use crate::chunk::TaggedChunk;
use crate::error::BufferError;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BLOCKING_PUT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A flag polled by blocking operations so a caller can abort a worker
/// that is parked waiting on a full queue or mid-flush, without relying on
/// OS-level thread interruption.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that starts out not cancelled.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounded FIFO of sealed chunks awaiting transport. Applies backpressure
/// to sealers: a full queue blocks `push_blocking` rather than growing.
pub struct FlushQueue {
    sender: Sender<TaggedChunk>,
    receiver: Receiver<TaggedChunk>,
    queued_bytes: AtomicU64,
}

impl FlushQueue {
    /// Create a queue bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            queued_bytes: AtomicU64::new(0),
        }
    }

    /// Enqueue `chunk`, blocking while the queue is full. On cancellation
    /// or a disconnected receiver the chunk is handed back alongside the
    /// error so the caller can fall back to the backup queue instead of
    /// losing it.
    pub fn push_blocking(
        &self,
        mut chunk: TaggedChunk,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), (BufferError, TaggedChunk)> {
        loop {
            let len = chunk.len() as u64;
            match self.sender.try_send(chunk) {
                Ok(()) => {
                    self.queued_bytes.fetch_add(len, Ordering::AcqRel);
                    return Ok(());
                }
                Err(TrySendError::Full(returned)) => {
                    if cancel.is_cancelled() {
                        return Err((BufferError::Cancelled, returned));
                    }
                    chunk = returned;
                    std::thread::sleep(BLOCKING_PUT_POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(returned)) => {
                    return Err((BufferError::Cancelled, returned))
                }
            }
        }
    }

    /// Pop the next sealed chunk without blocking.
    pub fn try_pop(&self) -> Option<TaggedChunk> {
        let chunk = self.receiver.try_recv().ok()?;
        self.queued_bytes
            .fetch_sub(chunk.len() as u64, Ordering::AcqRel);
        Some(chunk)
    }

    /// Number of chunks currently queued.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// True if no chunks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the byte lengths of every chunk currently queued.
    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes.load(Ordering::Acquire)
    }
}

/// Unbounded overflow FIFO, used only when a re-enqueue onto the
/// [`FlushQueue`] is refused during error handling.
pub struct BackupQueue {
    sender: Sender<TaggedChunk>,
    receiver: Receiver<TaggedChunk>,
}

impl Default for BackupQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupQueue {
    /// Create an empty backup queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Push a chunk. Never blocks and never fails (short of the process
    /// running out of memory).
    pub fn push(&self, chunk: TaggedChunk) {
        let _ = self.sender.send(chunk);
    }

    /// Pop the next chunk without blocking.
    pub fn try_pop(&self) -> Option<TaggedChunk> {
        self.receiver.try_recv().ok()
    }

    /// Number of chunks currently queued.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// True if no chunks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
