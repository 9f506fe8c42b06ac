//! Per-tag retention buffers, the chunk growth policy, and sealing.

use crate::chunk::{Chunk, TaggedChunk};
use crate::error::{BufferError, Result};
use crate::pool::BufferPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Maps each tag to its currently-growing chunk (or `None` if the tag has
/// no in-flight chunk). Every read, grow, install, and seal runs under one
/// mutex scoped to the whole map: the work performed while holding it is
/// memcpy-bounded, so a single lock outperforms per-tag striping for the
/// expected workload. Implementers needing per-tag parallelism can stripe
/// by tag hash without changing these semantics.
pub struct RetentionMap {
    inner: Mutex<HashMap<String, Option<Chunk>>>,
    pool: Arc<BufferPool>,
    initial: u64,
    expand_ratio: f64,
    retention_size: u64,
    retention_ms: u64,
}

impl RetentionMap {
    /// Create an empty map driven by the given pool and growth policy.
    pub fn new(
        pool: Arc<BufferPool>,
        initial: u64,
        expand_ratio: f64,
        retention_size: u64,
        retention_ms: u64,
    ) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            pool,
            initial,
            expand_ratio,
            retention_size,
            retention_ms,
        }
    }

    /// Ensure `tag`'s chunk can fit `bytes`, write them, and seal the
    /// chunk if the retention-size threshold is now exceeded.
    ///
    /// Returns the sealed chunk if one resulted; the caller is responsible
    /// for handing it to the flush queue *after* this call returns, so the
    /// map's mutex is never held across a blocking enqueue.
    pub fn append(&self, tag: &str, bytes: &[u8]) -> Result<Option<TaggedChunk>> {
        let mut map = self.inner.lock().unwrap();
        let slot = map.entry(tag.to_string()).or_insert(None);

        let fits_current = matches!(slot, Some(chunk) if chunk.remaining() >= bytes.len());

        if !fits_current {
            let existing = slot.take();
            let base_capacity = existing.as_ref().map_or(self.initial, |c| c.capacity() as u64);
            let base_position = existing.as_ref().map_or(0, |c| c.position());

            let mut target = base_capacity;
            while (target as usize) < base_position + bytes.len() {
                let grown = (target as f64 * self.expand_ratio).ceil() as u64;
                debug_assert!(grown > target, "expand_ratio must be > 1.0");
                target = grown;
            }

            let region = match self.pool.acquire(target as usize) {
                Some(region) => region,
                None => {
                    // Acquisition failed: put the tag's existing chunk back
                    // exactly as it was and propagate BufferFull without
                    // mutating anything.
                    *slot = existing;
                    return Err(BufferError::BufferFull {
                        tag: tag.to_string(),
                    });
                }
            };

            let new_chunk = match existing {
                Some(old) => {
                    let (grown, old_region) = old.grow_into(region);
                    self.pool.release(old_region);
                    tracing::debug!(tag, new_capacity = target, "chunk grown");
                    grown
                }
                None => Chunk::new(region),
            };
            *slot = Some(new_chunk);
        }

        let chunk = slot.as_mut().expect("chunk installed above");
        chunk.write(bytes);

        if chunk.position() > self.retention_size as usize {
            let sealed = slot.take().expect("chunk just written to").seal(tag);
            tracing::debug!(tag, bytes = sealed.len(), "chunk sealed: size threshold");
            Ok(Some(sealed))
        } else {
            Ok(None)
        }
    }

    /// Seal every chunk whose age exceeds the retention time, or, when
    /// `force` is set, every non-empty chunk regardless of age or size.
    /// Returns the sealed chunks for the caller to hand to the flush
    /// queue.
    pub fn sweep(&self, now_ms: u64, force: bool) -> Vec<TaggedChunk> {
        let mut map = self.inner.lock().unwrap();
        let mut sealed = Vec::new();

        for (tag, slot) in map.iter_mut() {
            let should_seal = match slot {
                Some(chunk) if chunk.is_empty() => false,
                Some(chunk) => force || chunk.age_ms(now_ms) >= self.retention_ms,
                None => false,
            };
            if should_seal {
                let chunk = slot.take().expect("checked Some above");
                tracing::debug!(
                    tag,
                    forced = force,
                    bytes = chunk.position(),
                    "chunk sealed: sweep"
                );
                sealed.push(chunk.seal(tag.clone()));
            }
        }

        sealed
    }

    /// Sum of the write positions of every tag's in-flight chunk (the
    /// "buffered but not yet sealed" portion of `buffered_data_size`).
    pub fn buffered_bytes(&self) -> u64 {
        let map = self.inner.lock().unwrap();
        map.values()
            .filter_map(|slot| slot.as_ref())
            .map(|chunk| chunk.position() as u64)
            .sum()
    }

    /// Remove every tag and release all in-flight chunks back to the
    /// pool, used by `close` after the final forced sweep has already
    /// drained writable bytes into sealed chunks.
    pub fn clear(&self) {
        let mut map = self.inner.lock().unwrap();
        map.clear();
    }
}
