//! Chunk types: the writable [`Chunk`] (a tag's in-flight retention
//! buffer) and the read-only [`TaggedChunk`] it becomes once sealed.

use std::time::{SystemTime, UNIX_EPOCH};

/// A contiguous, fixed-capacity byte region on loan from the
/// [`crate::pool::BufferPool`].
pub type Region = Vec<u8>;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A writable, growing chunk for one tag.
///
/// Invariants: `0 <= position <= capacity`; `created_at` is set when the
/// region is (re)allocated and is reset only when the chunk is replaced by
/// a larger one that carries its bytes forward.
#[derive(Debug)]
pub struct Chunk {
    region: Region,
    position: usize,
    created_at_ms: u64,
}

impl Chunk {
    /// Wrap a freshly acquired region as a brand-new chunk.
    pub fn new(region: Region) -> Self {
        Self {
            region,
            position: 0,
            created_at_ms: now_millis(),
        }
    }

    /// Wrap a region that carries over bytes from a previous, smaller
    /// chunk (used when growing).
    pub fn from_carried_over(region: Region, position: usize) -> Self {
        Self {
            region,
            position,
            created_at_ms: now_millis(),
        }
    }

    /// Total capacity of the backing region.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Bytes currently written.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes still free for writing.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.position
    }

    /// Wall-clock creation time in milliseconds since the Unix epoch.
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Age in milliseconds relative to the given "now".
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Append `bytes` to the chunk. Caller must have already verified
    /// `bytes.len() <= self.remaining()`.
    pub fn write(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.remaining());
        let end = self.position + bytes.len();
        self.region[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    /// Copy this chunk's written prefix into a larger region, returning the
    /// new chunk and this chunk's now-empty region (for release to the
    /// pool).
    pub fn grow_into(self, mut new_region: Region) -> (Chunk, Region) {
        debug_assert!(new_region.len() >= self.position);
        new_region[..self.position].copy_from_slice(&self.region[..self.position]);
        let position = self.position;
        (Chunk::from_carried_over(new_region, position), self.region)
    }

    /// Seal this chunk, producing a read-only [`TaggedChunk`] whose
    /// readable range is `[0, position)`.
    pub fn seal(self, tag: impl Into<String>) -> TaggedChunk {
        TaggedChunk {
            tag: tag.into(),
            region: self.region,
            limit: self.position,
        }
    }
}

/// A sealed, read-only chunk paired with its tag.
#[derive(Debug)]
pub struct TaggedChunk {
    tag: String,
    region: Region,
    limit: usize,
}

impl TaggedChunk {
    /// Construct directly from a region and an explicit readable limit,
    /// used when replaying a region loaded from disk.
    pub fn from_region(tag: impl Into<String>, region: Region, limit: usize) -> Self {
        debug_assert!(limit <= region.len());
        Self {
            tag: tag.into(),
            region,
            limit,
        }
    }

    /// The tag this chunk belongs to.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The readable bytes, `[0, limit)`.
    pub fn bytes(&self) -> &[u8] {
        &self.region[..self.limit]
    }

    /// Number of readable bytes.
    pub fn len(&self) -> usize {
        self.limit
    }

    /// True if the chunk carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    /// Capacity of the underlying region, for returning it to the pool by
    /// capacity class.
    pub fn region_capacity(&self) -> usize {
        self.region.len()
    }

    /// Consume the chunk, returning its tag, backing region, and limit.
    pub fn into_parts(self) -> (String, Region, usize) {
        (self.tag, self.region, self.limit)
    }
}
