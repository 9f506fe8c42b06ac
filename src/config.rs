//! Engine configuration.

use std::path::PathBuf;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Selects the backing storage mode for pooled chunk regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Regions are plain heap-allocated `Vec<u8>` buffers.
    Heap,
    /// Regions are allocated off-heap (modeled here as the same heap
    /// allocation, isolated from the caller's own working set). Kept as a
    /// distinct mode so callers can select it explicitly, matching the
    /// direct/heap split of the source buffer pool.
    Direct,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Heap
    }
}

/// Configuration for a [`crate::engine::BufferEngine`].
///
/// Constructed via [`BufferConfig::new`] and customized with the `with_*`
/// builder methods; all fields have documented defaults so `BufferConfig::new()`
/// alone produces a usable configuration.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Global ceiling on outstanding pool capacity, in bytes.
    pub max_buffer_size: u64,
    /// First allocation size for a tag's chunk, in bytes.
    pub chunk_initial_size: u64,
    /// Growth factor applied (repeatedly) when a chunk must expand.
    pub chunk_expand_ratio: f64,
    /// Size threshold past which a chunk is sealed.
    pub chunk_retention_size: u64,
    /// Age threshold (milliseconds) past which a chunk is sealed.
    pub chunk_retention_time_ms: u64,
    /// Directory used to persist unflushed chunks on `close`, and to
    /// replay them on `init`. `None` disables persistence.
    pub file_backup_dir: Option<PathBuf>,
    /// Filename prefix used for backup files.
    pub file_backup_prefix: String,
    /// Storage mode used by the buffer pool.
    pub storage_mode: StorageMode,
    /// Bound on the primary flush queue. The distilled design calls the
    /// queue "bounded" without fixing a size; this field makes that bound
    /// configurable.
    pub flush_queue_capacity: usize,
    /// Opaque list of encoder plugin identifiers forwarded to an external
    /// encoder's own construction. The engine never inspects these; it
    /// only carries the list so a caller's `RecordEncoder` can read it
    /// back out of the config it was built from.
    pub record_encoder_modules: Vec<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 512 * BYTES_PER_MIB,
            chunk_initial_size: BYTES_PER_MIB,
            chunk_expand_ratio: 2.0,
            chunk_retention_size: 4 * BYTES_PER_MIB,
            chunk_retention_time_ms: 1000,
            file_backup_dir: None,
            file_backup_prefix: "tagbuffer".to_string(),
            storage_mode: StorageMode::Heap,
            flush_queue_capacity: 64,
            record_encoder_modules: Vec::new(),
        }
    }
}

impl BufferConfig {
    /// Create a configuration with the documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global memory ceiling.
    pub fn with_max_buffer_size(mut self, bytes: u64) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    /// Set the initial per-tag chunk size.
    pub fn with_chunk_initial_size(mut self, bytes: u64) -> Self {
        self.chunk_initial_size = bytes;
        self
    }

    /// Set the chunk growth factor. Must be `> 1.0`.
    pub fn with_chunk_expand_ratio(mut self, ratio: f64) -> Self {
        self.chunk_expand_ratio = ratio;
        self
    }

    /// Set the size-based seal threshold.
    pub fn with_chunk_retention_size(mut self, bytes: u64) -> Self {
        self.chunk_retention_size = bytes;
        self
    }

    /// Set the age-based seal threshold, in milliseconds.
    pub fn with_chunk_retention_time_ms(mut self, ms: u64) -> Self {
        self.chunk_retention_time_ms = ms;
        self
    }

    /// Enable on-disk persistence at the given directory.
    pub fn with_file_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_backup_dir = Some(dir.into());
        self
    }

    /// Override the backup filename prefix.
    pub fn with_file_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_backup_prefix = prefix.into();
        self
    }

    /// Select the pool's storage mode.
    pub fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    /// Override the primary flush queue's bound.
    pub fn with_flush_queue_capacity(mut self, capacity: usize) -> Self {
        self.flush_queue_capacity = capacity;
        self
    }

    /// Set the opaque encoder-module list forwarded to an external
    /// encoder's construction.
    pub fn with_record_encoder_modules(mut self, modules: Vec<String>) -> Self {
        self.record_encoder_modules = modules;
        self
    }

    /// Validate the configuration, logging a warning for legal-but-wasteful
    /// settings (see `chunk_initial_size > chunk_retention_size` in the
    /// growth policy's edge cases) and rejecting settings that make the
    /// engine unusable.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk_expand_ratio <= 1.0 {
            return Err(crate::error::BufferError::InvalidArgument(format!(
                "chunk_expand_ratio must be > 1.0, got {}",
                self.chunk_expand_ratio
            )));
        }
        if self.chunk_initial_size == 0 {
            return Err(crate::error::BufferError::InvalidArgument(
                "chunk_initial_size must be > 0".to_string(),
            ));
        }
        if self.chunk_initial_size > self.chunk_retention_size {
            tracing::warn!(
                initial = self.chunk_initial_size,
                retention = self.chunk_retention_size,
                "chunk_initial_size exceeds chunk_retention_size; every tag will \
                 allocate more than it can ever retain before sealing"
            );
        }
        Ok(())
    }
}
