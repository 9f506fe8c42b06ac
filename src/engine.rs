//! The buffer facade: composes the pool, retention map, flush/backup
//! queues, and optional file-backed persistence into the public append,
//! flush, and close API.

use crate::backup::FileBackupStore;
use crate::chunk::TaggedChunk;
use crate::config::BufferConfig;
use crate::error::{BufferError, Result};
use crate::pool::BufferPool;
use crate::queue::{BackupQueue, CancellationToken, FlushQueue};
use crate::record::{DefaultRecordEncoder, RecordEncoder, Timestamp};
use crate::retention::RetentionMap;
use crate::transporter::Transporter;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The tag-partitioned chunked event buffer.
///
/// Cheaply cloneable: internally `Arc`-backed state is shared, so a
/// producer thread and a flusher thread can each hold their own handle.
pub struct BufferEngine {
    pool: Arc<BufferPool>,
    retention: RetentionMap,
    flush_queue: FlushQueue,
    backup_queue: BackupQueue,
    backup_store: Option<FileBackupStore>,
    encoder: Box<dyn RecordEncoder>,
    cancel: CancellationToken,
    max_buffer_size: u64,
}

impl BufferEngine {
    /// Build an engine from `config`, using the [`DefaultRecordEncoder`].
    pub fn new(config: BufferConfig) -> Result<Self> {
        Self::with_encoder(config, Box::new(DefaultRecordEncoder))
    }

    /// Build an engine from `config` with a caller-supplied encoder.
    pub fn with_encoder(config: BufferConfig, encoder: Box<dyn RecordEncoder>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(BufferPool::new(config.max_buffer_size, config.storage_mode));
        let retention = RetentionMap::new(
            Arc::clone(&pool),
            config.chunk_initial_size,
            config.chunk_expand_ratio,
            config.chunk_retention_size,
            config.chunk_retention_time_ms,
        );
        let flush_queue = FlushQueue::new(config.flush_queue_capacity);
        let backup_queue = BackupQueue::new();
        let backup_store = match &config.file_backup_dir {
            Some(dir) => Some(FileBackupStore::new(dir.clone(), config.file_backup_prefix.clone())?),
            None => None,
        };

        Ok(Self {
            pool,
            retention,
            flush_queue,
            backup_queue,
            backup_store,
            encoder,
            cancel: CancellationToken::new(),
            max_buffer_size: config.max_buffer_size,
        })
    }

    /// The cancellation token shared by blocking operations on this
    /// engine. Clone it out to cancel a producer or flusher parked on a
    /// full queue from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reload any backup files left by a prior shutdown into the
    /// retention map, where they will be re-sealed and re-queued for
    /// ordinary flushing. A single unreadable or unparseable file is
    /// logged and skipped; it does not block the rest of startup.
    pub fn init(&self) -> Result<()> {
        let Some(store) = &self.backup_store else {
            return Ok(());
        };

        for saved in store.saved_files()? {
            let tag = saved.tag().to_string();
            let path = saved.path().to_path_buf();
            match saved.open() {
                Ok(mmap) => {
                    if let Err(e) = self.append_raw(&tag, &mmap) {
                        tracing::warn!(tag = %tag, path = %path.display(), error = %e, "replay append failed, skipping file");
                        continue;
                    }
                    if let Err(e) = std::fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove replayed backup file");
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to open backup file, skipping");
                }
            }
        }
        Ok(())
    }

    /// Encode `record` and append it to `tag`'s chunk.
    pub fn append(&self, tag: &str, timestamp: Timestamp, record: &Value) -> Result<()> {
        let bytes = self.encoder.encode(tag, timestamp, record);
        self.append_raw(tag, &bytes)
    }

    /// Append an already map-encoded record to `tag`'s chunk, bypassing
    /// only the record-map encoder. The engine still prepends the
    /// timestamp header itself, so the payload on the wire is the same
    /// `[timestamp, record]` shape `append` produces.
    pub fn append_encoded(&self, tag: &str, timestamp: Timestamp, encoded_record: &[u8]) -> Result<()> {
        let mut bytes = self.encoder.encode_timestamp(timestamp);
        bytes.extend_from_slice(encoded_record);
        self.append_raw(tag, &bytes)
    }

    /// Append bytes verbatim to `tag`'s chunk, bypassing all encoding.
    /// Used internally by `append`/`append_encoded` after they've built
    /// the full `[timestamp, record]` payload, and by backup-file replay,
    /// whose saved bytes are already a complete previously-encoded chunk.
    fn append_raw(&self, tag: &str, bytes: &[u8]) -> Result<()> {
        if let Some(sealed) = self.retention.append(tag, bytes)? {
            self.enqueue_sealed(sealed)?;
        }
        Ok(())
    }

    fn enqueue_sealed(&self, sealed: TaggedChunk) -> Result<()> {
        self.flush_queue
            .push_blocking(sealed, &self.cancel)
            .map_err(|(err, chunk)| {
                self.backup_queue.push(chunk);
                err
            })
    }

    /// Sweep the retention map (sealing age-expired, or with `force`,
    /// every non-empty chunk) and drain the flush queue through
    /// `transporter`.
    pub fn flush(&self, transporter: &dyn Transporter, force: bool) -> Result<()> {
        for sealed in self.retention.sweep(now_millis(), force) {
            self.enqueue_sealed(sealed)?;
        }

        while !self.cancel.is_cancelled() {
            let Some(chunk) = self.flush_queue.try_pop() else {
                break;
            };

            match transporter.transport(chunk.tag(), chunk.bytes()) {
                Ok(()) => {
                    let (_tag, region, _limit) = chunk.into_parts();
                    self.pool.release(region);
                }
                Err(err) => {
                    tracing::warn!(tag = chunk.tag(), error = %err, "transport failed, re-enqueuing chunk");
                    if let Err((_cancelled, chunk)) = self.flush_queue.push_blocking(chunk, &self.cancel) {
                        self.backup_queue.push(chunk);
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Persist all unflushed state to disk and release pooled memory.
    /// `close` is not cancellable and always runs every shutdown step to
    /// completion: a chunk that fails to save is logged at `warn` and
    /// skipped, never aborting the sweep of the remaining chunks or the
    /// final pool release. This method therefore always returns `Ok(())`;
    /// check logs, not the return value, for individual save failures.
    pub fn close(&self) -> Result<()> {
        for sealed in self.retention.sweep(now_millis(), true) {
            self.save_or_log(sealed);
        }

        while let Some(chunk) = self.flush_queue.try_pop() {
            self.save_or_log(chunk);
        }
        while let Some(chunk) = self.backup_queue.try_pop() {
            self.save_or_log(chunk);
        }

        self.retention.clear();
        self.pool.release_all();
        tracing::info!("engine closed");
        Ok(())
    }

    fn save_or_log(&self, chunk: TaggedChunk) {
        let Some(store) = &self.backup_store else {
            return;
        };
        if let Err(e) = store.save(&chunk) {
            tracing::warn!(tag = chunk.tag(), error = %e, "failed to persist chunk on close");
        }
    }

    /// Remove every on-disk backup file unconditionally.
    pub fn clear_backup_files(&self) -> Result<()> {
        match &self.backup_store {
            Some(store) => store.clear(),
            None => Ok(()),
        }
    }

    /// Fraction of the memory ceiling currently in use, in `[0, 1]`.
    pub fn buffer_usage(&self) -> f64 {
        if self.max_buffer_size == 0 {
            return 0.0;
        }
        self.pool.allocated_size() as f64 / self.max_buffer_size as f64
    }

    /// Outstanding-plus-cached pool capacity, in bytes.
    pub fn allocated_size(&self) -> u64 {
        self.pool.allocated_size()
    }

    /// Sum of bytes buffered in retention chunks plus bytes queued for
    /// flush but not yet transported.
    pub fn buffered_data_size(&self) -> u64 {
        self.retention.buffered_bytes() + self.flush_queue.queued_bytes()
    }

    /// The configured memory ceiling.
    pub fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }
}
