//! A tag-partitioned, chunked event buffer.
//!
//! Producers [`BufferEngine::append`] tagged records; the engine
//! accumulates them into per-tag byte chunks, rotates chunks onto a flush
//! queue by size or age, and hands them to a [`Transporter`] for delivery.
//! On [`BufferEngine::close`] any unflushed chunks are persisted to disk;
//! [`BufferEngine::init`] reloads them on the next startup.
//!
//! ```no_run
//! use tagbuffer::{BufferConfig, BufferEngine, Timestamp, Transporter};
//! use serde_json::json;
//!
//! struct Stdout;
//! impl Transporter for Stdout {
//!     fn transport(&self, tag: &str, bytes: &[u8]) -> tagbuffer::Result<()> {
//!         println!("{tag}: {} bytes", bytes.len());
//!         Ok(())
//!     }
//! }
//!
//! let engine = BufferEngine::new(BufferConfig::new())?;
//! engine.append("web.access", Timestamp::from_seconds(1_700_000_000), &json!({"k": "v"}))?;
//! engine.flush(&Stdout, true)?;
//! engine.close()?;
//! # Ok::<(), tagbuffer::BufferError>(())
//! ```

mod backup;
mod chunk;
mod config;
mod engine;
mod error;
mod pool;
mod queue;
mod record;
mod retention;
mod transporter;

pub use backup::{FileBackupStore, SavedBuffer};
pub use chunk::{Chunk, Region, TaggedChunk};
pub use config::{BufferConfig, StorageMode};
pub use engine::BufferEngine;
pub use error::{BufferError, Result};
pub use pool::BufferPool;
pub use queue::{BackupQueue, CancellationToken, FlushQueue};
pub use record::{DefaultRecordEncoder, RecordEncoder, Timestamp};
pub use transporter::Transporter;
