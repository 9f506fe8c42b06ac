//! On-disk persistence of sealed chunks, keyed by tag, for crash/shutdown
//! recovery.
//!
//! Each saved chunk is a single file named
//! `<prefix>_<encoded-params>_<generation>.buf`, where `<encoded-params>`
//! is the tag, percent-encoded against a reserved separator so a tag
//! containing `_`, `.`, or a path separator still round-trips.

use crate::chunk::TaggedChunk;
use crate::error::{BufferError, Result};
use memmap2::Mmap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const EXTENSION: &str = "buf";
const SEPARATOR: char = '_';

/// Characters percent-encoded within an encoded param segment: the
/// separator itself, the path separator, and anything `CONTROLS` already
/// covers, so an encoded segment can never introduce a stray `_` or `/`.
const PARAM_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'_').add(b'/').add(b'.');

fn encode_param(raw: &str) -> String {
    utf8_percent_encode(raw, PARAM_ENCODE_SET).to_string()
}

fn decode_param(encoded: &str) -> Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .map_err(|e| BufferError::InvalidArgument(format!("invalid percent-encoding: {e}")))
}

/// A sealed chunk persisted to disk, not yet reloaded.
pub struct SavedBuffer {
    path: PathBuf,
    tag: String,
}

impl SavedBuffer {
    /// The recovered tag this file belongs to.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Memory-map the file (private, read-only copy-on-write) and return
    /// its bytes. The mapping is dropped when the returned `Mmap` is.
    pub fn open(&self) -> Result<Mmap> {
        let file = File::open(&self.path)?;
        // SAFETY: the file is not concurrently truncated by this process;
        // backup files are write-once (created via `save`, removed via
        // `remove`) and never mutated in place.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap)
    }

    /// Delete the backing file.
    pub fn remove(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// File-backed persistence for sealed chunks, rooted at a configured
/// directory and filename prefix.
pub struct FileBackupStore {
    dir: PathBuf,
    prefix: String,
    generation: AtomicU64,
}

impl FileBackupStore {
    /// Open (creating if absent) a backup store rooted at `dir`.
    ///
    /// The generation counter starts from a random seed rather than zero so
    /// restarting a process into the same directory cannot collide with
    /// filenames a prior run already created.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut seed_bytes = [0u8; 8];
        getrandom::getrandom(&mut seed_bytes)
            .map_err(|e| BufferError::InvalidArgument(format!("getrandom failed: {e}")))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            generation: AtomicU64::new(u64::from_le_bytes(seed_bytes)),
        })
    }

    /// Persist a sealed chunk's readable bytes under its tag.
    pub fn save(&self, chunk: &TaggedChunk) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let filename = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{generation}.{EXTENSION}",
            self.prefix,
            encode_param(chunk.tag()),
        );
        let path = self.dir.join(filename);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(chunk.bytes())?;
        file.sync_all()?;
        tracing::info!(tag = chunk.tag(), bytes = chunk.len(), path = %path.display(), "chunk saved to backup store");
        Ok(())
    }

    /// Enumerate saved files in this store matching the configured prefix.
    /// Files with a malformed name (wrong arity, bad percent-encoding, or a
    /// foreign prefix) are skipped and logged, not returned as errors.
    pub fn saved_files(&self) -> Result<Vec<SavedBuffer>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match self.parse_filename(&path) {
                Ok(tag) => found.push(SavedBuffer { path, tag }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparseable backup file");
                }
            }
        }
        Ok(found)
    }

    fn parse_filename(&self, path: &Path) -> Result<String> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BufferError::InvalidArgument("non-UTF8 backup filename".into()))?;

        let rest = stem.strip_prefix(&self.prefix).and_then(|s| s.strip_prefix(SEPARATOR)).ok_or_else(|| {
            BufferError::InvalidArgument(format!("backup filename missing prefix {:?}", self.prefix))
        })?;

        let (encoded_tag, _generation) = rest.rsplit_once(SEPARATOR).ok_or_else(|| {
            BufferError::InvalidArgument("backup filename missing generation segment".into())
        })?;

        decode_param(encoded_tag)
    }

    /// Remove every file in the store unconditionally, regardless of
    /// whether it has been replayed.
    pub fn clear(&self) -> Result<()> {
        for saved in self.saved_files()? {
            if let Err(e) = saved.remove() {
                tracing::warn!(error = %e, "failed to remove backup file during clear");
            }
        }
        Ok(())
    }
}
