//! Stores one logical record collection across several bounded keys.
//!
//! Key layout on the backend:
//!
//! - `users_metadata` holds `{"chunkCount": n}`
//! - `users_chunk_0` .. `users_chunk_{n-1}` each hold a JSON array of records
//! - `users` is the pre-chunking blob, only read when no metadata exists and
//!   removed once migrated
//!
//! Writes are read-modify-write of the whole collection with no version
//! check. Two writers racing on the same collection lose one of the updates;
//! the backend offers no compare-and-swap to close that window.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunk_codec;
use crate::config::DEFAULT_CHUNK_LIMIT;
use crate::error::DirectoryError;
use crate::kv_backend::KeyValueBackend;

pub const METADATA_KEY: &str = "users_metadata";
pub const LEGACY_KEY: &str = "users";
pub const CHUNK_KEY_PREFIX: &str = "users_chunk_";

pub fn chunk_key(index: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{index}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub chunk_count: usize,
}

pub struct ChunkedStore<B> {
    backend: B,
    chunk_limit: usize,
}

impl<B: KeyValueBackend> ChunkedStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_chunk_limit(backend, DEFAULT_CHUNK_LIMIT)
    }

    pub fn with_chunk_limit(backend: B, chunk_limit: usize) -> Self {
        Self {
            backend,
            chunk_limit,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    /// Current metadata, or `None` when absent, malformed or zero.
    pub fn metadata(&self) -> Result<Option<ChunkMetadata>, DirectoryError> {
        let Some(raw) = self.backend.get(METADATA_KEY)? else {
            return Ok(None);
        };
        match raw.get("chunkCount").and_then(Value::as_u64) {
            Some(0) => Ok(None),
            Some(count) => match usize::try_from(count) {
                Ok(chunk_count) => Ok(Some(ChunkMetadata { chunk_count })),
                Err(_) => {
                    warn!("chunkCount {count} does not fit in usize; ignoring metadata");
                    Ok(None)
                }
            },
            None => {
                if !raw.is_null() {
                    warn!("Ignoring malformed {METADATA_KEY}: {raw}");
                }
                Ok(None)
            }
        }
    }

    /// Reads the whole collection as stored, before normalization.
    ///
    /// Without metadata the legacy blob is consulted; a non-empty blob is
    /// rewritten into chunks and deleted before being returned.
    pub fn read_all(&self) -> Result<Vec<Value>, DirectoryError> {
        match self.metadata()? {
            Some(metadata) => self.read_chunks(metadata),
            None => self.migrate_legacy(),
        }
    }

    /// Same as [`read_all`](Self::read_all), except that a legacy blob is
    /// returned as found and left in place. Never writes.
    pub fn read_all_raw(&self) -> Result<Vec<Value>, DirectoryError> {
        match self.metadata()? {
            Some(metadata) => self.read_chunks(metadata),
            None => self.legacy_entries(),
        }
    }

    fn read_chunks(&self, metadata: ChunkMetadata) -> Result<Vec<Value>, DirectoryError> {
        let mut records = Vec::new();
        for index in 0..metadata.chunk_count {
            let key = chunk_key(index);
            match self.backend.get(&key)? {
                Some(Value::Array(chunk)) => records.extend(chunk),
                Some(Value::Null) | None => debug!("Chunk {key} is missing; skipping"),
                Some(other) => warn!("Chunk {key} is not an array ({other}); skipping"),
            }
        }

        debug!(
            "Read {} records from {} chunks",
            records.len(),
            metadata.chunk_count
        );
        Ok(records)
    }

    /// Replaces the whole collection.
    ///
    /// Metadata is written first, then each chunk, then any chunk keys the
    /// previous write used beyond the new count are deleted. A crash in
    /// between leaves trailing chunks that are never read again, since reads
    /// stop at the recorded count.
    pub fn write_all<T: Serialize>(&self, records: &[T]) -> Result<ChunkMetadata, DirectoryError> {
        let chunks = chunk_codec::chunk(records, self.chunk_limit)?;
        let previous = self.metadata()?.map_or(0, |m| m.chunk_count);
        let metadata = ChunkMetadata {
            chunk_count: chunks.len(),
        };

        self.backend
            .set(METADATA_KEY, &serde_json::to_value(metadata)?)?;

        for (index, chunk) in chunks.iter().enumerate() {
            self.backend
                .set(&chunk_key(index), &serde_json::to_value(chunk)?)?;
        }

        if previous > chunks.len() {
            for index in chunks.len()..previous {
                self.backend.delete(&chunk_key(index))?;
            }
            info!(
                "Removed {} stale chunks (was {previous}, now {})",
                previous - chunks.len(),
                chunks.len()
            );
        }

        debug!(
            "Wrote {} records into {} chunks",
            records.len(),
            chunks.len()
        );
        Ok(metadata)
    }

    fn legacy_entries(&self) -> Result<Vec<Value>, DirectoryError> {
        match self.backend.get(LEGACY_KEY)? {
            Some(Value::Array(entries)) => Ok(entries),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => {
                warn!("Legacy key {LEGACY_KEY} is not an array ({other}); ignoring");
                Ok(Vec::new())
            }
        }
    }

    fn migrate_legacy(&self) -> Result<Vec<Value>, DirectoryError> {
        let legacy = self.legacy_entries()?;
        if legacy.is_empty() {
            return Ok(legacy);
        }

        info!(
            "Migrating {} records from legacy key {LEGACY_KEY} into chunks",
            legacy.len()
        );
        self.write_all(&legacy)?;
        self.backend.delete(LEGACY_KEY)?;
        Ok(legacy)
    }
}
