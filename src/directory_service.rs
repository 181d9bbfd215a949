//! CRUD over the normalized directory.
//!
//! Every mutation reads the full collection, applies the change in memory and
//! writes the full collection back through [`ChunkedStore::write_all`]. There
//! is no locking: concurrent mutations race and the last writer wins.

use std::collections::HashMap;

use log::{debug, info};
use serde_json::Value;

use crate::chunked_store::ChunkedStore;
use crate::config::DirectoryConfig;
use crate::directory_model::{UserKey, UserRecord};
use crate::error::DirectoryError;
use crate::kv_backend::KeyValueBackend;
use crate::normalizer::{self, RecordDefaults};

pub struct DirectoryService<B> {
    store: ChunkedStore<B>,
    defaults: RecordDefaults,
}

impl<B: KeyValueBackend> DirectoryService<B> {
    pub fn new(backend: B, config: &DirectoryConfig) -> Self {
        Self {
            store: ChunkedStore::with_chunk_limit(backend, config.chunk_limit),
            defaults: RecordDefaults::from_config(config),
        }
    }

    pub fn store(&self) -> &ChunkedStore<B> {
        &self.store
    }

    pub fn defaults(&self) -> &RecordDefaults {
        &self.defaults
    }

    /// Normalized collection. Legacy-shaped entries found in storage are
    /// written back in normalized form before returning.
    pub fn list(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let raw = self.store.read_all()?;
        let records = normalizer::normalize(&raw, &self.defaults);

        if normalizer::has_legacy_entries(&raw) {
            info!("Persisting {} normalized records over legacy shapes", records.len());
            self.store.write_all(&records)?;
        }

        Ok(records)
    }

    /// Normalized collection without any write-through. A legacy blob is
    /// read in place rather than migrated.
    pub fn snapshot(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let raw = self.store.read_all_raw()?;
        Ok(normalizer::normalize(&raw, &self.defaults))
    }

    /// Creates the record, or updates contact fields of the one with the same key.
    pub fn upsert(&self, record: UserRecord) -> Result<(), DirectoryError> {
        let mut records = self.list()?;
        let key = record.key();

        match records.iter_mut().find(|existing| existing.matches(&key)) {
            Some(existing) => {
                existing.telefono = record.telefono;
                existing.departamento = record.departamento;
                if record.tipo_usuario.is_some() {
                    existing.tipo_usuario = record.tipo_usuario;
                }
                debug!("Updated {key:?} in place");
            }
            None => {
                debug!("Appending {key:?}");
                records.push(record);
            }
        }

        self.store.write_all(&records)?;
        Ok(())
    }

    /// Replaces the record stored under `original`, key fields included.
    ///
    /// Returns `Ok(None)` without touching storage when nothing matches. If the
    /// new key belongs to another record, that record is dropped so keys stay
    /// unique.
    pub fn update_by_original_key(
        &self,
        original: &UserKey,
        record: UserRecord,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let mut records = self.list()?;

        let Some(position) = records.iter().position(|existing| existing.matches(original)) else {
            debug!("No record for {original:?}; nothing updated");
            return Ok(None);
        };

        let new_key = record.key();
        records[position] = record.clone();

        let mut index = 0;
        records.retain(|existing| {
            let keep = index == position || !existing.matches(&new_key);
            index += 1;
            keep
        });

        self.store.write_all(&records)?;
        Ok(Some(record))
    }

    /// Removes the record with `key`. Returns whether one was removed.
    pub fn delete(&self, key: &UserKey) -> Result<bool, DirectoryError> {
        let mut records = self.list()?;
        let before = records.len();
        records.retain(|existing| !existing.matches(key));
        let removed = records.len() != before;

        self.store.write_all(&records)?;
        Ok(removed)
    }

    /// Merges `incoming` into the collection and returns the resulting size.
    ///
    /// Incoming entries are normalized first. On a key collision the entry
    /// keeps the position of its first occurrence and takes the values of the
    /// last one, so incoming data overrides what was stored.
    pub fn bulk_merge(&self, incoming: &[Value]) -> Result<usize, DirectoryError> {
        let current = self.list()?;
        let incoming = normalizer::normalize(incoming, &self.defaults);

        let mut merged: Vec<UserRecord> = Vec::with_capacity(current.len() + incoming.len());
        let mut positions: HashMap<UserKey, usize> = HashMap::new();

        for record in current.into_iter().chain(incoming) {
            match positions.get(&record.key()) {
                Some(&position) => merged[position] = record,
                None => {
                    positions.insert(record.key(), merged.len());
                    merged.push(record);
                }
            }
        }

        self.store.write_all(&merged)?;
        info!("Bulk merge stored {} records", merged.len());
        Ok(merged.len())
    }

    /// Case-insensitive search over usuario, cliente and tipoUsuario, plus a
    /// plain substring match on telefono. An empty term matches everything.
    pub fn search(&self, term: &str) -> Result<Vec<UserRecord>, DirectoryError> {
        let needle = term.to_lowercase();
        let records = self.snapshot()?;

        Ok(records
            .into_iter()
            .filter(|r| {
                r.usuario.to_lowercase().contains(&needle)
                    || r.telefono.contains(term)
                    || r.cliente.to_lowercase().contains(&needle)
                    || r.tipo_usuario
                        .as_deref()
                        .unwrap_or_default()
                        .to_lowercase()
                        .contains(&needle)
            })
            .collect())
    }

    /// Entries offered for a client in the resolved-by dropdown.
    pub fn options_for(&self, cliente: &str, tipo: &str) -> Result<Vec<UserRecord>, DirectoryError> {
        let wanted = cliente.trim().to_lowercase();
        let records = self.snapshot()?;

        Ok(records
            .into_iter()
            .filter(|r| r.tipo == tipo && r.cliente.trim().to_lowercase() == wanted)
            .collect())
    }

    /// First entry whose usuario equals `usuario`, ignoring case and
    /// surrounding whitespace.
    pub fn find_by_usuario(&self, usuario: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let wanted = usuario.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }

        let records = self.snapshot()?;
        Ok(records
            .into_iter()
            .find(|r| r.usuario.trim().to_lowercase() == wanted))
    }

    /// Department of the first entry for `usuario` under `cliente`, or empty.
    pub fn department_for(&self, usuario: &str, cliente: &str) -> Result<String, DirectoryError> {
        let records = self.snapshot()?;
        Ok(records
            .into_iter()
            .find(|r| r.usuario == usuario && r.cliente == cliente)
            .map(|r| r.departamento)
            .unwrap_or_default())
    }
}
