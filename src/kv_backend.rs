//! Raw key-value backends the chunked store persists through.
//!
//! The contract is deliberately small: per-key `get`, `set` and `delete` of
//! JSON documents. There is no listing primitive and no cross-key
//! transaction, so callers track their own keys.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info};
use serde_json::Value;

use crate::error::DirectoryError;

pub trait KeyValueBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, DirectoryError>;

    fn set(&self, key: &str, value: &Value) -> Result<(), DirectoryError>;

    /// Removing a key that does not exist is not an error.
    fn delete(&self, key: &str) -> Result<(), DirectoryError>;
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for &B {
    fn get(&self, key: &str) -> Result<Option<Value>, DirectoryError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), DirectoryError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), DirectoryError> {
        (**self).delete(key)
    }
}

/// In-process backend, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Keys currently holding a value, in lexical order.
    pub fn keys(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Value>>, DirectoryError> {
        self.entries
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("memory backend poisoned: {e}")))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, DirectoryError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), DirectoryError> {
        self.lock()?.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), DirectoryError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Persistent backend on an LMDB environment.
///
/// Values are stored as compact JSON bytes in the unnamed database. Each call
/// runs in its own transaction, which gives per-key atomicity and nothing more.
pub struct LmdbBackend {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl LmdbBackend {
    /// Opens (or creates) the environment directory `<name>.lmdb`.
    pub fn open(name: &str, map_size: usize) -> Result<Self, DirectoryError> {
        let path = PathBuf::from(format!("{name}.lmdb"));
        Self::open_at(&path, map_size)
    }

    pub fn open_at(path: &Path, map_size: usize) -> Result<Self, DirectoryError> {
        std::fs::create_dir_all(path)?;

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(map_size)
            .open(path)?;
        let db = env.create_db(None, DatabaseFlags::empty())?;

        info!("LMDB environment opened at {}", path.display());
        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffers to disk.
    pub fn sync(&self) -> Result<(), DirectoryError> {
        self.env.sync(true)?;
        Ok(())
    }
}

impl KeyValueBackend for LmdbBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, DirectoryError> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key) {
            Ok(bytes) => Some(serde_json::from_slice(bytes)?),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(value)
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), DirectoryError> {
        let bytes = serde_json::to_vec(value)?;
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &bytes, WriteFlags::empty())?;
        txn.commit()?;
        debug!("LMDB set {key} ({} bytes)", bytes.len());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), DirectoryError> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        txn.commit()?;
        Ok(())
    }
}
