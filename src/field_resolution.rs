//! Issue field lookups for the resolved-by custom fields.
//!
//! Field IDs differ between Jira sites, so they are discovered by display
//! name from the field catalog and memoized in a [`FieldIdCache`] the caller
//! owns. The configured static IDs are the fallback when discovery finds
//! nothing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::FieldConfig;
use crate::directory_service::DirectoryService;
use crate::error::DirectoryError;
use crate::kv_backend::KeyValueBackend;
use crate::normalizer::text;

/// One entry of the issue field catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub name: String,
}

/// The issue tracker, as far as this crate needs it.
pub trait IssueFieldSource {
    fn field_catalog(&self) -> Result<Vec<FieldDescriptor>, DirectoryError>;

    fn issue_fields(&self, issue_key: &str) -> Result<Map<String, Value>, DirectoryError>;

    fn update_issue_fields(
        &self,
        issue_key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), DirectoryError>;
}

/// Field name to field ID memo. Entries never expire; call
/// [`FieldIdCache::clear`] to force rediscovery.
#[derive(Debug, Default)]
pub struct FieldIdCache {
    pub(crate) ids: Mutex<HashMap<String, String>>,
}

impl FieldIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.lock()?.get(name).cloned())
    }

    pub fn insert(&self, name: &str, id: &str) -> Result<(), DirectoryError> {
        self.lock()?.insert(name.to_string(), id.to_string());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), DirectoryError> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize, DirectoryError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DirectoryError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, DirectoryError> {
        self.ids.lock().map_err(|e| {
            warn!("Field id cache poisoned: {e}");
            DirectoryError::Poisoned(format!("field id cache: {e}"))
        })
    }
}

pub struct FieldResolver<'a, S> {
    source: &'a S,
    cache: &'a FieldIdCache,
    fields: &'a FieldConfig,
}

impl<'a, S: IssueFieldSource> FieldResolver<'a, S> {
    pub fn new(source: &'a S, cache: &'a FieldIdCache, fields: &'a FieldConfig) -> Self {
        Self {
            source,
            cache,
            fields,
        }
    }

    /// Field ID for a display name, from the cache or the catalog, falling
    /// back to `fallback` when the catalog has no such field.
    pub fn field_id(&self, name: &str, fallback: &str) -> Result<String, DirectoryError> {
        if let Some(id) = self.cache.get(name)? {
            return Ok(id);
        }

        let wanted = name.trim().to_lowercase();
        let found = self
            .source
            .field_catalog()?
            .into_iter()
            .find(|field| field.name.trim().to_lowercase() == wanted);

        let id = match found {
            Some(field) => {
                debug!("Discovered field {name} as {}", field.id);
                field.id
            }
            None => {
                warn!("Field {name} not in catalog; using {fallback}");
                fallback.to_string()
            }
        };

        self.cache.insert(name, &id)?;
        Ok(id)
    }

    /// Selected client on the issue, if any.
    pub fn cliente_for_issue(&self, issue_key: &str) -> Result<Option<String>, DirectoryError> {
        let id = self.field_id(&self.fields.client_field_name, &self.fields.client_field_id)?;
        let fields = self.source.issue_fields(issue_key)?;
        Ok(fields.get(&id).and_then(option_text))
    }

    /// Raw value of the resolved-by field: the stored directory entry, a
    /// plain user name, or nothing.
    pub fn resolved_by_for_issue(&self, issue_key: &str) -> Result<Option<Value>, DirectoryError> {
        let id = self.field_id(
            &self.fields.resolved_by_field_name,
            &self.fields.resolved_by_field_id,
        )?;
        let mut fields = self.source.issue_fields(issue_key)?;
        Ok(fields.remove(&id).filter(|value| !value.is_null()))
    }

    /// Department of whoever resolved the issue.
    ///
    /// Taken from the stored entry when it carries one; otherwise looked up in
    /// the directory by user name and the issue's client. Empty when unknown.
    pub fn department_for_issue<B: KeyValueBackend>(
        &self,
        issue_key: &str,
        directory: &DirectoryService<B>,
    ) -> Result<String, DirectoryError> {
        let Some(resolved_by) = self.resolved_by_for_issue(issue_key)? else {
            return Ok(String::new());
        };

        if let Some(departamento) = text(resolved_by.get("departamento")) {
            return Ok(departamento);
        }

        let usuario = match &resolved_by {
            Value::Object(map) => text(map.get("usuario")).or_else(|| text(map.get("value"))),
            other => option_text(other),
        };
        let Some(usuario) = usuario else {
            return Ok(String::new());
        };

        let cliente = self.cliente_for_issue(issue_key)?.unwrap_or_default();
        directory.department_for(&usuario, &cliente)
    }
}

/// Select-list values come as `{"value": ...}`; plain text fields as strings.
fn option_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => text(map.get("value")),
        other => text(Some(other)),
    }
}
