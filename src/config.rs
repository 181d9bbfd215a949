//! Runtime configuration for the directory.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration with the stock client and type lists.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// Upper bound, in serialized bytes, for a single chunk.
pub const DEFAULT_CHUNK_LIMIT: usize = 200_000;

/// LMDB map size used when none is configured.
pub const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub chunk_limit: usize,
    /// Known clients. The first one is the default for records without a client.
    pub clients: Vec<String>,
    /// Allowed record types. The first one is the default type.
    pub types: Vec<String>,
    pub map_size: usize,
    pub fields: FieldConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            clients: vec![
                "Dirección General de Rentas".to_string(),
                "Municipalidad de Salta".to_string(),
                "Municipios del Interior".to_string(),
                "Gob Tech".to_string(),
            ],
            types: vec!["Nota".to_string(), "Requerimiento".to_string()],
            map_size: DEFAULT_MAP_SIZE,
            fields: FieldConfig::default(),
        }
    }
}

impl DirectoryConfig {
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn default_type(&self) -> &str {
        self.types.first().map(String::as_str).unwrap_or_default()
    }

    pub fn default_client(&self) -> &str {
        self.clients.first().map(String::as_str).unwrap_or_default()
    }
}

/// Jira field identifiers used by the field helper and the webtrigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub client_field_name: String,
    pub client_field_id: String,
    pub resolved_by_field_name: String,
    pub resolved_by_field_id: String,
    pub phone_target_field_id: String,
    pub department_target_field_id: String,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            client_field_name: "Cliente".to_string(),
            client_field_id: "customfield_10121".to_string(),
            resolved_by_field_name: "Resuelto Por".to_string(),
            resolved_by_field_id: "customfield_10128".to_string(),
            phone_target_field_id: "customfield_11380".to_string(),
            department_target_field_id: "customfield_11378".to_string(),
        }
    }
}
