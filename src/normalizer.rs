//! Total mapping from stored JSON shapes to [`UserRecord`].
//!
//! Nothing in here fails. Missing, empty or oddly typed fields resolve to a
//! default, one normalization function per [`StoredEntry`] variant.

use serde_json::{Map, Value};

use crate::config::DirectoryConfig;
use crate::directory_model::{is_truthy, StoredEntry, UserRecord};

/// Values substituted for missing `tipo` and `cliente`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub tipo: String,
    pub cliente: String,
}

impl RecordDefaults {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            tipo: config.default_type().to_string(),
            cliente: config.default_client().to_string(),
        }
    }
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self::from_config(&DirectoryConfig::default())
    }
}

pub fn normalize(entries: &[Value], defaults: &RecordDefaults) -> Vec<UserRecord> {
    entries.iter().map(|entry| normalize_entry(entry, defaults)).collect()
}

pub fn normalize_entry(entry: &Value, defaults: &RecordDefaults) -> UserRecord {
    match StoredEntry::classify(entry) {
        StoredEntry::Legacy(map) => from_legacy(map, defaults),
        StoredEntry::Current(map) => normalize_current(map, defaults),
        StoredEntry::Opaque => normalize_current(&Map::new(), defaults),
    }
}

/// True when any entry still has the pre-directory shape.
pub fn has_legacy_entries(entries: &[Value]) -> bool {
    entries.iter().any(|entry| StoredEntry::classify(entry).is_legacy())
}

fn from_legacy(map: &Map<String, Value>, defaults: &RecordDefaults) -> UserRecord {
    UserRecord {
        tipo: defaults.tipo.clone(),
        cliente: defaults.cliente.clone(),
        usuario: text(map.get("name")).unwrap_or_default(),
        telefono: text(map.get("phone")).unwrap_or_default(),
        departamento: text(map.get("departamento")).unwrap_or_default(),
        tipo_usuario: None,
    }
}

/// Current-shape normalization, also used for resolver payloads, which never
/// carry the legacy fields.
pub fn normalize_current(map: &Map<String, Value>, defaults: &RecordDefaults) -> UserRecord {
    UserRecord {
        tipo: text(map.get("tipo")).unwrap_or_else(|| defaults.tipo.clone()),
        cliente: text(map.get("cliente")).unwrap_or_else(|| defaults.cliente.clone()),
        usuario: text(map.get("usuario")).unwrap_or_default(),
        telefono: text(map.get("telefono")).unwrap_or_default(),
        departamento: text(map.get("departamento")).unwrap_or_default(),
        tipo_usuario: text(map.get("tipoUsuario")),
    }
}

/// Renders a truthy field as text. Strings pass through, other scalars use
/// their JSON rendering (`123` becomes `"123"`).
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    match value? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
