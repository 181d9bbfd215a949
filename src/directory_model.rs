//! Data model definitions for the resolved-by directory.
//!
//! The canonical entry is [`UserRecord`]. Its identity is the
//! `(tipo, cliente, usuario)` triple, captured by [`UserKey`]. What is found in
//! storage is not always canonical: older revisions of the application wrote a
//! `{name, phone}` shape, so raw stored values are classified into a
//! [`StoredEntry`] before normalization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One entry of the directory.
///
/// Serialized with camelCase keys, which is also the persisted wire format:
///
/// ```rust
/// use resolved_by_directory::directory_model::UserRecord;
///
/// let record = UserRecord {
///     tipo: "Nota".to_string(),
///     cliente: "Gob Tech".to_string(),
///     usuario: "ana".to_string(),
///     telefono: "1".to_string(),
///     departamento: "Soporte".to_string(),
///     tipo_usuario: Some("Interno".to_string()),
/// };
///
/// let json = serde_json::to_value(&record)?;
/// assert_eq!(json["tipoUsuario"], "Interno");
/// # Ok::<(), serde_json::Error>(())
/// ```
///
/// `tipoUsuario` only appeared in later revisions of the schema, so it is
/// optional and omitted from the serialized form when absent.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub tipo: String,
    pub cliente: String,
    pub usuario: String,
    pub telefono: String,
    pub departamento: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_usuario: Option<String>,
}

impl UserRecord {
    pub fn key(&self) -> UserKey {
        UserKey {
            tipo: self.tipo.clone(),
            cliente: self.cliente.clone(),
            usuario: self.usuario.clone(),
        }
    }

    pub fn matches(&self, key: &UserKey) -> bool {
        self.tipo == key.tipo && self.cliente == key.cliente && self.usuario == key.usuario
    }
}

/// Natural key of a [`UserRecord`].
///
/// A structured tuple rather than a delimiter-joined string, so field values
/// containing any separator can never collide.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash, Default)]
pub struct UserKey {
    pub tipo: String,
    pub cliente: String,
    pub usuario: String,
}

impl UserKey {
    pub fn new(tipo: impl Into<String>, cliente: impl Into<String>, usuario: impl Into<String>) -> Self {
        Self {
            tipo: tipo.into(),
            cliente: cliente.into(),
            usuario: usuario.into(),
        }
    }
}

/// A raw stored value, classified by schema revision.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEntry<'a> {
    /// Pre-directory `{name, phone}` entries.
    Legacy(&'a Map<String, JsonValue>),
    /// Current `{tipo, cliente, usuario, ...}` entries, possibly with holes.
    Current(&'a Map<String, JsonValue>),
    /// Anything that is not a JSON object.
    Opaque,
}

impl<'a> StoredEntry<'a> {
    pub fn classify(value: &'a JsonValue) -> Self {
        match value.as_object() {
            Some(map) if is_truthy(map.get("name")) || is_truthy(map.get("phone")) => {
                StoredEntry::Legacy(map)
            }
            Some(map) => StoredEntry::Current(map),
            None => StoredEntry::Opaque,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredEntry::Legacy(_))
    }
}

/// JavaScript-style truthiness, which is what the stored data was written under.
pub(crate) fn is_truthy(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(_)) | Some(JsonValue::Object(_)) => true,
    }
}
