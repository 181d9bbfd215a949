//! Named resolver functions, as invoked by the directory UI.
//!
//! Payloads arrive as loosely shaped JSON objects. Missing fields default the
//! same way stored records do, key fields included, so a payload that saves a
//! record also addresses it for update and delete. Only a payload that is not
//! an object at all is rejected.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::directory_model::{UserKey, UserRecord};
use crate::directory_service::DirectoryService;
use crate::error::DirectoryError;
use crate::kv_backend::KeyValueBackend;
use crate::normalizer::{normalize_current, text};

pub const GET_USERS: &str = "getUsers";
pub const SAVE_USER: &str = "saveUser";
pub const UPDATE_USER: &str = "updateUser";
pub const DELETE_USER: &str = "deleteUser";
pub const BULK_SAVE_USERS: &str = "bulkSaveUsers";

pub const USER_NOT_FOUND: &str = "Usuario no encontrado";

/// Result of a mutating resolver call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl MutationResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            count: None,
        }
    }

    pub fn counted(count: usize) -> Self {
        Self {
            count: Some(count),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            count: None,
        }
    }
}

pub struct Resolver<B> {
    service: DirectoryService<B>,
}

impl<B: KeyValueBackend> Resolver<B> {
    pub fn new(service: DirectoryService<B>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &DirectoryService<B> {
        &self.service
    }

    /// Dispatches by function key and returns the JSON response body.
    pub fn invoke(&self, function: &str, payload: &Value) -> Result<Value, DirectoryError> {
        debug!("Resolver call {function}");
        let response = match function {
            GET_USERS => serde_json::to_value(self.get_users()?)?,
            SAVE_USER => serde_json::to_value(self.save_user(payload)?)?,
            UPDATE_USER => serde_json::to_value(self.update_user(payload)?)?,
            DELETE_USER => serde_json::to_value(self.delete_user(payload)?)?,
            BULK_SAVE_USERS => serde_json::to_value(self.bulk_save_users(payload)?)?,
            other => {
                warn!("Unknown resolver function {other}");
                return Err(DirectoryError::UnknownFunction(other.to_string()));
            }
        };
        Ok(response)
    }

    pub fn get_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        self.service.list()
    }

    /// `{tipo, cliente, usuario, telefono, departamento[, tipoUsuario]}`
    pub fn save_user(&self, payload: &Value) -> Result<MutationResponse, DirectoryError> {
        let record = normalize_current(fields(SAVE_USER, payload)?, self.service.defaults());
        self.service.upsert(record)?;
        Ok(MutationResponse::ok())
    }

    /// `{originalTipo, originalCliente, originalUsuario, ...new fields}`
    pub fn update_user(&self, payload: &Value) -> Result<MutationResponse, DirectoryError> {
        let map = fields(UPDATE_USER, payload)?;
        let original = self.key_from(map, "originalTipo", "originalCliente", "originalUsuario");
        let record = normalize_current(map, self.service.defaults());

        match self.service.update_by_original_key(&original, record)? {
            Some(_) => Ok(MutationResponse::ok()),
            None => Ok(MutationResponse::failed(USER_NOT_FOUND)),
        }
    }

    /// `{tipo, cliente, usuario}`; succeeds whether or not anything matched.
    pub fn delete_user(&self, payload: &Value) -> Result<MutationResponse, DirectoryError> {
        let key = self.key_from(fields(DELETE_USER, payload)?, "tipo", "cliente", "usuario");
        self.service.delete(&key)?;
        Ok(MutationResponse::ok())
    }

    /// `{newUsers: [...]}`
    pub fn bulk_save_users(&self, payload: &Value) -> Result<MutationResponse, DirectoryError> {
        let incoming = fields(BULK_SAVE_USERS, payload)?
            .get("newUsers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let count = self.service.bulk_merge(incoming)?;
        Ok(MutationResponse::counted(count))
    }

    /// Key named by the given payload fields, with `tipo` and `cliente`
    /// defaulted as in [`normalize_current`].
    fn key_from(&self, map: &Map<String, Value>, tipo: &str, cliente: &str, usuario: &str) -> UserKey {
        let defaults = self.service.defaults();
        UserKey::new(
            text(map.get(tipo)).unwrap_or_else(|| defaults.tipo.clone()),
            text(map.get(cliente)).unwrap_or_else(|| defaults.cliente.clone()),
            text(map.get(usuario)).unwrap_or_default(),
        )
    }
}

fn fields<'p>(function: &str, payload: &'p Value) -> Result<&'p Map<String, Value>, DirectoryError> {
    payload.as_object().ok_or_else(|| {
        DirectoryError::InvalidPayload(format!("{function} expects a JSON object, got {payload}"))
    })
}
