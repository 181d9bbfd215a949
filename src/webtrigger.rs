//! Web trigger that copies a user's contact details onto an issue.
//!
//! The request body is `{"issueKey": "...", "fieldValue": "<usuario>"}`. The
//! user is looked up case-insensitively and their telephone and department
//! are written into the configured issue fields.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::FieldConfig;
use crate::directory_service::DirectoryService;
use crate::error::DirectoryError;
use crate::field_resolution::IssueFieldSource;
use crate::kv_backend::KeyValueBackend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebtriggerResponse {
    pub status_code: u16,
    pub body: String,
}

impl WebtriggerResponse {
    fn new(status_code: u16, body: &str) -> Self {
        Self {
            status_code,
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    #[serde(default)]
    issue_key: String,
    #[serde(default)]
    field_value: Option<String>,
}

pub struct WebtriggerHandler<'a, B, S> {
    directory: &'a DirectoryService<B>,
    issues: &'a S,
    fields: &'a FieldConfig,
}

impl<'a, B: KeyValueBackend, S: IssueFieldSource> WebtriggerHandler<'a, B, S> {
    pub fn new(directory: &'a DirectoryService<B>, issues: &'a S, fields: &'a FieldConfig) -> Self {
        Self {
            directory,
            issues,
            fields,
        }
    }

    /// Never fails; every outcome maps to a status code.
    pub fn handle(&self, body: &str) -> WebtriggerResponse {
        match self.sync(body) {
            Ok(response) => response,
            Err(e) => {
                error!("Webtrigger failed: {e}");
                WebtriggerResponse::new(500, "Error procesando el WebTrigger")
            }
        }
    }

    fn sync(&self, body: &str) -> Result<WebtriggerResponse, DirectoryError> {
        let request: SyncRequest = serde_json::from_str(body)?;
        let usuario = request.field_value.as_deref().unwrap_or_default().trim();

        if usuario.is_empty() {
            return Ok(WebtriggerResponse::new(400, "Usuario vacío"));
        }

        let Some(record) = self.directory.find_by_usuario(usuario)? else {
            warn!("Webtrigger user {usuario} not in directory");
            return Ok(WebtriggerResponse::new(404, "Usuario no encontrado"));
        };

        let mut update = Map::new();
        update.insert(
            self.fields.phone_target_field_id.clone(),
            Value::String(record.telefono),
        );
        update.insert(
            self.fields.department_target_field_id.clone(),
            Value::String(record.departamento),
        );
        self.issues.update_issue_fields(&request.issue_key, update)?;

        info!("Synced contact fields of {} from {usuario}", request.issue_key);
        Ok(WebtriggerResponse::new(200, "Campos actualizados correctamente"))
    }
}
