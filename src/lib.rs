//! # Resolved-By Directory
//!
//! Storage and resolver core for a small directory of "resolved by" users
//! (client contacts and internal staff) kept in a key-value store whose
//! entries have a hard size ceiling.
//!
//! ## Features
//!
//! - **Chunked persistence**: the collection is split across `users_chunk_{i}`
//!   keys below a per-key byte limit and reassembled on read
//! - **Transparent migration**: the old single-key blob and the old
//!   `{name, phone}` record shape are upgraded on first read
//! - **Stale chunk cleanup**: shrinking the collection deletes trailing chunks
//! - **Total normalization**: malformed records degrade to defaults, never errors
//! - **LMDB backend** plus an in-memory backend for tests and embedding
//! - **FFI surface** mirroring the UI resolver functions
//!
//! ## Quick Start
//!
//! ```rust
//! use resolved_by_directory::config::DirectoryConfig;
//! use resolved_by_directory::directory_service::DirectoryService;
//! use resolved_by_directory::kv_backend::MemoryBackend;
//! use serde_json::json;
//!
//! let directory = DirectoryService::new(MemoryBackend::new(), &DirectoryConfig::default());
//! let count = directory.bulk_merge(&[json!({
//!     "tipo": "Nota", "cliente": "Gob Tech", "usuario": "ana",
//!     "telefono": "1", "departamento": "Soporte"
//! })])?;
//! assert_eq!(count, 1);
//! assert_eq!(directory.list()?[0].usuario, "ana");
//! # Ok::<(), resolved_by_directory::error::DirectoryError>(())
//! ```
//!
//! ## FFI Functions
//!
//! - [`create_directory`] / [`create_directory_with_config`] - Open an LMDB-backed directory
//! - [`get_users`] - Normalized entries
//! - [`save_user`] - Create or update by `(tipo, cliente, usuario)`
//! - [`update_user`] - Replace the entry found under the original key
//! - [`delete_user`] - Remove by key
//! - [`bulk_save_users`] - Merge a batch, incoming entries win
//! - [`invoke_resolver`] - Any of the above by function name
//! - [`close_directory`] - Flush and release the handle
//! - [`free_response`] - Release a string returned by this library

pub mod app_response;
pub mod chunk_codec;
pub mod chunked_store;
pub mod config;
pub mod directory_model;
pub mod directory_service;
pub mod directory_state;
pub mod error;
pub mod field_resolution;
pub mod kv_backend;
pub mod normalizer;
pub mod resolver;
pub mod webtrigger;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde_json::Value;

use crate::app_response::AppResponse;
use crate::config::DirectoryConfig;
use crate::directory_state::DirectoryState;
use crate::resolver::{BULK_SAVE_USERS, DELETE_USER, GET_USERS, SAVE_USER, UPDATE_USER};

/// Opens (or creates) the directory stored in `<name>.lmdb` with the default
/// configuration.
///
/// # Parameters
///
/// * `name` - Null-terminated C string with the database path, without the
///   `.lmdb` suffix
///
/// # Returns
///
/// A pointer to a heap-allocated [`DirectoryState`], or null if `name` is null
/// or not UTF-8, or if the environment cannot be opened.
///
/// # Safety
///
/// `name` must be null or point to a valid null-terminated string. The
/// returned handle is owned by the caller and must be released exactly once
/// with [`close_directory`]; it must not be freed any other way.
///
/// ```no_run
/// use std::ffi::CString;
/// use resolved_by_directory::create_directory;
///
/// let name = CString::new("resolved_by").unwrap();
/// let state = create_directory(name.as_ptr());
/// assert!(!state.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_directory(name: *const c_char) -> *mut DirectoryState {
    open_directory(name, DirectoryConfig::default())
}

/// Like [`create_directory`], with a JSON [`DirectoryConfig`].
///
/// # Parameters
///
/// * `name` - Null-terminated C string with the database path
/// * `config_json` - Null-terminated JSON object; missing fields take their
///   defaults
///
/// # Returns
///
/// A directory handle, or null if either string is null or not UTF-8, the
/// config is not valid JSON for [`DirectoryConfig`], or LMDB fails to open.
///
/// # Safety
///
/// Both pointers must be null or valid null-terminated strings. Ownership of
/// the returned handle is the same as for [`create_directory`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_directory_with_config(
    name: *const c_char,
    config_json: *const c_char,
) -> *mut DirectoryState {
    let Some(raw) = c_str_or_warn(config_json, "config") else {
        return std::ptr::null_mut();
    };

    match DirectoryConfig::from_json(&raw) {
        Ok(config) => open_directory(name, config),
        Err(e) => {
            warn!("Invalid directory config: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Returns every entry, normalized.
///
/// Legacy-shaped entries found in storage are rewritten in the current shape
/// as a side effect.
///
/// # Parameters
///
/// * `state` - Directory handle
///
/// # Returns
///
/// `AppResponse::Ok` holding a JSON array of records.
///
/// # Errors
///
/// * `BadRequest` - null state pointer
/// * `DatabaseError` - the LMDB read or write failed
///
/// # Safety
///
/// `state` must be null or a live handle from [`create_directory`]. The
/// returned string is owned by the caller and must be released with
/// [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_users(state: *mut DirectoryState) -> *const c_char {
    call_resolver(state, GET_USERS, None)
}

/// Creates an entry, or updates the contact fields of the entry with the same
/// `(tipo, cliente, usuario)`.
///
/// # Parameters
///
/// * `state` - Directory handle
/// * `json_ptr` - `{tipo, cliente, usuario, telefono, departamento[, tipoUsuario]}`
///
/// # Returns
///
/// `AppResponse::Ok` holding `{"success": true}`.
///
/// # Errors
///
/// * `BadRequest` - null state or payload pointer, payload not UTF-8 or not a
///   JSON object
/// * `SerializationError` - payload is not valid JSON
/// * `DatabaseError` - the LMDB read or write failed
///
/// # Safety
///
/// `state` must be null or a live handle from [`create_directory`];
/// `json_ptr` must be null or a valid null-terminated string. The returned
/// string is owned by the caller and must be released with
/// [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_user(state: *mut DirectoryState, json_ptr: *const c_char) -> *const c_char {
    call_resolver(state, SAVE_USER, Some(json_ptr))
}

/// Replaces the entry found under the original key with the new fields.
///
/// # Parameters
///
/// * `state` - Directory handle
/// * `json_ptr` - `{originalTipo, originalCliente, originalUsuario, ...new fields}`
///
/// # Returns
///
/// `AppResponse::Ok` holding `{"success": true}`, or
/// `{"success": false, "error": "Usuario no encontrado"}` when nothing has the
/// original key. A miss leaves storage untouched.
///
/// # Errors
///
/// * `BadRequest` - null state or payload pointer, payload not UTF-8 or not a
///   JSON object
/// * `SerializationError` - payload is not valid JSON
/// * `DatabaseError` - the LMDB read or write failed
///
/// # Safety
///
/// `state` must be null or a live handle from [`create_directory`];
/// `json_ptr` must be null or a valid null-terminated string. The returned
/// string is owned by the caller and must be released with
/// [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_user(state: *mut DirectoryState, json_ptr: *const c_char) -> *const c_char {
    call_resolver(state, UPDATE_USER, Some(json_ptr))
}

/// Removes the entry with the given key, if any.
///
/// # Parameters
///
/// * `state` - Directory handle
/// * `json_ptr` - `{tipo, cliente, usuario}`
///
/// # Returns
///
/// `AppResponse::Ok` holding `{"success": true}`, whether or not anything
/// matched.
///
/// # Errors
///
/// * `BadRequest` - null state or payload pointer, payload not UTF-8 or not a
///   JSON object
/// * `SerializationError` - payload is not valid JSON
/// * `DatabaseError` - the LMDB read or write failed
///
/// # Safety
///
/// `state` must be null or a live handle from [`create_directory`];
/// `json_ptr` must be null or a valid null-terminated string. The returned
/// string is owned by the caller and must be released with
/// [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_user(state: *mut DirectoryState, json_ptr: *const c_char) -> *const c_char {
    call_resolver(state, DELETE_USER, Some(json_ptr))
}

/// Merges a batch into the directory. Incoming entries win over stored ones
/// with the same key and keep the stored entry's position.
///
/// # Parameters
///
/// * `state` - Directory handle
/// * `json_ptr` - `{newUsers: [...]}`
///
/// # Returns
///
/// `AppResponse::Ok` holding `{"success": true, "count": n}`, where `n` is the
/// size of the merged collection.
///
/// # Errors
///
/// * `BadRequest` - null state or payload pointer, payload not UTF-8 or not a
///   JSON object
/// * `SerializationError` - payload is not valid JSON
/// * `DatabaseError` - the LMDB read or write failed
///
/// # Safety
///
/// `state` must be null or a live handle from [`create_directory`];
/// `json_ptr` must be null or a valid null-terminated string. The returned
/// string is owned by the caller and must be released with
/// [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn bulk_save_users(
    state: *mut DirectoryState,
    json_ptr: *const c_char,
) -> *const c_char {
    call_resolver(state, BULK_SAVE_USERS, Some(json_ptr))
}

/// Calls a resolver function by its UI name.
///
/// # Parameters
///
/// * `state` - Directory handle
/// * `function` - `getUsers`, `saveUser`, `updateUser`, `deleteUser` or
///   `bulkSaveUsers`
/// * `json_ptr` - Payload for that function; null is passed on as JSON `null`
///
/// # Returns
///
/// The same response the dedicated FFI function would give.
///
/// # Errors
///
/// * `NotFound` - no resolver function has that name
/// * anything the dedicated function can return
///
/// # Safety
///
/// `state` must be null or a live handle; `function` and `json_ptr` must be
/// null or valid null-terminated strings. The returned string must be
/// released with [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn invoke_resolver(
    state: *mut DirectoryState,
    function: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let function = match c_ptr_to_string(function, "function") {
        Ok(f) => f,
        Err(error_ptr) => return error_ptr,
    };
    let payload = (!json_ptr.is_null()).then_some(json_ptr);
    call_resolver(state, &function, payload)
}

/// Flushes pending writes and releases the handle.
///
/// # Parameters
///
/// * `state` - Directory handle from [`create_directory`]
///
/// # Returns
///
/// `AppResponse::Ok` once the handle is released, `DatabaseError` if the
/// final flush failed (the handle is released either way), or `BadRequest`
/// for a null pointer.
///
/// # Safety
///
/// Takes back ownership of `state`. It must come from [`create_directory`] or
/// [`create_directory_with_config`], must not be closed twice, and must not be
/// used by any other call afterwards. The returned string must be released
/// with [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_directory(state: *mut DirectoryState) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_directory".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { Box::from_raw(state) };

    match state.close() {
        Ok(()) => {
            let success = AppResponse::success(format!("Directory '{}' closed", state.name));
            response_to_c_string(&success)
        }
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Releases a string previously returned by this library.
///
/// # Parameters
///
/// * `ptr` - A response string from any function above; null is ignored
///
/// # Safety
///
/// `ptr` must have been returned by this library and not freed already.
/// Strings allocated elsewhere must never be passed here.
#[no_mangle]
pub extern "C" fn free_response(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

fn open_directory(name: *const c_char, config: DirectoryConfig) -> *mut DirectoryState {
    let Some(name) = c_str_or_warn(name, "name") else {
        return std::ptr::null_mut();
    };

    info!("Opening directory at {name}.lmdb");

    match DirectoryState::with_config(name.clone(), config) {
        Ok(state) => Box::into_raw(Box::new(state)),
        Err(e) => {
            warn!("Failed to open directory {name}: {e}");
            std::ptr::null_mut()
        }
    }
}

fn call_resolver(
    state: *mut DirectoryState,
    function: &str,
    json_ptr: Option<*const c_char>,
) -> *const c_char {
    let state = match unsafe { state.as_ref() } {
        Some(s) => s,
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {function}"));
            return response_to_c_string(&error);
        }
    };

    let payload = match json_ptr {
        None => Value::Null,
        Some(ptr) => {
            let json_str = match c_ptr_to_string(ptr, "JSON") {
                Ok(json) => json,
                Err(error_ptr) => return error_ptr,
            };
            match serde_json::from_str(&json_str) {
                Ok(value) => value,
                Err(e) => {
                    let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
                    return response_to_c_string(&error);
                }
            }
        }
    };

    let response = match state.resolver().invoke(function, &payload) {
        Ok(body) => AppResponse::Ok(body.to_string()),
        Err(e) => {
            warn!("Resolver {function} failed: {e}");
            AppResponse::from(e)
        }
    };
    response_to_c_string(&response)
}

/// Serializes `response` to JSON and hands ownership of the C string to the
/// caller (see [`free_response`]). Null if either step fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Reads a C string, or returns an encoded `BadRequest` for null or
/// non-UTF-8 input.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn c_str_or_warn(ptr: *const c_char, field_name: &str) -> Option<String> {
    if ptr.is_null() {
        warn!("Null {field_name} pointer");
        return None;
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Some(s.to_string()),
        Err(e) => {
            warn!("Invalid UTF-8 in {field_name}: {e}");
            None
        }
    }
}
