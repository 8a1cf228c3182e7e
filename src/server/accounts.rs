//! `/usuarios` handlers. Every response body is built from `Account`, whose
//! serialization omits the secret hash.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::authorizer::{self, AccountField, AccountPatch};
use crate::identity::{Principal, Registration, Role};
use crate::storage::{Account, AccountChanges};

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "correo")]
    pub login_name: String,
    #[serde(rename = "contrasena")]
    pub secret: String,
    #[serde(rename = "fecha")]
    pub created_on: String,
    #[serde(rename = "nivel", default)]
    pub level: Option<i32>,
}

/// Full admin update. `contrasena` is an optional secret reset.
#[derive(Debug, Deserialize)]
pub struct ReplacePayload {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "correo")]
    pub login_name: String,
    #[serde(rename = "fecha")]
    pub created_on: String,
    #[serde(rename = "nivel")]
    pub level: i32,
    #[serde(rename = "rol")]
    pub role: Role,
    #[serde(rename = "contrasena", default)]
    pub secret: Option<String>,
}

fn account_not_found() -> AppError { AppError::not_found("account_not_found", "Usuario no encontrado") }

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Account>>> {
    Ok(Json(state.stores.accounts.list().await?))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Account>> {
    let account = state.stores.accounts.find_by_id(id).await?.ok_or_else(account_not_found)?;
    Ok(Json(account))
}

pub async fn by_login_name(State(state): State<AppState>, Path(login_name): Path<String>) -> AppResult<Json<Account>> {
    let account = state.stores.accounts.find_by_login_name(&login_name).await?.ok_or_else(account_not_found)?;
    Ok(Json(account))
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterPayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Account>)> {
    let Json(payload) = body?;
    let account = state.auth.register(Registration {
        name: payload.name,
        login_name: payload.login_name,
        secret: payload.secret,
        created_on: payload.created_on,
        level: payload.level,
    }).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn replace(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
    Path(id): Path<i32>,
    body: Result<Json<ReplacePayload>, JsonRejection>,
) -> AppResult<Json<Account>> {
    if !authorizer::can_replace_accounts(caller.role) {
        return Err(AppError::forbidden("forbidden", "only admin may replace accounts"));
    }
    let Json(payload) = body?;
    for (key, value) in [("nombre", &payload.name), ("correo", &payload.login_name), ("fecha", &payload.created_on)] {
        if value.trim().is_empty() {
            return Err(AppError::user("invalid_field".to_string(), format!("'{key}' must not be empty")));
        }
    }
    let secret_hash = match payload.secret.as_deref().map(str::trim) {
        Some("") => return Err(AppError::user("invalid_field", "'contrasena' must not be empty")),
        Some(_) => payload.secret.as_deref().map(|s| state.auth.hash_secret(s)).transpose()?,
        None => None,
    };
    let changes = AccountChanges {
        name: Some(payload.name),
        login_name: Some(payload.login_name),
        created_on: Some(payload.created_on),
        level: Some(payload.level),
        role: Some(payload.role),
        secret_hash,
    };
    let account = state.stores.accounts.update(id, changes).await?.ok_or_else(account_not_found)?;
    info!(target: "auth", caller = caller.account_id, target_id = id, "account replaced");
    Ok(Json(account))
}

pub async fn patch(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
    Path(id): Path<i32>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> AppResult<Json<Account>> {
    if !authorizer::can_update_accounts(caller.role) {
        return Err(AppError::forbidden("forbidden", "role may not update accounts"));
    }
    let Json(body) = body?;
    // keys are authorized before any value is inspected
    let fields = AccountField::present_in(&body);
    if fields.is_empty() {
        return Err(AppError::user("no_fields", "no updatable fields supplied"));
    }
    authorizer::authorize_account_fields(caller.role, &fields)?;
    let patch = AccountPatch::from_json(&body)?;

    let secret_hash = patch.secret.as_deref().map(|s| state.auth.hash_secret(s)).transpose()?;
    let changes = AccountChanges {
        name: patch.name,
        login_name: patch.login_name,
        created_on: patch.created_on,
        level: patch.level,
        role: patch.role,
        secret_hash,
    };
    let account = state.stores.accounts.update(id, changes).await?.ok_or_else(account_not_found)?;
    info!(target: "auth", caller = caller.account_id, role = %caller.role, target_id = id, fields = fields.len(), "account updated");
    Ok(Json(account))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(caller): Extension<Principal>,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    if !authorizer::can_delete_accounts(caller.role) {
        return Err(AppError::forbidden("forbidden", "only admin may delete accounts"));
    }
    state.stores.accounts.delete(id).await?.ok_or_else(account_not_found)?;
    info!(target: "auth", caller = caller.account_id, target_id = id, "account deleted");
    Ok(Json(json!({ "message": "Usuario eliminado" })))
}
