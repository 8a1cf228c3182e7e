//! `/tareas` handlers. Partial updates only ever carry allow-listed columns.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::authorizer;
use crate::storage::{NewTask, Task, TaskChanges};

#[derive(Debug, Deserialize)]
pub struct TaskPayload {
    pub usuario_id: i32,
    pub descripcion: String,
    pub puntos: i32,
    #[serde(default)]
    pub completado: Option<i32>,
}

impl TaskPayload {
    fn into_new_task(self) -> AppResult<NewTask> {
        if self.descripcion.trim().is_empty() {
            return Err(AppError::user("invalid_field", "'descripcion' must not be empty"));
        }
        Ok(NewTask {
            account_id: self.usuario_id,
            description: self.descripcion,
            points: self.puntos,
            completed: self.completado.unwrap_or(0),
        })
    }
}

fn task_not_found() -> AppError { AppError::not_found("task_not_found", "Tarea no encontrada") }

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(state.stores.tasks.list().await?))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Task>> {
    let task = state.stores.tasks.find_by_id(id).await?.ok_or_else(task_not_found)?;
    Ok(Json(task))
}

pub async fn by_account(State(state): State<AppState>, Path(account_id): Path<i32>) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(state.stores.tasks.list_by_account(account_id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<TaskPayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let Json(payload) = body?;
    let task = state.stores.tasks.insert(payload.into_new_task()?).await?;
    debug!(target: "store", task_id = task.id, account_id = task.account_id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn replace(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    body: Result<Json<TaskPayload>, JsonRejection>,
) -> AppResult<Json<Task>> {
    let Json(payload) = body?;
    let changes = TaskChanges::from(payload.into_new_task()?);
    let task = state.stores.tasks.update(id, changes).await?.ok_or_else(task_not_found)?;
    Ok(Json(task))
}

pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> AppResult<Json<Task>> {
    let Json(body) = body?;
    let changes = authorizer::task_changes_from_json(&body)?;
    let task = state.stores.tasks.update(id, changes).await?.ok_or_else(task_not_found)?;
    Ok(Json(task))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Value>> {
    state.stores.tasks.delete(id).await?.ok_or_else(task_not_found)?;
    Ok(Json(json!({ "message": "Tarea eliminada" })))
}
