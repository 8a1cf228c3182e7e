use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::AppResult;
use crate::identity::LoginRequest;

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub correo: String,
    pub contrasena: String,
}

/// POST /login. The date used for the superuser streak comes from the state clock.
pub async fn login(State(state): State<AppState>, body: Result<Json<LoginPayload>, JsonRejection>) -> AppResult<Json<Value>> {
    let Json(payload) = body?;
    let req = LoginRequest { login_name: payload.correo, secret: payload.contrasena };
    let resp = state.auth.login(&req, state.today()).await?;
    Ok(Json(json!({
        "message": "Login exitoso",
        "usuario": resp.account,
        "token": resp.token,
    })))
}
