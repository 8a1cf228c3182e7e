//! Unified application error model and mapping helpers.
//! Every handler returns `AppResult<T>`; component errors (store, token, hasher)
//! convert into the nearest kind here so raw driver text never reaches a client.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::{debug, error};

use crate::identity::TokenError;
use crate::security::HashError;
use crate::storage::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Unauthenticated { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn unauthenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => AppError::conflict("conflict".to_string(), format!("{what} already exists")),
            StoreError::InvalidReference(what) => AppError::user("invalid_reference".to_string(), format!("{what} does not exist")),
            StoreError::Backend(detail) => {
                error!(target: "store", "store failure: {detail}");
                AppError::internal("store_error", "internal server error")
            }
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Missing => AppError::unauthenticated("missing_token", "authorization token required"),
            TokenError::Expired => AppError::forbidden("token_expired", "token expired"),
            TokenError::Invalid(_) => AppError::forbidden("invalid_token", "invalid token"),
            TokenError::Signing(detail) => {
                error!(target: "auth", "token signing failed: {detail}");
                AppError::internal("token_error", "internal server error")
            }
        }
    }
}

impl From<HashError> for AppError {
    fn from(err: HashError) -> Self {
        error!(target: "auth", "password hashing failed: {err}");
        AppError::internal("hash_error", "internal server error")
    }
}

impl From<JsonRejection> for AppError {
    fn from(rej: JsonRejection) -> Self {
        // serde's text can echo submitted values, secrets included
        debug!("rejected request body: {}", rej.body_text());
        AppError::user("invalid_body", "invalid JSON body")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::unauthenticated("missing_token", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "no").http_status(), 403);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(AppError::from(StoreError::Conflict("correo".into())).http_status(), 409);
        assert_eq!(AppError::from(StoreError::InvalidReference("usuario".into())).http_status(), 400);
        let internal = AppError::from(StoreError::Backend("relation \"usuarios\" does not exist".into()));
        assert_eq!(internal.http_status(), 500);
        assert!(!internal.message().contains("usuarios"), "driver text must not leak");
    }

    #[test]
    fn missing_and_invalid_tokens_are_distinct() {
        assert_eq!(AppError::from(TokenError::Missing).http_status(), 401);
        assert_eq!(AppError::from(TokenError::Expired).http_status(), 403);
        assert_eq!(AppError::from(TokenError::Invalid("bad signature".into())).http_status(), 403);
    }
}
