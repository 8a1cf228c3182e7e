//! Role-scoped field permissions for account and task mutations.
//!
//! Patches are read from a JSON object through explicit key tables; only keys
//! named there can ever reach an UPDATE, and every value is type-checked first.

use serde_json::{Map, Value};

use super::principal::Role;
use crate::error::{AppError, AppResult};
use crate::storage::TaskChanges;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountField {
    Name,
    LoginName,
    CreatedOn,
    Level,
    Role,
    Secret,
}

impl AccountField {
    /// Fields an admin may set.
    pub const FULL: &'static [AccountField] = &[
        AccountField::Name,
        AccountField::LoginName,
        AccountField::CreatedOn,
        AccountField::Level,
        AccountField::Role,
        AccountField::Secret,
    ];
    /// Fields a moderator may set.
    pub const RESTRICTED: &'static [AccountField] = &[AccountField::Name, AccountField::CreatedOn];

    pub fn key(&self) -> &'static str {
        match self {
            AccountField::Name => "nombre",
            AccountField::LoginName => "correo",
            AccountField::CreatedOn => "fecha",
            AccountField::Level => "nivel",
            AccountField::Role => "rol",
            AccountField::Secret => "contrasena",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::FULL.iter().copied().find(|f| f.key() == key)
    }

    /// Known keys present in `body`, whatever their values.
    pub fn present_in(body: &Map<String, Value>) -> Vec<AccountField> {
        Self::FULL.iter().copied().filter(|f| body.contains_key(f.key())).collect()
    }
}

/// Account fields `role` may mutate on other accounts.
pub fn permitted_account_fields(role: Role) -> &'static [AccountField] {
    match role {
        Role::Admin => AccountField::FULL,
        Role::Moderador => AccountField::RESTRICTED,
        Role::Usuario | Role::Superuser => &[],
    }
}

pub fn can_update_accounts(role: Role) -> bool { !permitted_account_fields(role).is_empty() }

pub fn can_replace_accounts(role: Role) -> bool { role == Role::Admin }

pub fn can_delete_accounts(role: Role) -> bool { role == Role::Admin }

/// Rejects with 403 unless every touched field is in the caller's set.
pub fn authorize_account_fields(role: Role, touched: &[AccountField]) -> AppResult<()> {
    let allowed = permitted_account_fields(role);
    match touched.iter().find(|f| !allowed.contains(*f)) {
        None if !allowed.is_empty() => Ok(()),
        None => Err(AppError::forbidden("forbidden", "role may not update accounts")),
        Some(f) => Err(AppError::forbidden(
            "forbidden".to_string(),
            format!("role '{role}' may not update '{}'", f.key()),
        )),
    }
}

/// Partial account update as submitted; the secret is still plaintext here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub login_name: Option<String>,
    pub created_on: Option<String>,
    pub level: Option<i32>,
    pub role: Option<Role>,
    pub secret: Option<String>,
}

impl AccountPatch {
    /// Unknown keys are ignored. Wrong types, empty strings and roles outside
    /// the four known values are validation errors.
    pub fn from_json(body: &Map<String, Value>) -> AppResult<Self> {
        let mut patch = AccountPatch::default();
        for (key, value) in body {
            let Some(field) = AccountField::from_key(key) else { continue };
            match field {
                AccountField::Name => patch.name = Some(non_empty_str(key, value)?),
                AccountField::LoginName => patch.login_name = Some(non_empty_str(key, value)?),
                AccountField::CreatedOn => patch.created_on = Some(non_empty_str(key, value)?),
                AccountField::Secret => patch.secret = Some(non_empty_str(key, value)?),
                AccountField::Level => patch.level = Some(int(key, value)?),
                AccountField::Role => {
                    let raw = non_empty_str(key, value)?;
                    let role = raw.parse::<Role>().map_err(|e| AppError::user("invalid_role".to_string(), e.to_string()))?;
                    patch.role = Some(role);
                }
            }
        }
        Ok(patch)
    }

    pub fn fields(&self) -> Vec<AccountField> {
        let mut out = Vec::new();
        if self.name.is_some() { out.push(AccountField::Name); }
        if self.login_name.is_some() { out.push(AccountField::LoginName); }
        if self.created_on.is_some() { out.push(AccountField::CreatedOn); }
        if self.level.is_some() { out.push(AccountField::Level); }
        if self.role.is_some() { out.push(AccountField::Role); }
        if self.secret.is_some() { out.push(AccountField::Secret); }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    AccountId,
    Description,
    Points,
    Completed,
}

impl TaskField {
    pub const ALLOWED: &'static [TaskField] =
        &[TaskField::AccountId, TaskField::Description, TaskField::Points, TaskField::Completed];

    pub fn key(&self) -> &'static str {
        match self {
            TaskField::AccountId => "usuario_id",
            TaskField::Description => "descripcion",
            TaskField::Points => "puntos",
            TaskField::Completed => "completado",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALLOWED.iter().copied().find(|f| f.key() == key)
    }
}

/// Merge only allow-listed keys into a task update. An update that ends up
/// with no fields is rejected rather than issued as a no-op.
pub fn task_changes_from_json(body: &Map<String, Value>) -> AppResult<TaskChanges> {
    let mut changes = TaskChanges::default();
    for (key, value) in body {
        let Some(field) = TaskField::from_key(key) else { continue };
        match field {
            TaskField::AccountId => changes.account_id = Some(int(key, value)?),
            TaskField::Description => changes.description = Some(non_empty_str(key, value)?),
            TaskField::Points => changes.points = Some(int(key, value)?),
            TaskField::Completed => changes.completed = Some(int(key, value)?),
        }
    }
    if changes.is_empty() {
        return Err(AppError::user("no_fields", "no updatable fields supplied"));
    }
    Ok(changes)
}

fn non_empty_str(key: &str, value: &Value) -> AppResult<String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        Some(_) => Err(AppError::user("invalid_field".to_string(), format!("'{key}' must not be empty"))),
        None => Err(AppError::user("invalid_field".to_string(), format!("'{key}' must be a string"))),
    }
}

fn int(key: &str, value: &Value) -> AppResult<i32> {
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| AppError::user("invalid_field".to_string(), format!("'{key}' must be an integer")))
}
