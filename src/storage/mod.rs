//!
//! taskgate storage module
//! ------------------------
//! Record types and store traits for the two tables behind the service:
//! accounts (`usuarios`) and their assigned tasks (`tareas`).
//!
//! Two implementations exist:
//! - `PgStore`: tokio-postgres over an existing schema; every statement is
//!   parameterized.
//! - `MemoryStore`: maps behind a mutex, enforcing the same uniqueness and
//!   reference rules. Used by tests and for local runs without a database.
//!
//! The public API centers around the `AccountStore` and `TaskStore` traits, usually
//! held as `Arc<dyn ...>` inside the server state.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::identity::Role;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the offending field.
    #[error("unique constraint violated on {0}")]
    Conflict(String),
    /// A foreign key points at a row that does not exist.
    #[error("referenced {0} does not exist")]
    InvalidReference(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored account. The secret hash is never serialized.
#[derive(Clone, Serialize, PartialEq, Eq)]
pub struct Account {
    pub id: i32,
    #[serde(rename = "nombre")]
    pub name: String,
    /// Login name; unique and case-sensitive.
    #[serde(rename = "correo")]
    pub login_name: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    #[serde(rename = "fecha")]
    pub created_on: String,
    #[serde(rename = "nivel")]
    pub level: i32,
    #[serde(rename = "rol")]
    pub role: Role,
    #[serde(rename = "racha")]
    pub streak: i32,
    #[serde(rename = "ultimo_login")]
    pub last_login: Option<NaiveDate>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("login_name", &self.login_name)
            .field("secret_hash", &"<redacted>")
            .field("created_on", &self.created_on)
            .field("level", &self.level)
            .field("role", &self.role)
            .field("streak", &self.streak)
            .field("last_login", &self.last_login)
            .finish()
    }
}

impl Account {
    pub fn streak_state(&self) -> StreakState {
        StreakState { streak: self.streak, last_login: self.last_login }
    }
}

#[derive(Clone)]
pub struct NewAccount {
    pub name: String,
    pub login_name: String,
    pub secret_hash: String,
    pub created_on: String,
    pub level: i32,
    pub role: Role,
}

/// Field-level account update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub login_name: Option<String>,
    pub created_on: Option<String>,
    pub level: Option<i32>,
    pub role: Option<Role>,
    pub secret_hash: Option<String>,
}

impl AccountChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.login_name.is_none()
            && self.created_on.is_none()
            && self.level.is_none()
            && self.role.is_none()
            && self.secret_hash.is_none()
    }
}

/// The login-derived pair only the streak path writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub streak: i32,
    pub last_login: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Task {
    pub id: i32,
    #[serde(rename = "usuario_id")]
    pub account_id: i32,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "puntos")]
    pub points: i32,
    #[serde(rename = "completado")]
    pub completed: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub account_id: i32,
    pub description: String,
    pub points: i32,
    pub completed: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub account_id: Option<i32>,
    pub description: Option<String>,
    pub points: Option<i32>,
    pub completed: Option<i32>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.account_id.is_none() && self.description.is_none() && self.points.is_none() && self.completed.is_none()
    }
}

impl From<NewTask> for TaskChanges {
    fn from(t: NewTask) -> Self {
        Self {
            account_id: Some(t.account_id),
            description: Some(t.description),
            points: Some(t.points),
            completed: Some(t.completed),
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Account>>;
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Account>>;
    async fn find_by_login_name(&self, login_name: &str) -> StoreResult<Option<Account>>;
    async fn insert(&self, account: NewAccount) -> StoreResult<Account>;
    /// Apply `changes` to one row. `None` when no row has `id`.
    async fn update(&self, id: i32, changes: AccountChanges) -> StoreResult<Option<Account>>;
    /// Remove one row and its tasks. `None` when no row has `id`.
    async fn delete(&self, id: i32) -> StoreResult<Option<Account>>;
    /// Write `next` only if the row still holds `expected`, in one atomic step.
    /// `None` when the row changed underneath (or is gone).
    async fn compare_and_set_streak(&self, id: i32, expected: StreakState, next: StreakState) -> StoreResult<Option<Account>>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Task>>;
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Task>>;
    async fn list_by_account(&self, account_id: i32) -> StoreResult<Vec<Task>>;
    async fn insert(&self, task: NewTask) -> StoreResult<Task>;
    async fn update(&self, id: i32, changes: TaskChanges) -> StoreResult<Option<Task>>;
    async fn delete(&self, id: i32) -> StoreResult<Option<Task>>;
}

/// Both tables behind one handle.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl Stores {
    pub fn from_shared<S: AccountStore + TaskStore + 'static>(store: Arc<S>) -> Self {
        Self { accounts: store.clone(), tasks: store }
    }
}
