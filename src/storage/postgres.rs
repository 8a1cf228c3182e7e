//! PostgreSQL-backed store over tokio-postgres.
//!
//! Expects the tables to exist already:
//!
//! ```text
//! usuarios(id SERIAL PK, nombre VARCHAR NOT NULL, correo VARCHAR UNIQUE NOT NULL,
//!          contrasena VARCHAR NOT NULL, fecha VARCHAR NOT NULL, nivel INTEGER DEFAULT 0,
//!          rol VARCHAR NOT NULL DEFAULT 'usuario', racha INTEGER NOT NULL DEFAULT 0,
//!          ultimo_login DATE)
//! tareas(id SERIAL PK, usuario_id INTEGER NOT NULL REFERENCES usuarios(id) ON DELETE CASCADE,
//!        descripcion TEXT NOT NULL, puntos INTEGER NOT NULL, completado INTEGER DEFAULT 0)
//! ```
//!
//! One shared `Client` pipelines concurrent queries. If its connection drops,
//! the next call opens a new one. No statement is ever built from request text,
//! only from fixed column names with positional parameters.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, error, warn};

use super::{
    Account, AccountChanges, AccountStore, NewAccount, NewTask, StoreError, StoreResult, StreakState, Task,
    TaskChanges, TaskStore,
};
use crate::identity::Role;

const ACCOUNT_COLS: &str = "id, nombre, correo, contrasena, fecha, nivel, rol, racha, ultimo_login";
const TASK_COLS: &str = "id, usuario_id, descripcion, puntos, completado";

pub struct PgStore {
    config: Config,
    client: RwLock<Arc<Client>>,
}

impl PgStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let config: Config = url.parse().map_err(|e: tokio_postgres::Error| StoreError::Backend(format!("invalid postgres url: {e}")))?;
        let client = open(&config).await?;
        Ok(Self { config, client: RwLock::new(Arc::new(client)) })
    }

    /// Current client, reopened first if its connection has closed.
    async fn client(&self) -> StoreResult<Arc<Client>> {
        let current = self.client.read().clone();
        if !current.is_closed() {
            return Ok(current);
        }
        warn!(target: "store", "postgres connection closed; reconnecting");
        let fresh = Arc::new(open(&self.config).await?);
        *self.client.write() = fresh.clone();
        Ok(fresh)
    }
}

async fn open(config: &Config) -> StoreResult<Client> {
    let (client, conn) = config.connect(NoTls).await.map_err(map_pg_err)?;
    // drive the connection in background
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            error!(target: "store", "postgres connection error: {e}");
        }
    });
    Ok(client)
}

fn map_pg_err(e: tokio_postgres::Error) -> StoreError {
    match e.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => StoreError::Conflict("correo".into()),
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => StoreError::InvalidReference("usuario".into()),
        _ => StoreError::Backend(e.to_string()),
    }
}

fn account_from_row(row: &Row) -> StoreResult<Account> {
    let role: String = row.try_get("rol").map_err(map_pg_err)?;
    let role = role.parse::<Role>().map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(Account {
        id: row.try_get("id").map_err(map_pg_err)?,
        name: row.try_get("nombre").map_err(map_pg_err)?,
        login_name: row.try_get("correo").map_err(map_pg_err)?,
        secret_hash: row.try_get("contrasena").map_err(map_pg_err)?,
        created_on: row.try_get("fecha").map_err(map_pg_err)?,
        level: row.try_get::<_, Option<i32>>("nivel").map_err(map_pg_err)?.unwrap_or(0),
        role,
        streak: row.try_get("racha").map_err(map_pg_err)?,
        last_login: row.try_get("ultimo_login").map_err(map_pg_err)?,
    })
}

fn task_from_row(row: &Row) -> StoreResult<Task> {
    Ok(Task {
        id: row.try_get("id").map_err(map_pg_err)?,
        account_id: row.try_get("usuario_id").map_err(map_pg_err)?,
        description: row.try_get("descripcion").map_err(map_pg_err)?,
        points: row.try_get("puntos").map_err(map_pg_err)?,
        completed: row.try_get::<_, Option<i32>>("completado").map_err(map_pg_err)?.unwrap_or(0),
    })
}

/// Accumulates `column = $n` assignments for an UPDATE.
struct SetClause<'a> {
    sets: Vec<String>,
    params: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> SetClause<'a> {
    fn new() -> Self { Self { sets: Vec::new(), params: Vec::new() } }

    fn push(&mut self, column: &'static str, value: &'a (dyn ToSql + Sync)) {
        self.params.push(value);
        self.sets.push(format!("{column} = ${}", self.params.len()));
    }

    /// Returns the statement text and its parameters, with `id` bound last.
    fn finish(mut self, table: &str, cols: &str, id: &'a i32) -> (String, Vec<&'a (dyn ToSql + Sync)>) {
        self.params.push(id);
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ${} RETURNING {cols}",
            self.sets.join(", "),
            self.params.len()
        );
        (sql, self.params)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn list(&self) -> StoreResult<Vec<Account>> {
        let rows = self.client().await?
            .query(&format!("SELECT {ACCOUNT_COLS} FROM usuarios ORDER BY id"), &[])
            .await
            .map_err(map_pg_err)?;
        rows.iter().map(account_from_row).collect()
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Account>> {
        let row = self.client().await?
            .query_opt(&format!("SELECT {ACCOUNT_COLS} FROM usuarios WHERE id = $1"), &[&id])
            .await
            .map_err(map_pg_err)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_login_name(&self, login_name: &str) -> StoreResult<Option<Account>> {
        let row = self.client().await?
            .query_opt(&format!("SELECT {ACCOUNT_COLS} FROM usuarios WHERE correo = $1"), &[&login_name])
            .await
            .map_err(map_pg_err)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert(&self, account: NewAccount) -> StoreResult<Account> {
        let sql = format!(
            "INSERT INTO usuarios (nombre, correo, contrasena, fecha, nivel, rol, racha) \
             VALUES ($1, $2, $3, $4, $5, $6, 0) RETURNING {ACCOUNT_COLS}"
        );
        let row = self.client().await?
            .query_one(&sql, &[
                &account.name,
                &account.login_name,
                &account.secret_hash,
                &account.created_on,
                &account.level,
                &account.role.as_str(),
            ])
            .await
            .map_err(map_pg_err)?;
        account_from_row(&row)
    }

    async fn update(&self, id: i32, changes: AccountChanges) -> StoreResult<Option<Account>> {
        if changes.is_empty() { return AccountStore::find_by_id(self, id).await; }
        let role = changes.role.map(|r| r.as_str());
        let mut clause = SetClause::new();
        if let Some(v) = &changes.name { clause.push("nombre", v); }
        if let Some(v) = &changes.login_name { clause.push("correo", v); }
        if let Some(v) = &changes.created_on { clause.push("fecha", v); }
        if let Some(v) = &changes.level { clause.push("nivel", v); }
        if let Some(v) = &role { clause.push("rol", v); }
        if let Some(v) = &changes.secret_hash { clause.push("contrasena", v); }
        let (sql, params) = clause.finish("usuarios", ACCOUNT_COLS, &id);
        debug!(target: "store", "account update id={id} columns={}", params.len() - 1);
        let row = self.client().await?.query_opt(&sql, &params).await.map_err(map_pg_err)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn delete(&self, id: i32) -> StoreResult<Option<Account>> {
        // tareas rows go with it through ON DELETE CASCADE
        let row = self.client().await?
            .query_opt(&format!("DELETE FROM usuarios WHERE id = $1 RETURNING {ACCOUNT_COLS}"), &[&id])
            .await
            .map_err(map_pg_err)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn compare_and_set_streak(&self, id: i32, expected: StreakState, next: StreakState) -> StoreResult<Option<Account>> {
        let sql = format!(
            "UPDATE usuarios SET racha = $1, ultimo_login = $2 \
             WHERE id = $3 AND racha = $4 AND ultimo_login IS NOT DISTINCT FROM $5 \
             RETURNING {ACCOUNT_COLS}"
        );
        let row = self.client().await?
            .query_opt(&sql, &[&next.streak, &next.last_login, &id, &expected.streak, &expected.last_login])
            .await
            .map_err(map_pg_err)?;
        row.as_ref().map(account_from_row).transpose()
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn list(&self) -> StoreResult<Vec<Task>> {
        let rows = self.client().await?
            .query(&format!("SELECT {TASK_COLS} FROM tareas ORDER BY id"), &[])
            .await
            .map_err(map_pg_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Task>> {
        let row = self.client().await?
            .query_opt(&format!("SELECT {TASK_COLS} FROM tareas WHERE id = $1"), &[&id])
            .await
            .map_err(map_pg_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn list_by_account(&self, account_id: i32) -> StoreResult<Vec<Task>> {
        let rows = self.client().await?
            .query(&format!("SELECT {TASK_COLS} FROM tareas WHERE usuario_id = $1 ORDER BY id"), &[&account_id])
            .await
            .map_err(map_pg_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn insert(&self, task: NewTask) -> StoreResult<Task> {
        let sql = format!(
            "INSERT INTO tareas (usuario_id, descripcion, puntos, completado) VALUES ($1, $2, $3, $4) RETURNING {TASK_COLS}"
        );
        let row = self.client().await?
            .query_one(&sql, &[&task.account_id, &task.description, &task.points, &task.completed])
            .await
            .map_err(map_pg_err)?;
        task_from_row(&row)
    }

    async fn update(&self, id: i32, changes: TaskChanges) -> StoreResult<Option<Task>> {
        if changes.is_empty() { return TaskStore::find_by_id(self, id).await; }
        let mut clause = SetClause::new();
        if let Some(v) = &changes.account_id { clause.push("usuario_id", v); }
        if let Some(v) = &changes.description { clause.push("descripcion", v); }
        if let Some(v) = &changes.points { clause.push("puntos", v); }
        if let Some(v) = &changes.completed { clause.push("completado", v); }
        let (sql, params) = clause.finish("tareas", TASK_COLS, &id);
        let row = self.client().await?.query_opt(&sql, &params).await.map_err(map_pg_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn delete(&self, id: i32) -> StoreResult<Option<Task>> {
        let row = self.client().await?
            .query_opt(&format!("DELETE FROM tareas WHERE id = $1 RETURNING {TASK_COLS}"), &[&id])
            .await
            .map_err(map_pg_err)?;
        row.as_ref().map(task_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clause_numbers_parameters_in_order() {
        let name = "Ana".to_string();
        let level = 3i32;
        let id = 9i32;
        let mut clause = SetClause::new();
        clause.push("nombre", &name);
        clause.push("nivel", &level);
        let (sql, params) = clause.finish("usuarios", "id", &id);
        assert_eq!(sql, "UPDATE usuarios SET nombre = $1, nivel = $2 WHERE id = $3 RETURNING id");
        assert_eq!(params.len(), 3);
    }

    const TEST_SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS usuarios (
            id SERIAL PRIMARY KEY, nombre VARCHAR NOT NULL, correo VARCHAR UNIQUE NOT NULL,
            contrasena VARCHAR NOT NULL, fecha VARCHAR NOT NULL, nivel INTEGER DEFAULT 0,
            rol VARCHAR NOT NULL DEFAULT 'usuario', racha INTEGER NOT NULL DEFAULT 0, ultimo_login DATE);
        CREATE TABLE IF NOT EXISTS tareas (
            id SERIAL PRIMARY KEY, usuario_id INTEGER NOT NULL REFERENCES usuarios(id) ON DELETE CASCADE,
            descripcion TEXT NOT NULL, puntos INTEGER NOT NULL, completado INTEGER DEFAULT 0);";

    async fn live_store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a disposable database");
        let store = PgStore::connect(&url).await.unwrap();
        store.client().await.unwrap().batch_execute(TEST_SCHEMA).await.unwrap();
        store
    }

    async fn insert_superuser(store: &PgStore, tag: &str) -> Account {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        AccountStore::insert(store, NewAccount {
            name: "CAS".into(),
            login_name: format!("{tag}-{nanos}@test"),
            secret_hash: "$argon2id$placeholder".into(),
            created_on: "2024-01-01".into(),
            level: 0,
            role: Role::Superuser,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn streak_cas_admits_one_writer_per_expected_state() {
        let store = live_store().await;
        let account = insert_superuser(&store, "cas").await;
        let expected = account.streak_state();
        let next = StreakState { streak: 1, last_login: chrono::NaiveDate::from_ymd_opt(2024, 3, 1) };

        let first = store.compare_and_set_streak(account.id, expected, next).await.unwrap();
        assert_eq!(first.map(|a| a.streak_state()), Some(next));
        let second = store.compare_and_set_streak(account.id, expected, next).await.unwrap();
        assert!(second.is_none());

        AccountStore::delete(&store, account.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn reconnects_after_connection_loss() {
        let store = live_store().await;
        let account = insert_superuser(&store, "reconnect").await;

        let _ = store.client().await.unwrap().batch_execute("SELECT pg_terminate_backend(pg_backend_pid())").await;
        for _ in 0..50 {
            if store.client.read().is_closed() { break; }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(store.client.read().is_closed());

        let found = AccountStore::find_by_id(&store, account.id).await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(account.id));
        AccountStore::delete(&store, account.id).await.unwrap();
    }
}
