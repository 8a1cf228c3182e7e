//!
//! taskgate HTTP server
//! ---------------------
//! This module defines the Axum router over the accounts (`/usuarios`) and tasks
//! (`/tareas`) tables plus `/login`.
//!
//! Responsibilities:
//! - Registration and login backed by the `identity` provider.
//! - Bearer-token gate on account reads and mutations; task routes are gated
//!   only when the configured policy says so.
//! - Role-scoped account updates and the task field allow-list.
//! - Startup: store selection, optional bootstrap admin, listener.

use std::sync::Arc;

use anyhow::Context;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::config::{ServerConfig, StorageBackend, TaskAuthPolicy};
use crate::identity::{require_token, AuthProvider, TokenService};
use crate::security::PasswordHasher;
use crate::storage::{MemoryStore, PgStore, Stores};

pub mod accounts;
pub mod login;
pub mod tasks;

/// Source of the calendar date a login is attributed to.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub fn utc_clock() -> Clock { Arc::new(|| Utc::now().date_naive()) }

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub auth: AuthProvider,
    pub clock: Clock,
}

impl AppState {
    pub fn new(stores: Stores, hasher: PasswordHasher, tokens: TokenService) -> Self {
        let auth = AuthProvider::new(stores.accounts.clone(), hasher, tokens);
        Self { stores, auth, clock: utc_clock() }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn today(&self) -> NaiveDate { (self.clock)() }
}

/// Mount all routes. Account reads and mutations always pass the bearer gate;
/// registration and login never do.
pub fn router(state: AppState, task_policy: TaskAuthPolicy) -> Router {
    let gate = middleware::from_fn_with_state(state.auth.tokens().clone(), require_token);

    let account_routes = Router::new()
        .route("/usuarios", get(accounts::list).route_layer(gate.clone()).post(accounts::register))
        .route(
            "/usuarios/{id}",
            get(accounts::get_one)
                .put(accounts::replace)
                .patch(accounts::patch)
                .delete(accounts::remove)
                .route_layer(gate.clone()),
        )
        .route("/usuarios/email/{correo}", get(accounts::by_login_name).route_layer(gate.clone()));

    let task_routes = Router::new()
        .route("/tareas", get(tasks::list).post(tasks::create))
        .route(
            "/tareas/{id}",
            get(tasks::get_one).put(tasks::replace).patch(tasks::patch).delete(tasks::remove),
        )
        .route("/tareas/usuario/{usuario_id}", get(tasks::by_account));
    let task_routes = match task_policy {
        TaskAuthPolicy::Open => task_routes,
        TaskAuthPolicy::RequireToken => task_routes.route_layer(gate),
    };

    Router::new()
        .route("/", get(|| async { "taskgate ok" }))
        .route("/login", post(login::login))
        .merge(account_routes)
        .merge(task_routes)
        .with_state(state)
}

async fn open_stores(config: &ServerConfig) -> anyhow::Result<Stores> {
    match config.storage {
        StorageBackend::Memory => {
            warn!(target: "startup", "using in-memory storage; data is lost on exit");
            Ok(Stores::from_shared(Arc::new(MemoryStore::new())))
        }
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().context("DATABASE_URL not configured")?;
            let store = PgStore::connect(url).await.context("while connecting to postgres")?;
            Ok(Stores::from_shared(Arc::new(store)))
        }
    }
}

/// Start the HTTP server with a fully resolved configuration.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "taskgate starting: addr={}, storage={:?}, task_policy={:?}, argon2={:?}",
        config.addr(), config.storage, config.task_policy, config.hash_cost
    );
    if config.task_policy == TaskAuthPolicy::Open {
        warn!(target: "startup", "/tareas routes accept unauthenticated requests (TASKGATE_TASKS_REQUIRE_AUTH unset)");
    }

    let stores = open_stores(&config).await?;
    let hasher = PasswordHasher::new(config.hash_cost).context("while configuring password hasher")?;
    let tokens = TokenService::new(config.token_secret.as_bytes());
    let state = AppState::new(stores, hasher, tokens);

    if let Some((login, secret)) = &config.bootstrap_admin {
        state.auth
            .ensure_bootstrap_admin(login, secret, state.today())
            .await
            .map_err(|e| anyhow::anyhow!("while ensuring bootstrap admin: {e}"))?;
    }

    let app = router(state, config.task_policy);
    let addr = config.addr();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("while binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "startup", "shutdown requested");
        })
        .await?;

    Ok(())
}
