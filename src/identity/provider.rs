use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::principal::Role;
use super::streak::{self, StreakOutcome};
use super::token::TokenService;
use crate::error::{AppError, AppResult};
use crate::security::PasswordHasher;
use crate::storage::{Account, AccountStore, NewAccount};

/// Attempts at the streak compare-and-set before the login is failed.
const STREAK_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub login_name: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    /// Post-login state, including any streak update.
    pub account: Account,
    pub token: String,
    pub streak: Option<StreakOutcome>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub login_name: String,
    pub secret: String,
    pub created_on: String,
    pub level: Option<i32>,
}

/// Credential checks, account creation and token issuance over an `AccountStore`.
#[derive(Clone)]
pub struct AuthProvider {
    accounts: Arc<dyn AccountStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
}

impl AuthProvider {
    pub fn new(accounts: Arc<dyn AccountStore>, hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self { accounts, hasher, tokens }
    }

    pub fn tokens(&self) -> &TokenService { &self.tokens }

    pub fn hash_secret(&self, secret: &str) -> AppResult<String> {
        Ok(self.hasher.hash(secret)?)
    }

    /// Verify credentials, advance the superuser streak, then issue a token.
    /// `today` is the calendar date the attempt is attributed to.
    pub async fn login(&self, req: &LoginRequest, today: NaiveDate) -> AppResult<LoginResponse> {
        let Some(account) = self.accounts.find_by_login_name(&req.login_name).await? else {
            debug!(target: "auth", "login for unknown account");
            return Err(AppError::not_found("account_not_found", "usuario no encontrado"));
        };
        if !self.hasher.verify(&req.secret, &account.secret_hash) {
            warn!(target: "auth", account_id = account.id, "login rejected: bad credentials");
            return Err(AppError::unauthenticated("invalid_credentials", "contraseña incorrecta"));
        }

        let (account, streak) = if account.role.tracks_streak() {
            let (account, outcome) = self.record_streak(account, today).await?;
            (account, Some(outcome))
        } else {
            (account, None)
        };

        let token = self.tokens.issue(account.id, account.role)?;
        info!(target: "auth", account_id = account.id, role = %account.role, "login ok");
        Ok(LoginResponse { account, token, streak })
    }

    async fn record_streak(&self, mut account: Account, today: NaiveDate) -> AppResult<(Account, StreakOutcome)> {
        for attempt in 1..=STREAK_CAS_ATTEMPTS {
            let expected = account.streak_state();
            let (next, outcome) = streak::advance(expected, today);
            if let Some(updated) = self.accounts.compare_and_set_streak(account.id, expected, next).await? {
                info!(target: "streak", account_id = updated.id, streak = updated.streak, ?outcome, "streak recorded");
                return Ok((updated, outcome));
            }
            debug!(target: "streak", account_id = account.id, attempt, "streak row changed concurrently; re-reading");
            account = self.accounts.find_by_id(account.id).await?
                .ok_or_else(|| AppError::not_found("account_not_found", "usuario no encontrado"))?;
        }
        Err(AppError::internal("streak_contention", "could not record login"))
    }

    /// Create an account with role `usuario`. The secret is hashed before it
    /// reaches the store.
    pub async fn register(&self, reg: Registration) -> AppResult<Account> {
        for (key, value) in [
            ("nombre", &reg.name),
            ("correo", &reg.login_name),
            ("contrasena", &reg.secret),
            ("fecha", &reg.created_on),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::user("missing_field".to_string(), format!("'{key}' is required")));
            }
        }
        if self.accounts.find_by_login_name(&reg.login_name).await?.is_some() {
            return Err(AppError::conflict("conflict", "correo already exists"));
        }
        let secret_hash = self.hash_secret(&reg.secret)?;
        let account = self.accounts.insert(NewAccount {
            name: reg.name,
            login_name: reg.login_name,
            secret_hash,
            created_on: reg.created_on,
            level: reg.level.unwrap_or(0),
            role: Role::Usuario,
        }).await?;
        info!(target: "auth", account_id = account.id, "account registered");
        Ok(account)
    }

    /// Create the configured administrator unless its login name already exists.
    /// Returns whether an account was created.
    pub async fn ensure_bootstrap_admin(&self, login_name: &str, secret: &str, today: NaiveDate) -> AppResult<bool> {
        if self.accounts.find_by_login_name(login_name).await?.is_some() {
            return Ok(false);
        }
        let secret_hash = self.hash_secret(secret)?;
        let account = self.accounts.insert(NewAccount {
            name: "Administrador".into(),
            login_name: login_name.to_string(),
            secret_hash,
            created_on: today.format("%Y-%m-%d").to_string(),
            level: 0,
            role: Role::Admin,
        }).await?;
        info!(target: "startup", account_id = account.id, "bootstrap admin created");
        Ok(true)
    }
}
