//!
//! taskgate configuration
//! -----------------------
//! Everything is read from the process environment once at startup and then
//! passed down explicitly. The token signing secret has no default: a missing
//! or empty `TASKGATE_TOKEN_SECRET` stops the process.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{anyhow, bail, Context, Result};

use crate::security::HashCost;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Whether `/tareas` routes sit behind the bearer gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAuthPolicy {
    Open,
    RequireToken,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub token_secret: String,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub hash_cost: HashCost,
    pub task_policy: TaskAuthPolicy,
    pub bootstrap_admin: Option<(String, String)>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("token_secret", &"<redacted>")
            .field("storage", &self.storage)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("hash_cost", &self.hash_cost)
            .field("task_policy", &self.task_policy)
            .field("bootstrap_admin", &self.bootstrap_admin.as_ref().map(|(login, _)| login))
            .finish()
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr { SocketAddr::new(self.bind, self.port) }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build from an explicit variable map; `from_env` passes the process environment.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| vars.get(name).map(|s| s.trim()).filter(|s| !s.is_empty());

        let token_secret = get("TASKGATE_TOKEN_SECRET")
            .ok_or_else(|| anyhow!("TASKGATE_TOKEN_SECRET must be set to a non-empty signing secret"))?
            .to_string();

        let port = match get("PORT") {
            Some(v) => v.parse::<u16>().with_context(|| format!("invalid PORT '{v}'"))?,
            None => DEFAULT_PORT,
        };
        let bind = match get("TASKGATE_BIND") {
            Some(v) => v.parse::<IpAddr>().with_context(|| format!("invalid TASKGATE_BIND '{v}'"))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let storage = match get("TASKGATE_STORAGE").map(|s| s.to_lowercase()) {
            None => StorageBackend::Postgres,
            Some(s) if s == "postgres" => StorageBackend::Postgres,
            Some(s) if s == "memory" => StorageBackend::Memory,
            Some(other) => bail!("unknown TASKGATE_STORAGE '{other}' (expected postgres or memory)"),
        };
        let database_url = get("DATABASE_URL").map(str::to_string);
        if storage == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required when TASKGATE_STORAGE is postgres");
        }

        let defaults = HashCost::default();
        let hash_cost = HashCost {
            m_cost_kib: parse_u32(get("TASKGATE_ARGON2_M_COST"), "TASKGATE_ARGON2_M_COST")?.unwrap_or(defaults.m_cost_kib),
            t_cost: parse_u32(get("TASKGATE_ARGON2_T_COST"), "TASKGATE_ARGON2_T_COST")?.unwrap_or(defaults.t_cost),
            p_cost: parse_u32(get("TASKGATE_ARGON2_P_COST"), "TASKGATE_ARGON2_P_COST")?.unwrap_or(defaults.p_cost),
        };
        hash_cost.validate().context("invalid argon2 work factor")?;

        let task_policy = match parse_bool(get("TASKGATE_TASKS_REQUIRE_AUTH"), "TASKGATE_TASKS_REQUIRE_AUTH")? {
            Some(true) => TaskAuthPolicy::RequireToken,
            _ => TaskAuthPolicy::Open,
        };

        let bootstrap_admin = match (get("TASKGATE_BOOTSTRAP_ADMIN_EMAIL"), get("TASKGATE_BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(login), Some(pw)) => Some((login.to_string(), pw.to_string())),
            (None, None) => None,
            _ => bail!("TASKGATE_BOOTSTRAP_ADMIN_EMAIL and TASKGATE_BOOTSTRAP_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self { bind, port, token_secret, storage, database_url, hash_cost, task_policy, bootstrap_admin })
    }
}

fn parse_u32(raw: Option<&str>, name: &str) -> Result<Option<u32>> {
    raw.map(|v| v.parse::<u32>().with_context(|| format!("invalid {name} '{v}'"))).transpose()
}

fn parse_bool(raw: Option<&str>, name: &str) -> Result<Option<bool>> {
    match raw.map(|s| s.to_lowercase()) {
        None => Ok(None),
        Some(s) => match s.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => bail!("invalid {name} '{s}'"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn secret_is_mandatory() {
        let err = ServerConfig::from_vars(&vars(&[("TASKGATE_STORAGE", "memory")])).unwrap_err();
        assert!(err.to_string().contains("TASKGATE_TOKEN_SECRET"));
        assert!(ServerConfig::from_vars(&vars(&[("TASKGATE_STORAGE", "memory"), ("TASKGATE_TOKEN_SECRET", "  ")])).is_err());
    }

    #[test]
    fn defaults_with_memory_storage() {
        let cfg = ServerConfig::from_vars(&vars(&[("TASKGATE_STORAGE", "memory"), ("TASKGATE_TOKEN_SECRET", "s")])).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.storage, StorageBackend::Memory);
        assert_eq!(cfg.task_policy, TaskAuthPolicy::Open);
        assert_eq!(cfg.hash_cost, HashCost::default());
        assert!(cfg.bootstrap_admin.is_none());
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn postgres_requires_database_url() {
        assert!(ServerConfig::from_vars(&vars(&[("TASKGATE_TOKEN_SECRET", "s")])).is_err());
        let cfg = ServerConfig::from_vars(&vars(&[
            ("TASKGATE_TOKEN_SECRET", "s"),
            ("DATABASE_URL", "postgres://localhost/app"),
            ("PORT", "8080"),
            ("TASKGATE_TASKS_REQUIRE_AUTH", "yes"),
        ])).unwrap();
        assert_eq!(cfg.storage, StorageBackend::Postgres);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.task_policy, TaskAuthPolicy::RequireToken);
    }

    #[test]
    fn work_factor_is_bounded() {
        let err = ServerConfig::from_vars(&vars(&[
            ("TASKGATE_STORAGE", "memory"),
            ("TASKGATE_TOKEN_SECRET", "s"),
            ("TASKGATE_ARGON2_M_COST", "999999999"),
        ]));
        assert!(err.is_err());
    }

    #[test]
    fn bootstrap_admin_needs_both_halves() {
        let base = [("TASKGATE_STORAGE", "memory"), ("TASKGATE_TOKEN_SECRET", "s")];
        let mut half = base.to_vec();
        half.push(("TASKGATE_BOOTSTRAP_ADMIN_EMAIL", "root@x"));
        assert!(ServerConfig::from_vars(&vars(&half)).is_err());
        half.push(("TASKGATE_BOOTSTRAP_ADMIN_PASSWORD", "pw"));
        let cfg = ServerConfig::from_vars(&vars(&half)).unwrap();
        assert_eq!(cfg.bootstrap_admin, Some(("root@x".to_string(), "pw".to_string())));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = ServerConfig::from_vars(&vars(&[("TASKGATE_STORAGE", "memory"), ("TASKGATE_TOKEN_SECRET", "hunter2")])).unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
