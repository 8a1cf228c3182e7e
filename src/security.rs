//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`), so the salt
//! and work factor travel with the hash and verification needs nothing else.
//! Hashing runs synchronously on the request task: it is a deliberate CPU-bound
//! step whose cost is bounded by the configured `HashCost`.

use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};

/// Upper bound on memory cost accepted from configuration (256 MiB).
pub const MAX_M_COST_KIB: u32 = 256 * 1024;
/// Upper bound on iterations accepted from configuration.
pub const MAX_T_COST: u32 = 16;
/// Upper bound on parallelism accepted from configuration.
pub const MAX_P_COST: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("salt generation failed: {0}")]
    Salt(String),
    #[error("hashing failed: {0}")]
    Hash(String),
}

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self { m_cost_kib: Params::DEFAULT_M_COST, t_cost: Params::DEFAULT_T_COST, p_cost: Params::DEFAULT_P_COST }
    }
}

impl HashCost {
    /// Cheapest parameters argon2 accepts. Only for tests.
    pub fn minimal() -> Self { Self { m_cost_kib: 8, t_cost: 1, p_cost: 1 } }

    pub fn validate(&self) -> Result<(), HashError> {
        if self.m_cost_kib > MAX_M_COST_KIB || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST {
            return Err(HashError::Params(format!(
                "work factor above bounds (m<={MAX_M_COST_KIB}, t<={MAX_T_COST}, p<={MAX_P_COST})"
            )));
        }
        self.params().map(|_| ())
    }

    fn params(&self) -> Result<Params, HashError> {
        Params::new(self.m_cost_kib, self.t_cost, self.p_cost, None).map_err(|e| HashError::Params(e.to_string()))
    }
}

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, HashError> {
        cost.validate()?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, cost.params()?);
        Ok(Self { argon2 })
    }

    /// Hash with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, HashError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| HashError::Salt(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::Salt(e.to_string()))?;
        let phc = self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| HashError::Hash(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// Verify against a stored PHC string using the parameters embedded in it.
    /// Malformed hashes verify as false.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2.verify_password(secret.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher { PasswordHasher::new(HashCost::minimal()).unwrap() }

    #[test]
    fn hash_never_equals_plaintext_and_verifies() {
        let h = hasher();
        let phc = h.hash("s3cret").unwrap();
        assert_ne!(phc, "s3cret");
        assert!(phc.starts_with("$argon2id$"));
        assert!(h.verify("s3cret", &phc));
        assert!(!h.verify("S3cret", &phc));
    }

    #[test]
    fn salts_are_fresh_per_call() {
        let h = hasher();
        assert_ne!(h.hash("same").unwrap(), h.hash("same").unwrap());
    }

    #[test]
    fn malformed_hash_is_false_not_panic() {
        let h = hasher();
        assert!(!h.verify("x", ""));
        assert!(!h.verify("x", "plaintext-from-legacy-row"));
        assert!(!h.verify("x", "$argon2id$v=19$garbage"));
    }

    #[test]
    fn verification_uses_embedded_cost() {
        let weak = hasher();
        let stronger = PasswordHasher::new(HashCost { m_cost_kib: 64, t_cost: 2, p_cost: 1 }).unwrap();
        let phc = stronger.hash("pw").unwrap();
        assert!(weak.verify("pw", &phc));
    }

    #[test]
    fn rejects_unbounded_cost() {
        let err = PasswordHasher::new(HashCost { m_cost_kib: MAX_M_COST_KIB + 1, t_cost: 1, p_cost: 1 });
        assert!(matches!(err, Err(HashError::Params(_))));
        assert!(PasswordHasher::new(HashCost { m_cost_kib: 8, t_cost: 0, p_cost: 1 }).is_err());
    }
}
