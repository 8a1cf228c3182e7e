//! Stateless HS256 bearer tokens.
//!
//! Tokens carry `{account_id, role, iat, exp}` and are valid for 24 hours.
//! There is no revocation list; expiry is the only invalidation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::principal::{Principal, Role};

pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("missing token")]
    Missing,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub account_id: i32,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    /// The secret comes from configuration; there is no built-in fallback.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, account_id: i32, role: Role) -> Result<String, TokenError> {
        self.issue_at(account_id, role, Utc::now())
    }

    pub fn issue_at(&self, account_id: i32, role: Role, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            account_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// `None` or an empty string is `Missing`; everything else that fails is
    /// `Expired` or `Invalid`.
    pub fn validate(&self, token: Option<&str>) -> Result<Principal, TokenError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(TokenError::Missing)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;
        Ok(Principal { account_id: data.claims.account_id, role: data.claims.role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService { TokenService::new(b"test-secret-key-for-testing-only") }

    #[test]
    fn issue_and_validate() {
        let svc = service();
        let token = svc.issue(42, Role::Moderador).unwrap();
        let p = svc.validate(Some(&token)).unwrap();
        assert_eq!(p, Principal { account_id: 42, role: Role::Moderador });
    }

    #[test]
    fn expiry_is_24_hours_from_issue() {
        let svc = service();
        let now = Utc::now();
        let token = svc.issue_at(1, Role::Usuario, now).unwrap();
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = false;
        let claims = decode::<Claims>(&token, &DecodingKey::from_secret(b"test-secret-key-for-testing-only"), &v)
            .unwrap()
            .claims;
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert_eq!(claims.iat, now.timestamp());
    }

    #[test]
    fn missing_is_distinct_from_invalid() {
        let svc = service();
        assert_eq!(svc.validate(None), Err(TokenError::Missing));
        assert_eq!(svc.validate(Some("   ")), Err(TokenError::Missing));
        assert!(matches!(svc.validate(Some("not.a.jwt")), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service();
        let issued = Utc::now() - Duration::hours(TOKEN_TTL_HOURS) - Duration::seconds(5);
        let token = svc.issue_at(7, Role::Admin, issued).unwrap();
        assert_eq!(svc.validate(Some(&token)), Err(TokenError::Expired));
    }

    #[test]
    fn custom_ttl_governs_expiry() {
        let short = service().with_ttl(Duration::seconds(-5));
        let token = short.issue(7, Role::Usuario).unwrap();
        assert_eq!(short.validate(Some(&token)), Err(TokenError::Expired));
        let long = service().with_ttl(Duration::hours(48));
        let token = long.issue_at(7, Role::Usuario, Utc::now() - Duration::hours(30)).unwrap();
        assert!(long.validate(Some(&token)).is_ok());
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = service().issue(7, Role::Admin).unwrap();
        let other = TokenService::new(b"another-secret");
        assert!(matches!(other.validate(Some(&token)), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn unknown_role_claim_is_invalid() {
        #[derive(Serialize)]
        struct Forged { account_id: i32, role: &'static str, iat: i64, exp: i64 }
        let now = Utc::now().timestamp();
        let forged = Forged { account_id: 1, role: "root", iat: now, exp: now + 60 };
        let token = encode(&Header::default(), &forged, &EncodingKey::from_secret(b"test-secret-key-for-testing-only")).unwrap();
        assert!(matches!(service().validate(Some(&token)), Err(TokenError::Invalid(_))));
    }
}
