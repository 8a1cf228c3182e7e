//! Identity: roles, password-backed login, bearer tokens, the request gate,
//! field-level authorization and the superuser login streak.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod provider;
mod gate;
pub mod authorizer;
pub mod streak;

pub use principal::{Principal, Role, UnknownRole};
pub use token::{Claims, TokenError, TokenService, TOKEN_TTL_HOURS};
pub use provider::{AuthProvider, LoginRequest, LoginResponse, Registration};
pub use gate::{bearer_token, require_token};
pub use streak::StreakOutcome;
