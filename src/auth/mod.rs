mod helpers;
mod middleware;
mod token;

pub use helpers::{ADMIN_ROLE, AuthUser, AuthVerifier, TokenVerifier, USER_ROLE, extract_bearer_token};
pub use middleware::{AuthError, MaybeUser, RequireAdmin, RequireUser};
pub use token::{TokenGenerator, parse_token};
