mod jwt;
mod middleware;
pub mod password;
mod session;

pub use jwt::{
    ACCESS_TOKEN_TTL_SECONDS, JwtError, JwtService, REFRESH_TOKEN_TTL_DAYS, TokenPair,
};
pub use middleware::{
    ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, RequestContext, require_session,
};
pub use session::{AuthError, AuthService};
