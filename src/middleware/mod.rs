mod auth;
mod error_handler;
pub mod rate_limit;
mod security;

pub use auth::{Claims, Identity, IdentityProvider, JwtIdentityProvider};
pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, annotate_headers};
pub use security::{RouteGuard, Security, SecurityOptions, security, with_security};
