/// Authentication module
///
/// Handles password hashing, JWT issuance and verification, refresh
/// sessions, login rate limiting and the session cookies.

mod claims;
mod client_info;
mod cookies;
mod jwt;
mod password;
mod rate_limit;
mod service;
mod session;

pub use claims::{Claims, TokenKind, CLAIMS_VERSION};
pub use client_info::ClientInfo;
pub use cookies::{CookieFactory, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};
pub use jwt::{
    TokenIssuer, TokenPair, TokenVerification, ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS,
};
pub use password::{
    dummy_verify, hash_password, validate_password_strength, verify_password, Credential,
};
pub use rate_limit::{login_identifier, CounterStore, InMemoryCounterStore, RateLimitRecord, RateLimiter};
pub use service::AuthService;
pub use session::{hash_token, SessionService};
