/// Middleware module
///
/// Access token authorization for protected scopes.

mod auth_middleware;

pub use auth_middleware::{authorize, AccessPolicy, AuthMiddleware, AuthenticatedUser};
