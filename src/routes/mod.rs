mod admin;
mod auth;
mod health_check;

pub use admin::{recent_audit, AuditQuery};
pub use auth::{
    change_password, login, logout, logout_all, me, refresh, register, ChangePasswordRequest,
    LoginRequest, LogoutAllResponse, RegisterRequest, UserResponse,
};
pub use health_check::health_check;
