/// Authentication Routes
///
/// Registration, login, refresh rotation, logout and the signed-in account
/// endpoints. Tokens only ever travel in cookies; bodies carry user data.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{ClientInfo, REFRESH_COOKIE_NAME};
use crate::error::{AppError, ErrorContext};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;
use crate::storage::User;

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Public view of an account
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            email_verified: user.email_verified,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutAllResponse {
    pub revoked_sessions: u64,
}

fn refresh_cookie(req: &HttpRequest) -> Option<String> {
    req.cookie(REFRESH_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn logged<T>(context: &ErrorContext, result: Result<T, AppError>) -> Result<T, AppError> {
    if let Err(e) = &result {
        context.log_error(e);
    }
    result
}

/// POST /auth/register
///
/// Create an account. The new account is unverified and not signed in.
///
/// # Errors
/// - 400: Validation errors (name, email or weak password)
/// - 409: Email already registered
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");
    let client = ClientInfo::from_request(&req);

    let user = logged(
        &context,
        state
            .auth
            .register(&form.full_name, &form.email, &form.password, &client)
            .await,
    )?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}

/// POST /auth/login
///
/// Verify credentials and set both session cookies.
///
/// # Errors
/// - 401: Unknown email or wrong password (indistinguishable)
/// - 429: Too many attempts for this email in the current window
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");
    let client = ClientInfo::from_request(&req);

    let (user, pair) = logged(
        &context,
        state.auth.login(&form.email, &form.password, &client).await,
    )?;

    let mut response = HttpResponse::Ok();
    state.cookies.set_pair(&mut response, &pair);
    Ok(response.json(UserResponse::from(&user)))
}

/// POST /auth/refresh
///
/// Rotate the refresh cookie: the presented session is revoked and a new
/// pair is issued. Presenting an already rotated token fails.
///
/// # Errors
/// - 401: Missing, invalid, expired, revoked or reused refresh token
pub async fn refresh(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");
    let client = ClientInfo::from_request(&req);
    let token = refresh_cookie(&req);

    let (user, pair) = logged(
        &context,
        state.auth.refresh(token.as_deref(), &client).await,
    )?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "Token refreshed successfully"
    );

    let mut response = HttpResponse::Ok();
    state.cookies.set_pair(&mut response, &pair);
    Ok(response.json(UserResponse::from(&user)))
}

/// POST /auth/logout
///
/// Always succeeds and always clears both cookies.
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout");
    let client = ClientInfo::from_request(&req);
    let token = refresh_cookie(&req);

    logged(&context, state.auth.logout(token.as_deref(), &client).await)?;

    let mut response = HttpResponse::NoContent();
    state.cookies.clear(&mut response);
    Ok(response.finish())
}

/// GET /api/me
pub async fn me(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(UserResponse::from(user.user()))
}

/// POST /api/me/password
///
/// Every session of the account is revoked, this one included.
///
/// # Errors
/// - 400: Weak new password
/// - 401: Current password does not verify
pub async fn change_password(
    req: HttpRequest,
    user: AuthenticatedUser,
    form: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("password_change").with_user_id(user.user().id.to_string());
    let client = ClientInfo::from_request(&req);

    logged(
        &context,
        state
            .auth
            .change_password(user.user(), &form.current_password, &form.new_password, &client)
            .await,
    )?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.user().id,
        "Password changed"
    );

    let mut response = HttpResponse::NoContent();
    state.cookies.clear(&mut response);
    Ok(response.finish())
}

/// POST /api/me/logout-all
pub async fn logout_all(
    req: HttpRequest,
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout_all").with_user_id(user.user().id.to_string());
    let client = ClientInfo::from_request(&req);

    let revoked_sessions = logged(&context, state.auth.logout_all(user.user(), &client).await)?;

    let mut response = HttpResponse::Ok();
    state.cookies.clear(&mut response);
    Ok(response.json(LogoutAllResponse { revoked_sessions }))
}
