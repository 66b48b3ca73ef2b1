/// Access Token Middleware
///
/// Reads the access token from its cookie, resolves the user it names and
/// applies the route's access policy. Authorized requests carry an
/// `AuthenticatedUser` in their extensions; every other request is answered
/// here with 401 or 403. This layer never refreshes tokens.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use serde_json::json;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::auth::{ClientInfo, TokenIssuer, TokenVerification, ACCESS_COOKIE_NAME};
use crate::error::{AppError, AuthError};
use crate::state::AppState;
use crate::storage::{AuditEventType, User, UserStore};

/// What a protected scope demands beyond a valid access token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub require_admin: bool,
    pub require_verified_email: bool,
}

/// The user resolved for the current request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn user(&self) -> &User {
        &self.0
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Auth(AuthError::MissingToken)),
        )
    }
}

/// Resolve an access token to a user allowed by `policy`
///
/// # Errors
/// - `MissingToken`, `TokenInvalid`, `TokenExpired`, `UserNotFound`
///   (all 401)
/// - `NotAdministrator`, `EmailNotVerified` (403)
/// - Storage errors from the user lookup
pub async fn authorize(
    token: Option<&str>,
    policy: &AccessPolicy,
    tokens: &TokenIssuer,
    users: &dyn UserStore,
) -> Result<AuthenticatedUser, AppError> {
    let token = token.ok_or(AuthError::MissingToken)?;

    let claims = match tokens.verify_access(token) {
        TokenVerification::Verified(claims) => claims,
        TokenVerification::Invalid => return Err(AuthError::TokenInvalid.into()),
        TokenVerification::Expired => return Err(AuthError::TokenExpired.into()),
    };

    let user = users
        .find_by_id(claims.user_id()?)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    // Flags come from the stored account, not from the token
    if policy.require_admin && !user.is_admin {
        return Err(AuthError::NotAdministrator.into());
    }
    if policy.require_verified_email && !user.email_verified {
        return Err(AuthError::EmailNotVerified.into());
    }

    Ok(AuthenticatedUser(user))
}

pub struct AuthMiddleware {
    state: AppState,
    policy: AccessPolicy,
}

impl AuthMiddleware {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            policy: AccessPolicy::default(),
        }
    }

    pub fn require_admin(mut self) -> Self {
        self.policy.require_admin = true;
        self
    }

    pub fn require_verified_email(mut self) -> Self {
        self.policy.require_verified_email = true;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            state: self.state.clone(),
            policy: self.policy,
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    state: AppState,
    policy: AccessPolicy,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .cookie(ACCESS_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string());
        let service = self.service.clone();
        let state = self.state.clone();
        let policy = self.policy;

        Box::pin(async move {
            let tokens = state.auth.tokens();
            match authorize(token.as_deref(), &policy, tokens, state.auth.users()).await {
                Ok(user) => {
                    tracing::debug!(user_id = %user.0.id, path = %req.path(), "Request authorized");
                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(err) => {
                    if let AppError::Auth(reason) = &err {
                        if reason.is_forbidden() {
                            let user_id = token
                                .as_deref()
                                .and_then(|t| tokens.verify_access(t).into_claims())
                                .and_then(|claims| claims.user_id().ok());
                            state
                                .auth
                                .audit()
                                .record(
                                    AuditEventType::AccessDenied,
                                    user_id,
                                    &ClientInfo::from_request(req.request()),
                                    Some(json!({ "path": req.path(), "reason": reason.to_string() })),
                                )
                                .await;
                        }
                    }
                    tracing::warn!(path = %req.path(), error = %err, "Request rejected by access policy");
                    Ok(req.error_response(err).map_into_right_body())
                }
            }
        })
    }
}
