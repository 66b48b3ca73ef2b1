/// Shared application state
///
/// One `AppState` is built at startup and cloned into every worker through
/// `web::Data`. Storage backends are chosen here and nowhere else.

use sqlx::PgPool;
use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::auth::{
    AuthService, CookieFactory, InMemoryCounterStore, RateLimiter, SessionService, TokenIssuer,
};
use crate::clock::{Clock, SystemClock};
use crate::configuration::Settings;
use crate::error::ConfigError;
use crate::storage::{
    AuditSink, InMemoryAuditSink, InMemorySessionStore, InMemoryUserStore, PgAuditSink,
    PgSessionStore, PgUserStore, SessionStore, UserStore,
};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub cookies: CookieFactory,
}

/// Handles to the in-memory stores behind an `AppState`
pub struct InMemoryBackends {
    pub users: Arc<InMemoryUserStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub audit: Arc<InMemoryAuditSink>,
}

impl AppState {
    fn assemble(
        settings: &Settings,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenIssuer::new(&settings.jwt, clock.clone())?;
        let session_service =
            SessionService::new(sessions, users.clone(), tokens.clone(), clock.clone());
        let limiter = RateLimiter::new(
            Arc::new(InMemoryCounterStore::new(clock.clone())),
            &settings.rate_limit,
        );
        let audit = AuditLogger::new(audit, clock);

        Ok(Self {
            auth: Arc::new(AuthService::new(
                users,
                session_service,
                tokens,
                limiter,
                audit,
            )),
            cookies: CookieFactory::new(settings.application.environment.secure_cookies()),
        })
    }

    /// Postgres-backed state for a running server
    ///
    /// # Errors
    /// Returns `ConfigError` if the signing settings are unusable
    pub fn postgres(pool: PgPool, settings: &Settings) -> Result<Self, ConfigError> {
        Self::assemble(
            settings,
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgSessionStore::new(pool.clone())),
            Arc::new(PgAuditSink::new(pool)),
            Arc::new(SystemClock),
        )
    }

    /// Fully in-process state, returned with handles to its stores
    pub fn in_memory(
        settings: &Settings,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, InMemoryBackends), ConfigError> {
        let backends = InMemoryBackends {
            users: Arc::new(InMemoryUserStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            audit: Arc::new(InMemoryAuditSink::new()),
        };
        let state = Self::assemble(
            settings,
            backends.users.clone(),
            backends.sessions.clone(),
            backends.audit.clone(),
            clock,
        )?;
        Ok((state, backends))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_secret_prevents_state_construction() {
        let mut settings = test_support::settings();
        settings.jwt.secret = String::new();

        let result = AppState::in_memory(&settings, Arc::new(SystemClock));

        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_production_uses_secure_cookies() {
        let mut settings = test_support::settings();
        settings.application.environment = crate::configuration::Environment::Production;

        let (state, _) = AppState::in_memory(&settings, Arc::new(SystemClock)).unwrap();

        assert_eq!(state.cookies.access("t").secure(), Some(true));
    }
}
