use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::time::Duration;

use crate::logger::RequestLogger;
use crate::middleware::AuthMiddleware;
use crate::routes::{
    change_password, health_check, login, logout, logout_all, me, recent_audit, refresh, register,
};
use crate::state::AppState;

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let state_data = web::Data::new(state.clone());

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(RequestLogger)

            // Shared state
            .app_data(state_data.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))

            // Administrator routes; registered before `/api` so the wider
            // scope does not shadow them
            .service(
                web::scope("/api/admin")
                    .wrap(
                        AuthMiddleware::new(state.clone())
                            .require_admin()
                            .require_verified_email(),
                    )
                    .route("/audit", web::get().to(recent_audit)),
            )

            // Signed-in routes
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(state.clone()))
                    .route("/me", web::get().to(me))
                    .route("/me/password", web::post().to(change_password))
                    .route("/me/logout-all", web::post().to(logout_all)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Periodically evict expired rate-limit windows and purge expired sessions
///
/// Neither is needed for correctness; both stores also check expiry on read.
pub fn spawn_maintenance(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;

            match state.auth.limiter().sweep().await {
                Ok(evicted) => tracing::debug!(evicted = evicted, "Rate limit windows swept"),
                Err(e) => tracing::warn!(error = %e, "Rate limit sweep failed"),
            }
            match state.auth.sessions().purge_expired().await {
                Ok(purged) => tracing::debug!(purged = purged, "Expired sessions purged"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    })
}
