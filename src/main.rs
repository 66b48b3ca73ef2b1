use reseller_auth::configuration::get_configuration;
use reseller_auth::startup::{run, spawn_maintenance};
use reseller_auth::state::AppState;
use reseller_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    // A missing or short signing secret stops the process here
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read configuration");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create connection pool");
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;
    tracing::info!("Database connection pool created successfully");

    if configuration.database.migrate_on_startup {
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to apply migrations");
            std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
        })?;
        tracing::info!("Migrations applied");
    }

    let state = AppState::postgres(pool, &configuration).map_err(|e| {
        tracing::error!(error = %e, "Failed to build application state");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(
        address = %address,
        environment = ?configuration.application.environment,
        "Server listening"
    );

    let _maintenance = spawn_maintenance(
        state.clone(),
        Duration::from_secs(configuration.rate_limit.sweep_interval_seconds),
    );

    run(listener, state)?.await
}
