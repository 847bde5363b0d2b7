use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use auth::Authenticator;
use chrono::Utc;
use session_service::config::Config;
use session_service::inbound::http::router::create_router;
use session_service::outbound::email::SmtpEmailSender;
use session_service::outbound::repositories::PostgresSessionRepository;
use session_service::outbound::repositories::PostgresUserRepository;
use session_service::session::ports::SessionRepository;
use session_service::session::service::SessionService;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "session-service",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        http_port = config.server.http_port,
        jwt_issuer = %config.jwt.issuer,
        jwt_audience = %config.jwt.audience,
        refresh_reuse_grace_secs = config.session.refresh_reuse_grace_secs,
        smtp_host = %config.email.smtp_host,
        "Configuration loaded"
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await?;
    tracing::info!(
        max_connections = 5,
        database = "postgresql",
        "Database connection pool created"
    );

    sqlx::migrate!("./migrations").run(&pg_pool).await?;
    tracing::info!(database = "postgresql", "Database migrations completed");

    let authenticator = Arc::new(Authenticator::new(
        config.jwt.secret.as_bytes(),
        &config.jwt.issuer,
        &config.jwt.audience,
        config.token_lifetimes(),
    ));
    let user_repository = Arc::new(PostgresUserRepository::new(pg_pool.clone()));
    let session_repository = Arc::new(PostgresSessionRepository::new(pg_pool));
    let email_sender = Arc::new(SmtpEmailSender::new(&config.email)?);

    let session_service = Arc::new(SessionService::new(
        user_repository,
        Arc::clone(&session_repository),
        email_sender,
        authenticator,
        config.session_policy(),
    ));

    let sweep_interval = Duration::from_secs(config.session.expiry_sweep_interval_secs.max(1));
    let sweeper = tokio::spawn(sweep_expired_sessions(session_repository, sweep_interval));
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Expired session sweep scheduled"
    );

    let http_address = format!("0.0.0.0:{}", config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_address).await?;
    tracing::info!(
        address = %http_address,
        port = config.server.http_port,
        protocol = "http",
        "Http server listening"
    );

    let http_application = create_router(session_service);
    axum::serve(
        http_listener,
        http_application.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    sweeper.abort();
    tracing::info!("Server exited");

    Ok(())
}

/// Periodically erase sessions past their expiry.
///
/// Expired sessions are already refused everywhere; this only bounds storage.
async fn sweep_expired_sessions<SR: SessionRepository>(sessions: Arc<SR>, every: Duration) {
    let mut ticker = tokio::time::interval(every);

    loop {
        ticker.tick().await;

        match sessions.delete_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted = deleted, "Expired sessions erased"),
            Err(e) => tracing::error!(error = %e, "Expired session sweep failed"),
        }
    }
}
