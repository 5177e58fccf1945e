use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qratt::attendance::{AttendanceService, QrTokenSigner};
use qratt::clock::SystemClock;
use qratt::config::AppConfig;
use qratt::db::AttendanceDb;
use qratt::server::create_router;
use qratt::types::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow!("{e}")).context("Failed to load configuration")?;
    init_logging(&config.log_filter);

    let db = AttendanceDb::open(&config.database_path)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    let signer = QrTokenSigner::new(config.site_secret.as_deref());
    if signer.uses_default_secret() {
        warn!("No site_secret configured; QR tokens use the built-in fallback secret");
    }

    let service = AttendanceService::new(db, Arc::new(SystemClock), signer, &config.base_url);
    let addr = config.bind_address();
    let app_state = Arc::new(AppState { service, config });
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server crashed")?;

    info!("Server stopped");
    Ok(())
}

fn init_logging(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
