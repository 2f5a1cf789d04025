use std::sync::Arc;

use mentor_gate::app::App;
use mentor_gate::config::{GateConfig, ServerConfig};
use mentor_gate::error::Result;
use mentor_gate::store::LibSqlBackend;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let gate_config = GateConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    eprintln!("🔐 Mentor Gate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Product: {}", gate_config.product);
    eprintln!("   API: http://0.0.0.0:{}/api", server_config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .inspect_err(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    server_config.db_path.display(),
                    e
                );
            })?,
    );
    eprintln!("   Database: {}", server_config.db_path.display());

    // ── Auth runtime + routes ───────────────────────────────────────────
    let app = App::start(gate_config, db.clone(), db);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port)).await?;
    tracing::info!(port = server_config.port, "HTTP server started");

    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
