use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use sitepulse_server::state::AppState;

/// `sitepulse health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$SITEPULSE_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("SITEPULSE_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Health-check subcommand — handled before runtime setup so the binary
    // stays fast when used as a Docker HEALTHCHECK probe.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitepulse=info".parse()?),
        )
        .json()
        .init();

    let cfg = sitepulse_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // The event, aggregate and definition stores all live under data_dir.
    std::fs::create_dir_all(&cfg.data_dir)?;

    let state = Arc::new(AppState::new(cfg.clone()));

    // Background delivery of scheduled reports.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            sitepulse_server::scheduler::run_scheduler_loop(state).await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = sitepulse_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, data_dir = %cfg.data_dir, "SitePulse listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
