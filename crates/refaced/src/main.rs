use anyhow::Result;
use tracing_subscriber::EnvFilter;

use reface_core::provision::Provisioner;
use reface_core::staging::Stager;

mod config;
mod engine;
mod http_api;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("refaced starting");

    let config = Config::from_env();
    tracing::info!(
        work_dir = %config.work_dir.display(),
        tool_dir = %config.tool_dir.display(),
        execution_provider = %config.execution_provider,
        "configuration loaded"
    );

    // Best-effort setup: failed steps are recorded and served on /api/status,
    // and the daemon starts regardless.
    let report = Provisioner::new(config.provision_settings()).run().await;
    if !report.is_clean() {
        tracing::warn!("provisioning finished with failures, requests may fail at tool invocation");
    }

    let engine = engine::spawn_engine(Box::new(config.swap_tool()));
    let state = http_api::AppState::new(&config, engine, Stager::new(), report);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "refaced ready");

    axum::serve(listener, http_api::app_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("refaced shutting down");
    Ok(())
}
