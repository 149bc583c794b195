use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use gdd_lib::config::AppConfig;
use gdd_lib::server::{start_server, ServerState};
use gdd_lib::sync::remote::MemoryRowStore;

/// Run the reference sync server until Ctrl-C
pub async fn run(config_path: Option<&Path>, bind: Option<&str>) -> Result<()> {
    let config = AppConfig::load(config_path).context("Failed to load config")?;
    let bind = bind.unwrap_or(&config.server.bind);

    if config.server.sessions.is_empty() {
        log::warn!("Sync server: no sessions configured, every request will be unauthenticated");
    }

    let state = ServerState::new(Arc::new(MemoryRowStore::new()), config.server.sessions.clone());
    let mut server = start_server(bind, state)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    println!("Serving on {}", server.base_url());
    println!("  sync endpoint: {}/api/projects/sync", server.base_url());
    println!("  table API:     {}/rest/v1", server.base_url());
    println!("  auth:          {}/auth/v1", server.base_url());

    tokio::signal::ctrl_c().await?;
    server.stop();
    server.wait().await;
    Ok(())
}
