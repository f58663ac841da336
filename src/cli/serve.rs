//! HTTP server command

use super::helpers::{load_config, open_workspace};
use focal_core::{error::Result, ApiServer, ApiServerConfig, SubscriptionHub};
use std::path::PathBuf;
use tracing::debug;

/// Handle `focal serve`
pub async fn handle(root: Option<PathBuf>, addr: Option<String>, token: Option<String>) -> Result<()> {
    let config = load_config(root, addr, token)?;
    let hub = SubscriptionHub::new(config.channel_capacity);
    let (store, _watcher) = open_workspace(&config, &hub)?;

    let server_config = ApiServerConfig {
        addr: config.socket_addr()?,
        io_timeout: config.io_timeout(),
        auth_token: config.auth_token.clone(),
        session_idle: config.session_idle(),
    };
    debug!("Starting HTTP server with {:?}", server_config.addr);

    ApiServer::new(server_config, store, hub).serve().await?;
    Ok(())
}
