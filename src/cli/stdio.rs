//! stdio MCP server command

use super::helpers::{load_config, open_workspace};
use focal_core::{error::Result, McpServer, SubscriptionHub};
use std::path::PathBuf;

/// Handle `focal stdio`
///
/// stdout carries protocol traffic only; logs go to stderr.
pub async fn handle(root: Option<PathBuf>) -> Result<()> {
    let config = load_config(root, None, None)?;
    let hub = SubscriptionHub::new(config.channel_capacity);
    let (store, _watcher) = open_workspace(&config, &hub)?;

    McpServer::new(store).run_stdio(&hub).await
}
