//! Shared helper functions for CLI commands

use focal_core::{
    error::Result, ConfigOverrides, FocalConfig, SubscriptionHub, WorkspaceStore,
    WorkspaceWatcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Resolve configuration from defaults, file, environment and flags
pub fn load_config(
    root: Option<PathBuf>,
    addr: Option<String>,
    token: Option<String>,
) -> Result<FocalConfig> {
    let config = FocalConfig::load(ConfigOverrides {
        workspace_root: root,
        addr,
        auth_token: token,
    })?;
    debug!("Workspace root: {}", config.workspace_root.display());
    Ok(config)
}

/// Open the workspace wired to `hub`, seeding the layout on first use
///
/// Changes made by other processes reach `hub` through the returned
/// watcher, which must stay alive as long as the server runs.
pub fn open_workspace(
    config: &FocalConfig,
    hub: &SubscriptionHub,
) -> Result<(WorkspaceStore, WorkspaceWatcher)> {
    let store = WorkspaceStore::open(&config.workspace_root)?;
    // Seed before watching: seeding is not announced
    store.ensure_layout()?;

    WorkspaceWatcher::start(store, Arc::new(hub.clone()), config.watch_debounce())
}
