//! Workspace initialization command

use super::helpers::load_config;
use focal_core::{error::Result, WorkspaceStore};
use std::path::PathBuf;
use tracing::debug;

/// Handle `focal init`
pub async fn handle(root: Option<PathBuf>) -> Result<()> {
    let config = load_config(root, None, None)?;
    debug!("Initializing workspace...");

    let store = WorkspaceStore::open(&config.workspace_root)?;
    let created = store.ensure_layout()?;

    println!("Workspace: {}", store.root().display());
    if created.is_empty() {
        println!("Layout already complete, nothing to do");
    } else {
        for path in created {
            println!("  created {}", path);
        }
    }
    Ok(())
}
