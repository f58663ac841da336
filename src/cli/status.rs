//! Workspace status command

use super::helpers::load_config;
use focal_core::{error::Result, Namespaces, RulesAggregator, WorkspaceStore};
use std::path::PathBuf;

/// Handle `focal status`
pub async fn handle(root: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(root, None, None)?;
    let store = WorkspaceStore::open(&config.workspace_root)?;
    let namespaces = Namespaces::new(store.clone());

    let bundle = RulesAggregator::new(store.clone()).build_bundle()?;
    let prompts = namespaces.list_prompts()?;
    let resources = namespaces.list_resources()?;

    if json {
        let status = serde_json::json!({
            "workspaceRoot": store.root().display().to_string(),
            "fingerprint": bundle.fingerprint,
            "prompts": prompts,
            "resources": resources.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Workspace: {}", store.root().display());
    println!("{}", bundle.header());
    println!();
    println!("Prompts ({}):", prompts.len());
    for prompt in &prompts {
        println!("  {:<24} {}", prompt.name, prompt.description);
    }
    println!();
    println!("Resources: {}", resources.len());
    Ok(())
}
