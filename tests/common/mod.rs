//! Common test utilities and helpers

#![allow(dead_code)]

use focal_core::{McpServer, SessionState, SubscriptionHub, WorkspaceStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Isolated workspace whose mutations feed a hub
pub struct TestWorkspace {
    pub temp: TempDir,
    pub store: WorkspaceStore,
    pub hub: SubscriptionHub,
}

/// Empty workspace in a temporary directory
pub fn create_test_workspace() -> TestWorkspace {
    let temp = TempDir::new().unwrap();
    let hub = SubscriptionHub::new(16);
    let store = WorkspaceStore::open(temp.path())
        .unwrap()
        .with_observer(Arc::new(hub.clone()));
    TestWorkspace { temp, store, hub }
}

/// Workspace with `core/system.md` = "Be concise." and the other core files empty
pub fn create_scenario_workspace() -> TestWorkspace {
    let ws = create_test_workspace();
    ws.store.write("core/system.md", "Be concise.").unwrap();
    ws.store.write("core/style.md", "").unwrap();
    ws.store.write("core/safety.md", "").unwrap();
    ws.store.write("core/tool_policy.md", "").unwrap();
    ws
}

/// Server plus an already-initialized session
pub fn initialized_server(store: &WorkspaceStore) -> (McpServer, SessionState) {
    let server = McpServer::new(store.clone());
    let mut session = SessionState::default();
    let response = server
        .process_value(
            &mut session,
            json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}}),
        )
        .unwrap();
    assert!(response.error.is_none(), "initialize failed: {:?}", response.error);
    (server, session)
}

/// Call a method and return its result, panicking on a JSON-RPC error
pub fn call_ok(server: &McpServer, session: &mut SessionState, method: &str, params: Value) -> Value {
    let response = server
        .process_value(
            session,
            json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}),
        )
        .unwrap();
    if let Some(error) = response.error {
        panic!("{} failed: {:?}", method, error);
    }
    response.result.unwrap()
}

/// Call a method and return its JSON-RPC error code
pub fn call_err(server: &McpServer, session: &mut SessionState, method: &str, params: Value) -> i32 {
    let response = server
        .process_value(
            session,
            json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}),
        )
        .unwrap();
    response
        .error
        .unwrap_or_else(|| panic!("{} unexpectedly succeeded", method))
        .code
}
