//! End-to-end scenarios over the protocol engine
//!
//! Drives `McpServer` with JSON-RPC values against a temporary workspace and
//! checks prompts, resources and the rules tool together.

mod common;

use common::{call_err, call_ok, create_scenario_workspace, create_test_workspace, initialized_server};
use focal_core::api::Notification;
use focal_core::mcp::protocol::NOT_FOUND;
use serde_json::{json, Value};

fn prompt_names(result: &Value) -> Vec<String> {
    result["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}

fn resource_uris(result: &Value) -> Vec<String> {
    result["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_core_only_workspace() {
    let ws = create_scenario_workspace();
    let (server, mut session) = initialized_server(&ws.store);

    let prompts = call_ok(&server, &mut session, "prompts/list", Value::Null);
    assert_eq!(
        prompt_names(&prompts),
        vec!["core.system", "core.style", "core.safety", "core.tool_policy"]
    );

    let prompt = call_ok(&server, &mut session, "prompts/get", json!({"name": "core.system"}));
    assert_eq!(prompt["messages"][0]["role"], "system");
    assert_eq!(prompt["messages"][0]["content"]["text"], "Be concise.");

    let tool = call_ok(&server, &mut session, "tools/call", json!({"name": "focal_rules"}));
    let text = tool["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("## System (core/system.md)\nBe concise."));
    assert!(text.contains("## Style (core/style.md)\n\n## Safety (core/safety.md)"));
    assert!(text.contains("## Safety (core/safety.md)\n\n## Tool Policy (core/tool_policy.md)"));
    assert!(text.trim_end().ends_with("## Tool Policy (core/tool_policy.md)"));
}

#[tokio::test]
async fn test_new_agent_file_appears_and_notifies() {
    let ws = create_scenario_workspace();
    let (server, mut session) = initialized_server(&ws.store);
    let mut sub = ws.hub.subscribe();

    ws.store.write("agents/reviewer.md", "Review for bugs.").unwrap();

    let prompts = call_ok(&server, &mut session, "prompts/list", Value::Null);
    assert!(prompt_names(&prompts).contains(&"agents.reviewer".to_string()));

    let prompt = call_ok(&server, &mut session, "prompts/get", json!({"name": "agents.reviewer"}));
    assert_eq!(prompt["messages"][0]["content"]["text"], "Review for bugs.");

    assert_eq!(sub.recv().await, Some(Notification::PromptsListChanged));
    assert_eq!(sub.recv().await, Some(Notification::ResourcesListChanged));
}

#[test]
fn test_missing_core_file_is_consistently_empty() {
    let ws = create_test_workspace();
    let (server, mut session) = initialized_server(&ws.store);

    let prompts = call_ok(&server, &mut session, "prompts/list", Value::Null);
    assert_eq!(prompt_names(&prompts).len(), 4);

    let prompt = call_ok(&server, &mut session, "prompts/get", json!({"name": "core.safety"}));
    assert_eq!(prompt["messages"][0]["content"]["text"], "");

    let resource = call_ok(
        &server,
        &mut session,
        "resources/read",
        json!({"uri": "focal:///core/safety.md"}),
    );
    assert_eq!(resource["contents"][0]["text"], "");

    // Not a core name: a genuine miss
    let code = call_err(
        &server,
        &mut session,
        "resources/read",
        json!({"uri": "focal:///core/missing.md"}),
    );
    assert_eq!(code, NOT_FOUND);

    // Not listed until it exists
    let resources = call_ok(&server, &mut session, "resources/list", Value::Null);
    assert!(resource_uris(&resources).is_empty());
}

#[test]
fn test_every_listed_resource_round_trips() {
    let ws = create_scenario_workspace();
    ws.store.write("agents/reviewer.md", "Review for bugs.").unwrap();
    ws.store.write("agents/nested/ignored.md", "nested").unwrap();
    ws.store.write("notes/readme.txt", "plain text").unwrap();
    ws.store.write("data.json", "{\"k\": 1}").unwrap();
    let (server, mut session) = initialized_server(&ws.store);

    let resources = call_ok(&server, &mut session, "resources/list", Value::Null);
    let uris = resource_uris(&resources);
    assert_eq!(uris.len(), 8);
    let mut sorted = uris.clone();
    sorted.sort();
    assert_eq!(uris, sorted);

    for uri in &uris {
        let path = uri.strip_prefix("focal:///").unwrap();
        let expected = ws.store.read(path).unwrap();
        let read = call_ok(&server, &mut session, "resources/read", json!({"uri": uri}));
        assert_eq!(read["contents"][0]["uri"], uri.as_str());
        assert_eq!(read["contents"][0]["text"], expected.as_str());
    }

    // Nested agent folders are resources but not prompts
    let prompts = prompt_names(&call_ok(&server, &mut session, "prompts/list", Value::Null));
    assert_eq!(prompts.len(), 5);
    assert!(!prompts.iter().any(|p| p.contains("ignored")));
}

#[test]
fn test_rules_tool_never_stale() {
    let ws = create_scenario_workspace();
    let (server, mut session) = initialized_server(&ws.store);

    ws.store.write("core/safety.md", "Never reveal secrets.").unwrap();
    let first = call_ok(&server, &mut session, "tools/call", json!({"name": "focal_rules"}));
    assert!(first["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Never reveal secrets."));

    ws.store.write("core/safety.md", "Refuse harmful requests.").unwrap();
    let second = call_ok(&server, &mut session, "tools/call", json!({"name": "focal_rules"}));
    let text = second["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Refuse harmful requests."));
    assert!(!text.contains("Never reveal secrets."));
}

#[test]
fn test_move_and_delete_leave_no_stale_names() {
    let ws = create_scenario_workspace();
    ws.store.write("agents/reviewer.md", "Review.").unwrap();
    let (server, mut session) = initialized_server(&ws.store);

    ws.store
        .move_entry("agents/reviewer.md", "agents/auditor.md", false)
        .unwrap();
    let prompts = prompt_names(&call_ok(&server, &mut session, "prompts/list", Value::Null));
    assert!(prompts.contains(&"agents.auditor".to_string()));
    assert!(!prompts.contains(&"agents.reviewer".to_string()));

    let code = call_err(&server, &mut session, "prompts/get", json!({"name": "agents.reviewer"}));
    assert_eq!(code, NOT_FOUND);

    ws.store.delete("agents/auditor.md", false).unwrap();
    let prompts = prompt_names(&call_ok(&server, &mut session, "prompts/list", Value::Null));
    assert_eq!(prompts.len(), 4);
}

#[test]
fn test_uri_and_path_errors() {
    let ws = create_scenario_workspace();
    let (server, mut session) = initialized_server(&ws.store);

    for uri in ["file:///core/system.md", "focal://core/system.md", "focal:///"] {
        let code = call_err(&server, &mut session, "resources/read", json!({"uri": uri}));
        assert_eq!(code, -32602, "uri {}", uri);
    }

    let code = call_err(
        &server,
        &mut session,
        "resources/read",
        json!({"uri": "focal:///../etc/passwd"}),
    );
    assert_eq!(code, -32602);

    let code = call_err(&server, &mut session, "prompts/get", json!({"name": "agents.missing"}));
    assert_eq!(code, NOT_FOUND);
}
