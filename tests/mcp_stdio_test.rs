//! MCP over a newline-delimited stream
//!
//! Runs `McpServer::serve` on an in-memory duplex pipe, the same code path
//! the stdio transport uses.

mod common;

use common::create_scenario_workspace;
use focal_core::mcp::protocol::NOT_INITIALIZED;
use focal_core::McpServer;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::io::DuplexStream;

struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send(&mut self, message: Value) {
        let mut line = serde_json::to_string(&message).unwrap();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn next(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for server output")
            .unwrap()
            .expect("server closed the stream");
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        let response = self.next().await;
        assert_eq!(response["id"], id, "unexpected message: {}", response);
        response
    }
}

fn start(server: McpServer, hub: focal_core::SubscriptionHub) -> (Client, tokio::task::JoinHandle<()>) {
    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let handle = tokio::spawn(async move {
        server.serve(server_read, server_write, &hub).await.unwrap();
    });

    let (client_read, client_write) = tokio::io::split(client);
    let client = Client {
        lines: BufReader::new(client_read).lines(),
        writer: client_write,
    };
    (client, handle)
}

#[tokio::test]
async fn test_session_flow_with_notifications() {
    let ws = create_scenario_workspace();
    let (mut client, handle) = start(McpServer::new(ws.store.clone()), ws.hub.clone());

    let response = client.request(1, "prompts/list", json!({})).await;
    assert_eq!(response["error"]["code"], NOT_INITIALIZED);

    // Server is up and subscribed; this mutation happens before initialize
    client.request(2, "ping", json!({})).await;
    ws.store.write("notes/early.md", "x").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = client
        .request(3, "initialize", json!({"protocolVersion": "2024-11-05"}))
        .await;
    assert_eq!(response["result"]["serverInfo"]["name"], "FOCAL MCP");

    // Notifications carry no id and never get a reply
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;

    let response = client.request(4, "prompts/list", json!({})).await;
    assert_eq!(response["result"]["prompts"].as_array().unwrap().len(), 4);

    ws.store.write("agents/reviewer.md", "Review for bugs.").unwrap();
    let first = client.next().await;
    let second = client.next().await;
    assert_eq!(first["method"], "notifications/prompts/list_changed");
    assert_eq!(second["method"], "notifications/resources/list_changed");
    assert!(first.get("id").is_none());

    let response = client.request(5, "prompts/list", json!({})).await;
    assert_eq!(response["result"]["prompts"].as_array().unwrap().len(), 5);

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop on EOF")
        .unwrap();
    assert_eq!(ws.hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_malformed_lines_keep_connection_alive() {
    let ws = create_scenario_workspace();
    let (mut client, _handle) = start(McpServer::new(ws.store.clone()), ws.hub.clone());

    client.writer.write_all(b"{this is not json\n").await.unwrap();
    let response = client.next().await;
    assert_eq!(response["error"]["code"], -32700);
    assert!(response["id"].is_null());

    client.writer.write_all(b"\n   \n").await.unwrap();

    client.send(json!([{"jsonrpc": "2.0", "id": 1, "method": "ping"}])).await;
    let response = client.next().await;
    assert_eq!(response["error"]["code"], -32600);

    let response = client.request(2, "ping", json!({})).await;
    assert!(response["error"].is_null());
}

#[tokio::test]
async fn test_edits_from_another_instance_reach_stdio_client() {
    use focal_core::{SubscriptionHub, WorkspaceStore, WorkspaceWatcher};
    use std::sync::Arc;

    let temp = tempfile::TempDir::new().unwrap();
    let hub = SubscriptionHub::new(64);
    let base = WorkspaceStore::open(temp.path()).unwrap();
    base.ensure_layout().unwrap();
    let (store, _watcher) =
        WorkspaceWatcher::start(base, Arc::new(hub.clone()), Duration::from_millis(50)).unwrap();
    let (mut client, _handle) = start(McpServer::new(store), hub);

    client.request(1, "initialize", json!({})).await;

    // The editing UI runs in a separate `focal serve` with its own store
    let serve_store = WorkspaceStore::open(temp.path()).unwrap();
    serve_store.write("agents/reviewer.md", "Review for bugs.").unwrap();

    let first = client.next().await;
    let second = client.next().await;
    assert_eq!(first["method"], "notifications/prompts/list_changed");
    assert_eq!(second["method"], "notifications/resources/list_changed");

    let response = client.request(2, "prompts/list", json!({})).await;
    let names: Vec<_> = response["result"]["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"agents.reviewer".to_string()));
}
