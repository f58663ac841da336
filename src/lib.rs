//! FOCAL - local rules server speaking the Model Context Protocol
//!
//! Serves a directory of markdown rule files to MCP clients:
//! - Core rules (`core/*.md`) and agent roles (`agents/*.md`) as prompts
//! - Every workspace file as a `focal:///` resource
//! - A `focal_rules` tool returning the combined core rules
//! - List-changed notifications whenever the workspace is edited
//!
//! # Architecture
//!
//! - **Workspace**: confined filesystem store with atomic writes
//! - **Namespace**: prompt names and resource URIs derived from the tree
//! - **Rules**: the ordered core bundle
//! - **MCP**: JSON-RPC engine and stdio transport
//! - **API**: subscription hub, HTTP transport and editing endpoints
//!
//! # Example
//!
//! ```ignore
//! use focal_core::{McpServer, SubscriptionHub, WorkspaceStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> focal_core::Result<()> {
//!     let hub = SubscriptionHub::new(64);
//!     let store = WorkspaceStore::open("rules")?.with_observer(Arc::new(hub.clone()));
//!     store.ensure_layout()?;
//!     McpServer::new(store).run_stdio(&hub).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
pub mod namespace;
pub mod rules;
pub mod types;
pub mod workspace;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, AppState, Notification, SubscriptionHub};
pub use config::{ConfigOverrides, FocalConfig};
pub use error::{FocalError, Result};
pub use mcp::{McpServer, SessionState, ToolHandler};
pub use namespace::{Namespaces, PromptEntry, ResourceEntry};
pub use rules::{RulesAggregator, RulesBundle};
pub use types::{EntryKind, FileNode, Fingerprint, Mutation, TreeEntry, TreeNode, TreeSnapshot};
pub use workspace::{CoreFile, MutationObserver, RelativePath, WorkspaceStore, WorkspaceWatcher};
