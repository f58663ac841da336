//! HTTP transport and notification fan-out
//!
//! Provides:
//! - Subscription hub for list-changed notifications
//! - MCP over `POST /mcp` with SSE push on `GET /mcp/events`
//! - Workspace endpoints for the editing UI

pub mod events;
pub mod server;
pub mod state;
pub mod workspace_routes;

pub use events::{ChannelId, Notification, Subscription, SubscriptionHub};
pub use server::{build_router, ApiServer, ApiServerConfig, AppState};
pub use state::{SessionRegistry, SESSION_HEADER};
