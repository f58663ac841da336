//! Workspace store: the restricted on-disk rules tree
//!
//! - [`path`]: client path validation and root confinement
//! - [`store`]: atomic file and folder operations, tree snapshots
//! - [`layout`]: the fixed `core/` and `agents/` layout
//! - [`watch`]: changes made to the root by other processes

pub mod layout;
pub mod path;
pub mod store;
pub mod watch;

pub use layout::{CoreFile, AGENTS_DIR, CORE_DIR, RULE_EXTENSION};
pub use path::{resolve_within, RelativePath};
pub use store::{MutationObserver, WorkspaceStore};
pub use watch::WorkspaceWatcher;
