//! Core types for the FOCAL workspace
//!
//! This module defines the data structures shared by the store, the
//! addressing layer and the notification hub: file metadata, tree
//! snapshots, mutation events and the workspace fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a workspace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

/// Metadata of a single file, returned by writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Relative path, `/`-separated
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time
    pub modified_at: DateTime<Utc>,
}

/// One entry of a flat tree snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Relative path, `/`-separated
    pub path: String,

    /// File or folder
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Final path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Flat snapshot of the whole workspace, sorted by path
///
/// Always taken fresh from disk; nothing derived from it is cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub entries: Vec<TreeEntry>,
}

impl TreeSnapshot {
    /// All file entries in path order
    pub fn files(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::File)
    }

    /// Look up an entry by relative path
    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the workspace holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Nested tree node, as rendered for the editing UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// A change applied to the workspace by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// File written for the first time, or folder created
    Created { path: String, kind: EntryKind },
    /// Existing file overwritten
    Updated { path: String },
    /// File or folder removed
    Deleted { path: String, kind: EntryKind },
    /// File or folder renamed
    Moved {
        from: String,
        to: String,
        kind: EntryKind,
    },
}

impl Mutation {
    /// Every relative path touched by this mutation
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Mutation::Created { path, .. }
            | Mutation::Updated { path }
            | Mutation::Deleted { path, .. } => vec![path.as_str()],
            Mutation::Moved { from, to, .. } => vec![from.as_str(), to.as_str()],
        }
    }

    /// Kind of the entry the mutation applies to
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            Mutation::Created { kind, .. }
            | Mutation::Deleted { kind, .. }
            | Mutation::Moved { kind, .. } => *kind,
            Mutation::Updated { .. } => EntryKind::File,
        }
    }

    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::Created { .. } => "created",
            Mutation::Updated { .. } => "updated",
            Mutation::Deleted { .. } => "deleted",
            Mutation::Moved { .. } => "moved",
        }
    }
}

/// Content hash and freshness of the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    /// First 12 hex characters of the SHA-256 over all files
    pub rules_hash: String,

    /// Latest modification time across all files
    pub rules_updated_at: Option<DateTime<Utc>>,
}

impl Fingerprint {
    /// Render the update time, or `unknown` for an empty workspace
    pub fn updated_label(&self) -> String {
        self.rules_updated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_paths() {
        let moved = Mutation::Moved {
            from: "agents/a.md".into(),
            to: "notes/a.md".into(),
            kind: EntryKind::File,
        };
        assert_eq!(moved.paths(), vec!["agents/a.md", "notes/a.md"]);
        assert_eq!(moved.label(), "moved");

        let updated = Mutation::Updated {
            path: "core/style.md".into(),
        };
        assert_eq!(updated.entry_kind(), EntryKind::File);
    }

    #[test]
    fn test_mutation_serialization() {
        let created = Mutation::Created {
            path: "agents".into(),
            kind: EntryKind::Folder,
        };
        let json = serde_json::to_string(&created).unwrap();
        assert!(json.contains("\"type\":\"created\""));
        assert!(json.contains("\"kind\":\"folder\""));
    }

    #[test]
    fn test_snapshot_filters() {
        let snapshot = TreeSnapshot {
            entries: vec![
                TreeEntry {
                    path: "core".into(),
                    kind: EntryKind::Folder,
                },
                TreeEntry {
                    path: "core/system.md".into(),
                    kind: EntryKind::File,
                },
            ],
        };
        assert_eq!(snapshot.files().count(), 1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("core/system.md").unwrap().name(), "system.md");
    }

    #[test]
    fn test_tree_node_uses_type_tag() {
        let node = TreeNode {
            kind: EntryKind::File,
            name: "system.md".into(),
            children: vec![],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "file");
        assert!(json.get("children").is_none());
    }
}
