//! Workspace store: the on-disk rules tree and the only writer to it
//!
//! All operations validate the client path (see [`super::path`]) before the
//! first filesystem call. Writes go through a temp file in the destination
//! directory followed by a rename, so readers and concurrent writers (even
//! in other processes sharing the root) only ever see complete files.
//!
//! Every successful mutation is reported to the registered
//! [`MutationObserver`]s after it lands on disk. Failed operations report
//! nothing.

use super::path::{resolve_within, RelativePath};
use crate::error::{FocalError, Result};
use crate::types::{EntryKind, FileNode, Fingerprint, Mutation, TreeEntry, TreeNode, TreeSnapshot};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Prefix of in-flight temp files; they are never listed
pub const TEMP_PREFIX: &str = ".focal-";

/// Suffix of in-flight temp files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Receives every successful workspace mutation
pub trait MutationObserver: Send + Sync {
    fn on_mutation(&self, mutation: &Mutation);
}

/// Handle to a workspace root
///
/// Cheap to clone; all clones share the root and the observer list.
#[derive(Clone)]
pub struct WorkspaceStore {
    root: Arc<PathBuf>,
    observers: Vec<Arc<dyn MutationObserver>>,
}

impl std::fmt::Debug for WorkspaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceStore")
            .field("root", &self.root)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// True for names produced by [`WorkspaceStore::write_atomic`]
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

impl WorkspaceStore {
    /// Open (creating if needed) the workspace at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = std::fs::canonicalize(root)?;
        debug!("Workspace root: {}", root.display());

        Ok(Self {
            root: Arc::new(root),
            observers: Vec::new(),
        })
    }

    /// Register an observer for successful mutations
    pub fn with_observer(mut self, observer: Arc<dyn MutationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Canonical workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a client path and resolve it inside the root
    pub fn resolve(&self, raw: &str) -> Result<(RelativePath, PathBuf)> {
        let rel = RelativePath::parse(raw)?;
        let full = resolve_within(&self.root, &rel)?;
        Ok((rel, full))
    }

    /// Like [`Self::resolve`] but refuses the root itself
    fn resolve_entry(&self, raw: &str) -> Result<(RelativePath, PathBuf)> {
        let (rel, full) = self.resolve(raw)?;
        if rel.is_root() || full == *self.root {
            return Err(FocalError::InvalidPath(format!(
                "'{}' refers to the workspace root",
                raw
            )));
        }
        Ok((rel, full))
    }

    /// Kind of the entry at `path`, `None` when absent
    pub fn kind_of(&self, path: &str) -> Result<Option<EntryKind>> {
        let (rel, full) = self.resolve(path)?;
        match std::fs::metadata(&full) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Folder)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if self.is_missing(&rel, &e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a file as UTF-8 text
    pub fn read(&self, path: &str) -> Result<String> {
        let (rel, full) = self.resolve(path)?;
        match std::fs::metadata(&full) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(FocalError::NotFound(rel.to_string())),
            Err(e) if self.is_missing(&rel, &e) => {
                return Err(FocalError::NotFound(rel.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        match std::fs::read_to_string(&full) {
            Ok(content) => Ok(content),
            // Removed between the stat and the read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FocalError::NotFound(rel.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create or replace a file, creating parent folders as needed
    pub fn write(&self, path: &str, content: &str) -> Result<FileNode> {
        let (rel, full) = self.resolve_entry(path)?;
        if full.is_dir() {
            return Err(FocalError::Conflict(format!("{} is a folder", rel)));
        }
        self.ensure_no_file_ancestor(&rel)?;

        let existed = full.is_file();
        self.write_atomic(&full, content)?;
        let node = file_node(&rel, &full)?;

        info!("Write file path={} bytes={}", rel, content.len());
        self.emit(if existed {
            Mutation::Updated {
                path: rel.to_string(),
            }
        } else {
            Mutation::Created {
                path: rel.to_string(),
                kind: EntryKind::File,
            }
        });

        Ok(node)
    }

    /// Create a folder (and any missing parents)
    pub fn create_folder(&self, path: &str) -> Result<()> {
        let (rel, full) = self.resolve_entry(path)?;
        if std::fs::symlink_metadata(&full).is_ok() {
            return Err(FocalError::Conflict(format!("{} already exists", rel)));
        }
        self.ensure_no_file_ancestor(&rel)?;

        std::fs::create_dir_all(&full)?;

        info!("Create folder path={}", rel);
        self.emit(Mutation::Created {
            path: rel.to_string(),
            kind: EntryKind::Folder,
        });
        Ok(())
    }

    /// Delete a file or folder
    ///
    /// Non-empty folders are refused with `Conflict` unless `recursive`.
    pub fn delete(&self, path: &str, recursive: bool) -> Result<EntryKind> {
        let (rel, full) = self.resolve_entry(path)?;
        let meta = match std::fs::metadata(&full) {
            Ok(meta) => meta,
            Err(e) if self.is_missing(&rel, &e) => {
                return Err(FocalError::NotFound(rel.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let kind = if meta.is_dir() {
            if recursive {
                std::fs::remove_dir_all(&full)?;
            } else {
                if std::fs::read_dir(&full)?.next().is_some() {
                    return Err(FocalError::Conflict(format!("{} is not empty", rel)));
                }
                std::fs::remove_dir(&full)?;
            }
            EntryKind::Folder
        } else {
            std::fs::remove_file(&full)?;
            EntryKind::File
        };

        info!("Delete {:?} path={} recursive={}", kind, rel, recursive);
        self.emit(Mutation::Deleted {
            path: rel.to_string(),
            kind,
        });
        Ok(kind)
    }

    /// Rename a file or folder
    ///
    /// An existing destination is a `Conflict` unless `overwrite` is set, and
    /// even then only a file may replace a file.
    pub fn move_entry(&self, from: &str, to: &str, overwrite: bool) -> Result<EntryKind> {
        let (src_rel, src) = self.resolve_entry(from)?;
        let (dst_rel, dst) = self.resolve_entry(to)?;

        if dst_rel.starts_with(&src_rel) || dst.starts_with(&src) {
            return Err(FocalError::InvalidPath(format!(
                "cannot move {} into itself",
                src_rel
            )));
        }

        let kind = match std::fs::metadata(&src) {
            Ok(meta) if meta.is_dir() => EntryKind::Folder,
            Ok(_) => EntryKind::File,
            Err(e) if self.is_missing(&src_rel, &e) => {
                return Err(FocalError::NotFound(src_rel.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if let Ok(dst_meta) = std::fs::symlink_metadata(&dst) {
            if !overwrite {
                return Err(FocalError::Conflict(format!("{} already exists", dst_rel)));
            }
            if dst_meta.is_dir() || kind == EntryKind::Folder {
                return Err(FocalError::Conflict(format!(
                    "{} cannot be replaced",
                    dst_rel
                )));
            }
        }
        self.ensure_no_file_ancestor(&dst_rel)?;

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if overwrite || kind == EntryKind::Folder {
            // A folder never replaces a non-empty folder or a file
            std::fs::rename(&src, &dst)?;
        } else {
            rename_no_replace(&src, &dst, &dst_rel)?;
        }

        info!("Move entry src={} dst={}", src_rel, dst_rel);
        self.emit(Mutation::Moved {
            from: src_rel.to_string(),
            to: dst_rel.to_string(),
            kind,
        });
        Ok(kind)
    }

    /// Flat snapshot of every file and folder, sorted by path
    ///
    /// Symlinks and in-flight temp files are skipped, as are names that are
    /// not valid UTF-8 (they cannot be addressed by clients).
    pub fn list(&self) -> Result<TreeSnapshot> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(self.root.as_path())
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !is_temp_name(name))
                    .unwrap_or(true)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e)
                    if e
                        .io_error()
                        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
                        .unwrap_or(false) =>
                {
                    continue
                }
                Err(e) => return Err(FocalError::Io(e.into())),
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                continue;
            }

            let Some(path) = relative_string(&self.root, entry.path()) else {
                warn!("Skipping non UTF-8 entry under workspace root");
                continue;
            };

            entries.push(TreeEntry {
                path,
                kind: if file_type.is_dir() {
                    EntryKind::Folder
                } else {
                    EntryKind::File
                },
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(TreeSnapshot { entries })
    }

    /// Nested tree, folders first, names compared case-insensitively
    pub fn tree(&self) -> Result<Vec<TreeNode>> {
        let snapshot = self.list()?;
        Ok(build_children(&snapshot.entries, ""))
    }

    /// Content hash and latest modification time of all files
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let snapshot = self.list()?;
        let mut hasher = Sha256::new();
        let mut latest: Option<DateTime<Utc>> = None;

        for entry in snapshot.files() {
            let full = RelativePath::parse(&entry.path)?.to_fs_path(&self.root);
            let bytes = match std::fs::read(&full) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(entry.path.as_bytes());
            hasher.update(b"|");
            hasher.update(&bytes);

            if let Ok(modified) = std::fs::metadata(&full).and_then(|m| m.modified()) {
                let modified = DateTime::<Utc>::from(modified);
                if latest.map_or(true, |t| modified > t) {
                    latest = Some(modified);
                }
            }
        }

        let digest = format!("{:x}", hasher.finalize());
        Ok(Fingerprint {
            rules_hash: digest[..12].to_string(),
            rules_updated_at: latest,
        })
    }

    /// Temp file in the destination directory, then rename over `full`
    pub(crate) fn write_atomic(&self, full: &Path, content: &str) -> Result<()> {
        let parent = full
            .parent()
            .ok_or_else(|| FocalError::InvalidPath("missing parent".to_string()))?;
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        // Temp files start out owner-only; keep the mode of the file being replaced
        if let Ok(existing) = std::fs::metadata(full) {
            tmp.as_file().set_permissions(existing.permissions())?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(full).map_err(|e| FocalError::Io(e.error))?;
        Ok(())
    }

    /// Stat failure meaning "no such entry": plain NotFound, or some
    /// ancestor being a file
    fn is_missing(&self, rel: &RelativePath, err: &std::io::Error) -> bool {
        err.kind() == std::io::ErrorKind::NotFound || self.ensure_no_file_ancestor(rel).is_err()
    }

    /// `Conflict` when some existing ancestor of `rel` is a file
    fn ensure_no_file_ancestor(&self, rel: &RelativePath) -> Result<()> {
        let mut current = rel.parent();
        while let Some(dir) = current {
            if dir.is_root() {
                break;
            }
            if dir.to_fs_path(&self.root).is_file() {
                return Err(FocalError::Conflict(format!("{} is a file", dir)));
            }
            current = dir.parent();
        }
        Ok(())
    }

    fn emit(&self, mutation: Mutation) {
        debug!(
            "Mutation {} paths={:?} observers={}",
            mutation.label(),
            mutation.paths(),
            self.observers.len()
        );
        for observer in &self.observers {
            observer.on_mutation(&mutation);
        }
    }
}

/// Move a file without replacing anything that appeared at `dst` after the
/// existence check
///
/// The hard link fails atomically when `dst` exists. Filesystems without
/// hard links fall back to a plain rename.
fn rename_no_replace(src: &Path, dst: &Path, dst_rel: &RelativePath) -> Result<()> {
    match std::fs::hard_link(src, dst) {
        Ok(()) => {
            std::fs::remove_file(src)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(FocalError::Conflict(format!("{} already exists", dst_rel)))
        }
        Err(e) => {
            debug!("hard link unavailable ({}), renaming {}", e, dst_rel);
            std::fs::rename(src, dst)?;
            Ok(())
        }
    }
}

fn file_node(rel: &RelativePath, full: &Path) -> Result<FileNode> {
    let meta = std::fs::metadata(full)?;
    Ok(FileNode {
        path: rel.to_string(),
        size: meta.len(),
        modified_at: DateTime::<Utc>::from(meta.modified()?),
    })
}

pub(crate) fn relative_string(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn build_children(entries: &[TreeEntry], parent: &str) -> Vec<TreeNode> {
    let mut nodes: Vec<TreeNode> = entries
        .iter()
        .filter(|e| parent_of(&e.path) == parent)
        .map(|e| TreeNode {
            kind: e.kind,
            name: e.name().to_string(),
            children: match e.kind {
                EntryKind::Folder => build_children(entries, &e.path),
                EntryKind::File => Vec::new(),
            },
        })
        .collect();
    nodes.sort_by_key(|n| (n.kind == EntryKind::File, n.name.to_lowercase()));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Mutation>>,
    }

    impl MutationObserver for Recorder {
        fn on_mutation(&self, mutation: &Mutation) {
            self.seen.lock().push(mutation.clone());
        }
    }

    fn setup() -> (WorkspaceStore, Arc<Recorder>, TempDir) {
        let temp = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let store = WorkspaceStore::open(temp.path())
            .unwrap()
            .with_observer(recorder.clone());
        (store, recorder, temp)
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let (store, recorder, _temp) = setup();

        let node = store.write("agents/reviewer.md", "Review for bugs.").unwrap();
        assert_eq!(node.path, "agents/reviewer.md");
        assert_eq!(node.size, 16);
        assert_eq!(store.read("agents/reviewer.md").unwrap(), "Review for bugs.");

        store.write("agents/reviewer.md", "Review harder.").unwrap();
        assert_eq!(store.read("agents/reviewer.md").unwrap(), "Review harder.");

        let seen = recorder.seen.lock();
        assert_eq!(
            *seen,
            vec![
                Mutation::Created {
                    path: "agents/reviewer.md".into(),
                    kind: EntryKind::File
                },
                Mutation::Updated {
                    path: "agents/reviewer.md".into()
                },
            ]
        );
    }

    #[test]
    fn test_read_missing_and_folder() {
        let (store, _, _temp) = setup();
        store.create_folder("core").unwrap();

        assert!(matches!(store.read("core/system.md"), Err(FocalError::NotFound(_))));
        assert!(matches!(store.read("core"), Err(FocalError::NotFound(_))));
    }

    #[test]
    fn test_traversal_touches_nothing() {
        let (store, recorder, temp) = setup();

        assert!(matches!(store.write("../escape.md", "x"), Err(FocalError::InvalidPath(_))));
        assert!(matches!(store.create_folder("a/../../b"), Err(FocalError::InvalidPath(_))));
        assert!(matches!(store.read("../../etc/passwd"), Err(FocalError::InvalidPath(_))));

        assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
        assert!(!temp.path().parent().unwrap().join("escape.md").exists());
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_root_is_not_an_entry() {
        let (store, _, _temp) = setup();
        assert!(matches!(store.delete("", true), Err(FocalError::InvalidPath(_))));
        assert!(matches!(store.write(".", "x"), Err(FocalError::InvalidPath(_))));
    }

    #[test]
    fn test_create_folder_conflict() {
        let (store, recorder, _temp) = setup();
        store.create_folder("agents").unwrap();
        assert!(matches!(store.create_folder("agents"), Err(FocalError::Conflict(_))));
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[test]
    fn test_write_under_a_file_conflicts_without_event() {
        let (store, recorder, _temp) = setup();
        store.write("notes.md", "x").unwrap();

        assert!(matches!(
            store.write("notes.md/inner.md", "y"),
            Err(FocalError::Conflict(_))
        ));
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[test]
    fn test_delete_policy() {
        let (store, _, _temp) = setup();
        store.write("agents/reviewer.md", "x").unwrap();

        assert!(matches!(store.delete("agents", false), Err(FocalError::Conflict(_))));
        assert_eq!(store.delete("agents/reviewer.md", false).unwrap(), EntryKind::File);
        assert_eq!(store.delete("agents", false).unwrap(), EntryKind::Folder);
        assert!(matches!(store.delete("agents", false), Err(FocalError::NotFound(_))));

        store.write("agents/a/b.md", "x").unwrap();
        assert_eq!(store.delete("agents", true).unwrap(), EntryKind::Folder);
        assert_eq!(store.kind_of("agents").unwrap(), None);
    }

    #[test]
    fn test_move_rules() {
        let (store, recorder, _temp) = setup();
        store.write("agents/a.md", "A").unwrap();
        store.write("agents/b.md", "B").unwrap();

        assert!(matches!(
            store.move_entry("agents/a.md", "agents/b.md", false),
            Err(FocalError::Conflict(_))
        ));
        assert!(matches!(
            store.move_entry("agents/missing.md", "agents/c.md", false),
            Err(FocalError::NotFound(_))
        ));
        assert!(matches!(
            store.move_entry("agents", "agents/nested", false),
            Err(FocalError::InvalidPath(_))
        ));
        assert!(matches!(
            store.move_entry("agents/a.md", "../a.md", false),
            Err(FocalError::InvalidPath(_))
        ));

        store.move_entry("agents/a.md", "agents/b.md", true).unwrap();
        assert_eq!(store.read("agents/b.md").unwrap(), "A");
        assert!(matches!(store.read("agents/a.md"), Err(FocalError::NotFound(_))));

        store.move_entry("agents", "archive/agents", false).unwrap();
        assert_eq!(store.read("archive/agents/b.md").unwrap(), "A");

        let last = recorder.seen.lock().last().cloned().unwrap();
        assert_eq!(
            last,
            Mutation::Moved {
                from: "agents".into(),
                to: "archive/agents".into(),
                kind: EntryKind::Folder
            }
        );
    }

    #[test]
    fn test_list_is_sorted_and_skips_temp_files() {
        let (store, _, temp) = setup();
        store.write("core/system.md", "s").unwrap();
        store.write("agents/reviewer.md", "r").unwrap();
        std::fs::write(temp.path().join("core").join(".focal-abc.tmp"), "partial").unwrap();

        let snapshot = store.list().unwrap();
        let paths: Vec<_> = snapshot.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["agents", "agents/reviewer.md", "core", "core/system.md"]
        );
    }

    #[test]
    fn test_tree_nests_folders_first() {
        let (store, _, _temp) = setup();
        store.write("readme.md", "x").unwrap();
        store.write("core/system.md", "s").unwrap();

        let tree = store.tree().unwrap();
        assert_eq!(tree[0].name, "core");
        assert_eq!(tree[0].children[0].name, "system.md");
        assert_eq!(tree[1].name, "readme.md");
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let (store, _, _temp) = setup();
        let empty = store.fingerprint().unwrap();
        assert_eq!(empty.rules_hash.len(), 12);
        assert!(empty.rules_updated_at.is_none());

        store.write("core/system.md", "one").unwrap();
        let first = store.fingerprint().unwrap();
        store.write("core/system.md", "two").unwrap();
        let second = store.fingerprint().unwrap();

        assert_ne!(first.rules_hash, second.rules_hash);
        assert!(second.rules_updated_at.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_overwrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let (store, _, temp) = setup();
        store.write("core/system.md", "v1").unwrap();
        let full = temp.path().join("core/system.md");
        std::fs::set_permissions(&full, std::fs::Permissions::from_mode(0o644)).unwrap();

        store.write("core/system.md", "v2").unwrap();

        let mode = std::fs::metadata(&full).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(store.read("core/system.md").unwrap(), "v2");
    }

    #[test]
    fn test_rename_no_replace_refuses_late_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.md");
        let dst = temp.path().join("b.md");
        std::fs::write(&src, "source").unwrap();
        // Destination appears after the caller's existence check
        std::fs::write(&dst, "newcomer").unwrap();

        let rel = RelativePath::parse("b.md").unwrap();
        let result = rename_no_replace(&src, &dst, &rel);

        assert!(matches!(result, Err(FocalError::Conflict(_))));
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "source");
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "newcomer");
    }

    #[test]
    fn test_rename_no_replace_moves_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.md");
        let dst = temp.path().join("b.md");
        std::fs::write(&src, "source").unwrap();

        let rel = RelativePath::parse("b.md").unwrap();
        rename_no_replace(&src, &dst, &rel).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "source");
    }
}
