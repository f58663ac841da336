//! Filesystem watch for changes made outside this process
//!
//! Another `focal` instance, a text editor or a sync tool can change the
//! workspace without going through this process's [`WorkspaceStore`].
//! [`WorkspaceWatcher`] turns those filesystem events into [`Mutation`]s for
//! an observer, normally the subscription hub.
//!
//! Mutations made through the store returned by [`WorkspaceWatcher::start`]
//! reach the observer directly. Their filesystem events are recognised as
//! echoes and dropped, so every local change is announced once.

use super::store::{is_temp_name, relative_string, MutationObserver, WorkspaceStore};
use crate::error::{FocalError, Result};
use crate::types::{EntryKind, Mutation};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a local mutation masks watch events on related paths
const ECHO_WINDOW: Duration = Duration::from_secs(2);

/// Upper bound on how long a busy stream of events can delay a flush
const MAX_BATCH_DEBOUNCES: u32 = 10;

/// Paths recently changed through the local store
#[derive(Default)]
struct LocalEchoes {
    recent: Mutex<HashMap<String, Instant>>,
}

impl LocalEchoes {
    fn record(&self, mutation: &Mutation) {
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.retain(|_, at| now.duration_since(*at) < ECHO_WINDOW);
        for path in mutation.paths() {
            recent.insert(path.to_string(), now);
        }
    }

    /// Every path of `mutation` is, contains, or sits inside a recent local path
    fn is_echo(&self, mutation: &Mutation) -> bool {
        let recent = self.recent.lock();
        mutation.paths().into_iter().all(|path| {
            recent
                .iter()
                .any(|(local, at)| at.elapsed() < ECHO_WINDOW && related(path, local))
        })
    }
}

fn related(a: &str, b: &str) -> bool {
    a == b || is_under(a, b) || is_under(b, a)
}

fn is_under(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Store observer: remembers the mutation, then hands it to the real target
struct LocalForwarder {
    echoes: Arc<LocalEchoes>,
    target: Arc<dyn MutationObserver>,
}

impl MutationObserver for LocalForwarder {
    fn on_mutation(&self, mutation: &Mutation) {
        self.echoes.record(mutation);
        self.target.on_mutation(mutation);
    }
}

/// Live recursive watch on a workspace root
///
/// Dropping it stops the watch; the event thread exits once the channel
/// drains.
pub struct WorkspaceWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for WorkspaceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceWatcher")
            .field("root", &self.root)
            .finish()
    }
}

impl WorkspaceWatcher {
    /// Watch `store`'s root and report outside changes to `target`
    ///
    /// `store` should not already report to `target`. The returned store
    /// does, and its own changes are not reported a second time.
    /// Events are batched until `debounce` passes without new ones.
    pub fn start(
        store: WorkspaceStore,
        target: Arc<dyn MutationObserver>,
        debounce: Duration,
    ) -> Result<(WorkspaceStore, Self)> {
        let root = store.root().to_path_buf();
        let echoes = Arc::new(LocalEchoes::default());

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if tx.send(res).is_err() {
                debug!("Watch event dropped after shutdown");
            }
        })
        .map_err(|e| FocalError::Other(format!("Failed to create watcher: {}", e)))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| FocalError::Other(format!("Failed to watch workspace: {}", e)))?;

        let dispatch = Dispatch {
            root: root.clone(),
            echoes: echoes.clone(),
            target: target.clone(),
        };
        std::thread::Builder::new()
            .name("focal-watch".to_string())
            .spawn(move || dispatch.run(rx, debounce))?;

        info!("Watching workspace {}", root.display());
        let store = store.with_observer(Arc::new(LocalForwarder { echoes, target }));
        Ok((
            store,
            Self {
                root,
                _watcher: watcher,
            },
        ))
    }
}

struct Dispatch {
    root: PathBuf,
    echoes: Arc<LocalEchoes>,
    target: Arc<dyn MutationObserver>,
}

impl Dispatch {
    fn run(self, rx: mpsc::Receiver<notify::Result<Event>>, debounce: Duration) {
        let max_batch = debounce * MAX_BATCH_DEBOUNCES;
        let mut pending = Vec::new();
        let mut started = Instant::now();

        loop {
            if !pending.is_empty() && started.elapsed() >= max_batch {
                self.flush(std::mem::take(&mut pending));
            }

            let next = if pending.is_empty() {
                rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected)
            } else {
                rx.recv_timeout(debounce)
            };

            match next {
                Ok(Ok(event)) => {
                    let mutations = mutations_from_event(&self.root, &event);
                    if !mutations.is_empty() && pending.is_empty() {
                        started = Instant::now();
                    }
                    pending.extend(mutations);
                }
                Ok(Err(e)) => warn!("Watch error: {}", e),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.flush(std::mem::take(&mut pending));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.flush(std::mem::take(&mut pending));
                    break;
                }
            }
        }
        debug!("Watch thread for {} stopped", self.root.display());
    }

    fn flush(&self, pending: Vec<Mutation>) {
        for mutation in coalesce(pending) {
            if self.echoes.is_echo(&mutation) {
                continue;
            }
            info!(
                "External change {} paths={:?}",
                mutation.label(),
                mutation.paths()
            );
            self.target.on_mutation(&mutation);
        }
    }
}

/// Workspace-relative path of an event path; `None` for the root, for paths
/// outside it and for in-flight temp files
fn workspace_path(root: &Path, path: &Path) -> Option<String> {
    let rel = relative_string(root, path)?;
    if rel.is_empty() || rel.split('/').any(is_temp_name) {
        return None;
    }
    Some(rel)
}

fn kind_on_disk(root: &Path, rel: &str) -> Option<EntryKind> {
    let meta = std::fs::symlink_metadata(root.join(rel)).ok()?;
    Some(if meta.is_dir() {
        EntryKind::Folder
    } else {
        EntryKind::File
    })
}

fn created(root: &Path, path: String, hint: EntryKind) -> Mutation {
    let kind = kind_on_disk(root, &path).unwrap_or(hint);
    Mutation::Created { path, kind }
}

/// Translate one filesystem event into workspace mutations
fn mutations_from_event(root: &Path, event: &Event) -> Vec<Mutation> {
    let paths = || event.paths.iter().filter_map(|p| workspace_path(root, p));

    match &event.kind {
        EventKind::Create(kind) => {
            let hint = match kind {
                CreateKind::Folder => EntryKind::Folder,
                _ => EntryKind::File,
            };
            paths().map(|path| created(root, path, hint)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let from = workspace_path(root, &event.paths[0]);
            let to = workspace_path(root, &event.paths[1]);
            match (from, to) {
                (Some(from), Some(to)) => {
                    let kind = kind_on_disk(root, &to).unwrap_or(EntryKind::File);
                    vec![Mutation::Moved { from, to, kind }]
                }
                // A temp file landing, or something moved in from outside
                (None, Some(to)) => match kind_on_disk(root, &to) {
                    Some(EntryKind::Folder) => vec![Mutation::Created {
                        path: to,
                        kind: EntryKind::Folder,
                    }],
                    _ => vec![Mutation::Updated { path: to }],
                },
                (Some(from), None) => vec![Mutation::Deleted {
                    path: from,
                    kind: EntryKind::File,
                }],
                (None, None) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths()
            .map(|path| Mutation::Deleted {
                path,
                kind: EntryKind::File,
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths()
            .map(|path| created(root, path, EntryKind::File))
            .collect(),
        EventKind::Modify(ModifyKind::Name(_)) => paths()
            .map(|path| match kind_on_disk(root, &path) {
                Some(kind) => Mutation::Created { path, kind },
                None => Mutation::Deleted {
                    path,
                    kind: EntryKind::File,
                },
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths()
            .filter(|path| kind_on_disk(root, path) == Some(EntryKind::File))
            .map(|path| Mutation::Updated { path })
            .collect(),
        EventKind::Remove(kind) => {
            let kind = match kind {
                RemoveKind::Folder => EntryKind::Folder,
                _ => EntryKind::File,
            };
            paths().map(|path| Mutation::Deleted { path, kind }).collect()
        }
        _ => Vec::new(),
    }
}

/// Merge repeated events for the same paths, keeping first-seen order
///
/// A create followed by writes stays a create; otherwise the latest wins.
fn coalesce(mutations: Vec<Mutation>) -> Vec<Mutation> {
    let mut merged: Vec<Mutation> = Vec::new();
    for mutation in mutations {
        match merged.iter_mut().find(|m| m.paths() == mutation.paths()) {
            Some(Mutation::Created { .. }) if matches!(mutation, Mutation::Updated { .. }) => {}
            Some(existing) => *existing = mutation,
            None => merged.push(mutation),
        }
    }
    merged
}
