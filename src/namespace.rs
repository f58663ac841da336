//! Prompt and resource namespaces derived from the workspace tree
//!
//! Two logical views over the same files:
//! - **Prompts**: `core.system`, `core.style`, `core.safety`,
//!   `core.tool_policy` (always present) plus `agents.<stem>` for every
//!   direct `*.md` child of `agents/`. Nested folders under `agents/` are
//!   ignored.
//! - **Resources**: `focal:///<relative-path>` for every file, no exclusions.
//!
//! Nothing here is cached: each call re-derives the mapping from a fresh
//! [`TreeSnapshot`], so moves and deletes can never leave stale names behind.

use crate::error::{FocalError, Result};
use crate::types::{EntryKind, Mutation, TreeSnapshot};
use crate::workspace::{CoreFile, RelativePath, WorkspaceStore, AGENTS_DIR, CORE_DIR, RULE_EXTENSION};
use serde::{Deserialize, Serialize};

/// Fixed, authority-less resource URI scheme
pub const RESOURCE_SCHEME: &str = "focal:///";

/// Prefix of agent prompt names
const AGENT_PREFIX: &str = "agents.";

/// One entry of `prompts/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub name: String,
    pub description: String,
}

/// Resolved prompt content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContent {
    pub name: String,
    pub description: String,
    pub path: String,
    pub content: String,
}

/// One entry of `resources/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
}

/// Resolved resource content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

/// What a prompt name points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptTarget {
    Core(CoreFile),
    Agent(String),
}

impl PromptTarget {
    /// Parse a prompt name; `None` when it is not in the grammar
    pub fn parse(name: &str) -> Option<PromptTarget> {
        if let Some(core) = CoreFile::from_prompt_name(name) {
            return Some(PromptTarget::Core(core));
        }
        let stem = name.strip_prefix(AGENT_PREFIX)?;
        if stem.is_empty() || stem.contains('/') || stem.starts_with('.') {
            return None;
        }
        // Rejects anything that would not be a single plain file name
        let rel = RelativePath::parse(&format!("{}/{}.{}", AGENTS_DIR, stem, RULE_EXTENSION)).ok()?;
        (rel.segments().len() == 2).then(|| PromptTarget::Agent(stem.to_string()))
    }

    /// Prompt name
    pub fn name(&self) -> String {
        match self {
            PromptTarget::Core(core) => core.prompt_name(),
            PromptTarget::Agent(stem) => format!("{}{}", AGENT_PREFIX, stem),
        }
    }

    /// Relative path of the backing file
    pub fn rel_path(&self) -> String {
        match self {
            PromptTarget::Core(core) => core.rel_path(),
            PromptTarget::Agent(stem) => format!("{}/{}.{}", AGENTS_DIR, stem, RULE_EXTENSION),
        }
    }

    /// Short human-readable description
    pub fn description(&self) -> String {
        match self {
            PromptTarget::Core(core) => format!("Core rules: {}", core.title()),
            PromptTarget::Agent(stem) => format!("Agent role: {}", stem),
        }
    }
}

/// Agent stem for a relative path, if the file is an agent file
pub fn agent_stem(path: &str) -> Option<&str> {
    let (dir, file) = path.split_once('/')?;
    if dir != AGENTS_DIR || file.contains('/') || file.starts_with('.') {
        return None;
    }
    let stem = file.strip_suffix(RULE_EXTENSION)?.strip_suffix('.')?;
    (!stem.is_empty()).then_some(stem)
}

/// Resource URI for a relative path
pub fn uri_for_path(path: &str) -> String {
    format!("{}{}", RESOURCE_SCHEME, path)
}

/// Relative path named by a resource URI
pub fn path_for_uri(uri: &str) -> Result<String> {
    let path = uri
        .strip_prefix(RESOURCE_SCHEME)
        .ok_or_else(|| FocalError::InvalidUri(uri.to_string()))?;
    if path.is_empty() {
        return Err(FocalError::InvalidUri(uri.to_string()));
    }
    Ok(path.to_string())
}

/// MIME type reported for a resource
pub fn mime_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "md" || ext == "markdown" => "text/markdown",
        Some(ext) if ext == "json" => "application/json",
        _ => "text/plain",
    }
}

/// Whether a path (file or folder) can change the prompt list
///
/// True for the core files and direct agent files, and for the `core/` and
/// `agents/` folders themselves (deleting or moving them drops prompts).
pub fn affects_prompts(path: &str, kind: EntryKind) -> bool {
    match kind {
        EntryKind::File => CoreFile::from_rel_path(path).is_some() || agent_stem(path).is_some(),
        EntryKind::Folder => path == CORE_DIR || path == AGENTS_DIR,
    }
}

/// Whether a mutation changes the prompt list
pub fn mutation_affects_prompts(mutation: &Mutation) -> bool {
    let kind = mutation.entry_kind();
    mutation.paths().into_iter().any(|p| affects_prompts(p, kind))
}

/// Derivation of both namespaces from one store
#[derive(Debug, Clone)]
pub struct Namespaces {
    store: WorkspaceStore,
}

impl Namespaces {
    pub fn new(store: WorkspaceStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Core prompts in fixed order, then agent prompts sorted by name
    pub fn list_prompts(&self) -> Result<Vec<PromptEntry>> {
        let snapshot = self.store.list()?;
        Ok(prompts_from_snapshot(&snapshot))
    }

    /// Content of a prompt
    ///
    /// Core prompts always resolve; a missing core file reads as empty.
    pub fn get_prompt(&self, name: &str) -> Result<PromptContent> {
        let target =
            PromptTarget::parse(name).ok_or_else(|| FocalError::NotFound(format!("prompt {}", name)))?;
        let path = target.rel_path();

        let content = match (&target, self.store.read(&path)) {
            (_, Ok(content)) => content,
            (PromptTarget::Core(_), Err(FocalError::NotFound(_))) => String::new(),
            (PromptTarget::Agent(_), Err(FocalError::NotFound(_))) => {
                return Err(FocalError::NotFound(format!("prompt {}", name)))
            }
            (_, Err(e)) => return Err(e),
        };

        Ok(PromptContent {
            name: target.name(),
            description: target.description(),
            path,
            content,
        })
    }

    /// One entry per file, sorted by URI
    pub fn list_resources(&self) -> Result<Vec<ResourceEntry>> {
        let snapshot = self.store.list()?;
        Ok(resources_from_snapshot(&snapshot))
    }

    /// Content of a resource
    ///
    /// Core file paths follow the same policy as `get_prompt`: missing reads
    /// as empty rather than NotFound.
    pub fn get_resource(&self, uri: &str) -> Result<ResourceContent> {
        let raw = path_for_uri(uri)?;
        let path = RelativePath::parse(&raw)?.to_string();

        let text = match self.store.read(&path) {
            Ok(text) => text,
            Err(FocalError::NotFound(_)) if CoreFile::from_rel_path(&path).is_some() => String::new(),
            Err(FocalError::NotFound(_)) => return Err(FocalError::NotFound(uri.to_string())),
            Err(e) => return Err(e),
        };

        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: mime_type_for(&path).to_string(),
            text,
        })
    }
}

/// Prompt list for a snapshot
pub fn prompts_from_snapshot(snapshot: &TreeSnapshot) -> Vec<PromptEntry> {
    let mut agents: Vec<PromptTarget> = snapshot
        .files()
        .filter_map(|e| agent_stem(&e.path))
        .map(|stem| PromptTarget::Agent(stem.to_string()))
        .collect();
    agents.sort_by_key(|t| t.name());

    CoreFile::ALL
        .into_iter()
        .map(PromptTarget::Core)
        .chain(agents)
        .map(|target| PromptEntry {
            name: target.name(),
            description: target.description(),
        })
        .collect()
}

/// Resource list for a snapshot
pub fn resources_from_snapshot(snapshot: &TreeSnapshot) -> Vec<ResourceEntry> {
    // Snapshot paths are sorted, and the scheme prefix is shared, so URIs
    // come out sorted as well.
    snapshot
        .files()
        .map(|e| ResourceEntry {
            uri: uri_for_path(&e.path),
            name: e.path.clone(),
            mime_type: mime_type_for(&e.path).to_string(),
        })
        .collect()
}
