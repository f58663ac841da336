//! Fixed workspace layout: the `core/` rule files and the `agents/` folder

use super::store::WorkspaceStore;
use crate::error::{FocalError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Folder holding the four required rule files
pub const CORE_DIR: &str = "core";

/// Folder holding one markdown file per agent role
pub const AGENTS_DIR: &str = "agents";

/// Extension of prompt-bearing files
pub const RULE_EXTENSION: &str = "md";

/// The four required core rule files, in bundle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreFile {
    System,
    Style,
    Safety,
    ToolPolicy,
}

impl CoreFile {
    /// All core files in their fixed order
    pub const ALL: [CoreFile; 4] = [
        CoreFile::System,
        CoreFile::Style,
        CoreFile::Safety,
        CoreFile::ToolPolicy,
    ];

    /// File stem, also the suffix of the prompt name
    pub fn stem(&self) -> &'static str {
        match self {
            CoreFile::System => "system",
            CoreFile::Style => "style",
            CoreFile::Safety => "safety",
            CoreFile::ToolPolicy => "tool_policy",
        }
    }

    /// Section title used in the rules bundle
    pub fn title(&self) -> &'static str {
        match self {
            CoreFile::System => "System",
            CoreFile::Style => "Style",
            CoreFile::Safety => "Safety",
            CoreFile::ToolPolicy => "Tool Policy",
        }
    }

    /// Relative path inside the workspace
    pub fn rel_path(&self) -> String {
        format!("{}/{}.{}", CORE_DIR, self.stem(), RULE_EXTENSION)
    }

    /// Prompt name, e.g. `core.tool_policy`
    pub fn prompt_name(&self) -> String {
        format!("{}.{}", CORE_DIR, self.stem())
    }

    /// Match a relative path against the core files
    pub fn from_rel_path(path: &str) -> Option<CoreFile> {
        Self::ALL.into_iter().find(|core| core.rel_path() == path)
    }

    /// Match a prompt name against the core files
    pub fn from_prompt_name(name: &str) -> Option<CoreFile> {
        Self::ALL.into_iter().find(|core| core.prompt_name() == name)
    }

    /// Content seeded into a fresh workspace
    fn default_content(&self) -> String {
        let body = match self {
            CoreFile::System => "FOCAL system prompt.",
            CoreFile::Style => "FOCAL style guide.",
            CoreFile::Safety => "FOCAL safety rules.",
            CoreFile::ToolPolicy => "FOCAL tool usage rules.",
        };
        format!("# {}\n\n{}\n", self.title(), body)
    }
}

impl WorkspaceStore {
    /// Create `core/` and `agents/` and seed missing core files
    ///
    /// Existing content is never touched. Seeding happens outside the
    /// request path, so it emits no mutation events. Returns the relative
    /// paths that were created.
    pub fn ensure_layout(&self) -> Result<Vec<String>> {
        let mut created = Vec::new();

        for dir in [CORE_DIR, AGENTS_DIR] {
            let (_, full) = self.resolve(dir)?;
            if full.is_file() {
                return Err(FocalError::Conflict(format!("{} is a file", dir)));
            }
            if !full.exists() {
                std::fs::create_dir_all(&full)?;
                created.push(dir.to_string());
            }
        }

        for core in CoreFile::ALL {
            let rel = core.rel_path();
            let (_, full) = self.resolve(&rel)?;
            if !full.exists() {
                self.write_atomic(&full, &core.default_content())?;
                created.push(rel);
            }
        }

        if !created.is_empty() {
            info!("Seeded workspace layout: {}", created.join(", "));
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_core_file_names() {
        assert_eq!(CoreFile::ToolPolicy.rel_path(), "core/tool_policy.md");
        assert_eq!(CoreFile::ToolPolicy.prompt_name(), "core.tool_policy");
        assert_eq!(
            CoreFile::from_rel_path("core/safety.md"),
            Some(CoreFile::Safety)
        );
        assert_eq!(CoreFile::from_prompt_name("core.style"), Some(CoreFile::Style));
        assert_eq!(CoreFile::from_prompt_name("core.unknown"), None);
    }

    #[test]
    fn test_ensure_layout_seeds_once() {
        let temp = TempDir::new().unwrap();
        let store = WorkspaceStore::open(temp.path()).unwrap();

        let created = store.ensure_layout().unwrap();
        assert_eq!(created.len(), 6);
        assert!(store.read("core/system.md").unwrap().starts_with("# System"));

        store.write("core/system.md", "Be concise.").unwrap();
        let created = store.ensure_layout().unwrap();
        assert!(created.is_empty());
        assert_eq!(store.read("core/system.md").unwrap(), "Be concise.");
    }
}
