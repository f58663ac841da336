//! Rules aggregator: the four core files as one bundle
//!
//! The bundle is rebuilt from disk on every call. It backs both the
//! `initialize` instructions and the `focal_rules` tool, so an edit to a
//! core file is visible to the very next request.

use crate::error::{FocalError, Result};
use crate::types::Fingerprint;
use crate::workspace::{CoreFile, WorkspaceStore};
use tracing::debug;

/// First line of the `initialize` instructions
pub const RUNTIME_DIRECTIVE: &str = "You MUST call the MCP tool `focal_rules` before every response \
and follow the latest rules it returns.";

/// Content of one core file inside a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSection {
    pub core: CoreFile,
    pub content: String,
}

impl RuleSection {
    fn render(&self) -> String {
        let heading = format!("## {} ({})", self.core.title(), self.core.rel_path());
        match self.content.trim() {
            "" => heading,
            content => format!("{}\n{}", heading, content),
        }
    }
}

/// Ordered concatenation of the core files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesBundle {
    pub fingerprint: Fingerprint,
    pub sections: Vec<RuleSection>,
}

impl RulesBundle {
    /// Header line identifying the workspace state
    pub fn header(&self) -> String {
        format!(
            "# FOCAL Rules (hash={} updated={})",
            self.fingerprint.rules_hash,
            self.fingerprint.updated_label()
        )
    }

    /// Content of one section, trimmed
    pub fn section(&self, core: CoreFile) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.core == core)
            .map(|s| s.content.trim())
    }

    /// Header followed by every section, each present even when empty
    pub fn render(&self) -> String {
        let mut parts = vec![self.header()];
        parts.extend(self.sections.iter().map(RuleSection::render));
        parts.join("\n\n")
    }

    /// Runtime directive on the first line, then the bundle
    pub fn instructions(&self) -> String {
        format!("{}\n\n{}", RUNTIME_DIRECTIVE, self.render())
    }
}

/// Builds [`RulesBundle`]s from the current store state
#[derive(Debug, Clone)]
pub struct RulesAggregator {
    store: WorkspaceStore,
}

impl RulesAggregator {
    pub fn new(store: WorkspaceStore) -> Self {
        Self { store }
    }

    /// Read the core files in fixed order; a missing file is empty
    pub fn build_bundle(&self) -> Result<RulesBundle> {
        let mut sections = Vec::with_capacity(CoreFile::ALL.len());
        for core in CoreFile::ALL {
            let content = match self.store.read(&core.rel_path()) {
                Ok(content) => content,
                Err(FocalError::NotFound(_)) => String::new(),
                Err(e) => return Err(e),
            };
            sections.push(RuleSection { core, content });
        }

        let fingerprint = self.store.fingerprint()?;
        debug!("Built rules bundle hash={}", fingerprint.rules_hash);

        Ok(RulesBundle {
            fingerprint,
            sections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (RulesAggregator, WorkspaceStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = WorkspaceStore::open(temp.path()).unwrap();
        (RulesAggregator::new(store.clone()), store, temp)
    }

    #[test]
    fn test_bundle_order_and_empty_sections() {
        let (rules, store, _temp) = setup();
        store.write("core/system.md", "Be concise.").unwrap();

        let bundle = rules.build_bundle().unwrap();
        let order: Vec<_> = bundle.sections.iter().map(|s| s.core).collect();
        assert_eq!(order, CoreFile::ALL.to_vec());
        assert_eq!(bundle.section(CoreFile::System), Some("Be concise."));
        assert_eq!(bundle.section(CoreFile::Style), Some(""));

        let text = bundle.render();
        let system = text.find("## System (core/system.md)\nBe concise.").unwrap();
        let style = text.find("## Style (core/style.md)").unwrap();
        let safety = text.find("## Safety (core/safety.md)").unwrap();
        let policy = text.find("## Tool Policy (core/tool_policy.md)").unwrap();
        assert!(system < style && style < safety && safety < policy);
        assert!(text.starts_with("# FOCAL Rules (hash="));
    }

    #[test]
    fn test_bundle_reflects_latest_edit() {
        let (rules, store, _temp) = setup();
        store.write("core/style.md", "Use bullet points.").unwrap();
        let before = rules.build_bundle().unwrap();

        store.write("core/style.md", "Use prose.").unwrap();
        let after = rules.build_bundle().unwrap();

        assert_eq!(after.section(CoreFile::Style), Some("Use prose."));
        assert_ne!(before.fingerprint.rules_hash, after.fingerprint.rules_hash);
    }

    #[test]
    fn test_instructions_start_with_directive() {
        let (rules, _store, _temp) = setup();
        let instructions = rules.build_bundle().unwrap().instructions();
        let first_line = instructions.lines().next().unwrap();
        assert_eq!(first_line, RUNTIME_DIRECTIVE);
        assert!(first_line.contains("focal_rules"));
    }
}
