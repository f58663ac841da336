//! Relative path validation and confinement to the workspace root
//!
//! Every client-supplied path goes through two checks before any
//! filesystem call:
//! 1. Lexical: [`RelativePath::parse`] rejects parent segments, absolute
//!    paths, backslashes and NUL bytes, and drops `.` and empty segments.
//! 2. Physical: [`resolve_within`] follows symlinks on the deepest existing
//!    ancestor and requires the result to stay under the canonical root.

use crate::error::{FocalError, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// A normalized, lexically safe path relative to the workspace root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// The workspace root itself
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a client-supplied path
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains('\0') {
            return Err(FocalError::InvalidPath("path contains a NUL byte".to_string()));
        }
        if raw.contains('\\') {
            return Err(FocalError::InvalidPath(format!("{}: backslash separators", raw)));
        }
        if raw.starts_with('/') || Path::new(raw).has_root() {
            return Err(FocalError::InvalidPath(format!("{}: absolute path", raw)));
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(FocalError::InvalidPath(format!(
                        "{}: parent directory reference",
                        raw
                    )))
                }
                other => {
                    // Catches drive prefixes and anything else the platform
                    // would not treat as a plain file name.
                    let mut components = Path::new(other).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(_)), None) => segments.push(other.to_string()),
                        _ => {
                            return Err(FocalError::InvalidPath(format!(
                                "{}: disallowed segment",
                                raw
                            )))
                        }
                    }
                }
            }
        }

        Ok(Self { segments })
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True for the workspace root
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final segment
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<RelativePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment
    pub fn join(&self, name: &str) -> Result<RelativePath> {
        let child = RelativePath::parse(name)?;
        let mut segments = self.segments.clone();
        segments.extend(child.segments);
        Ok(Self { segments })
    }

    /// Component-wise prefix test
    pub fn starts_with(&self, other: &RelativePath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Lexical location under `root` (no symlink resolution)
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.segments {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for RelativePath {
    type Err = FocalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Resolve `rel` under the canonical `root`, following symlinks
///
/// The deepest ancestor that exists is canonicalized and the missing tail is
/// appended, so the check also covers paths that are about to be created.
/// Containment is tested component-wise, never as a string prefix.
pub fn resolve_within(root: &Path, rel: &RelativePath) -> Result<PathBuf> {
    let candidate = rel.to_fs_path(root);

    let mut existing = candidate.as_path();
    let mut missing = Vec::new();
    // Any stat failure (missing, or a file used as a folder) counts as not
    // existing yet; the walk always stops at the root, which exists.
    while std::fs::symlink_metadata(existing).is_err() {
        let name = existing
            .file_name()
            .ok_or_else(|| FocalError::InvalidPath(rel.to_string()))?;
        missing.push(name.to_os_string());
        existing = existing
            .parent()
            .ok_or_else(|| FocalError::InvalidPath(rel.to_string()))?;
    }

    let mut resolved = match std::fs::canonicalize(existing) {
        Ok(path) => path,
        // Dangling symlink: nothing to confine against
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FocalError::InvalidPath(format!("{}: unresolvable link", rel)))
        }
        Err(e) => return Err(FocalError::Io(e)),
    };
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }

    if !resolved.starts_with(root) {
        return Err(FocalError::InvalidPath(format!(
            "{}: resolves outside the workspace",
            rel
        )));
    }

    Ok(resolved)
}
