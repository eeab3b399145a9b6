// SPDX-License-Identifier: MIT OR Apache-2.0
//! Index of `<agent>/<version>/<relative>` artifacts on disk for the kdeps
//! workflow runtime.
//!
//! [`FileRegistry::build`] walks a base directory once and produces a
//! two-level map: `"<agent>/<version>" -> { relative_path -> absolute_path
//! }`. A missing base directory is not an error — the registry comes back
//! empty. Per-entry walk errors (permission denied on a subtree, a broken
//! symlink) are logged and skipped; only a failure to read the base
//! directory itself is fatal.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use kdeps_error::{Error, ErrorCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// A two-level index of files rooted at `<base>/<agent>/<version>/**`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRegistry {
    entries: HashMap<String, HashMap<String, PathBuf>>,
}

impl FileRegistry {
    /// Walk `base` and build the registry.
    ///
    /// Returns an empty registry (not an error) if `base` does not exist.
    /// Returns [`ErrorCode::FileRegistryWalkFailed`] only if `base` exists
    /// but cannot be read at all; errors on individual subtrees are logged
    /// and skipped.
    pub fn build(base: impl AsRef<Path>) -> Result<Self, Error> {
        let base = base.as_ref();
        let mut registry = Self::default();
        if !base.exists() {
            return Ok(registry);
        }

        let mut walker = WalkDir::new(base).follow_links(false).into_iter();
        loop {
            let next = match walker.next() {
                Some(n) => n,
                None => break,
            };
            let entry = match next {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => {
                    return Err(Error::new(
                        ErrorCode::FileRegistryWalkFailed,
                        format!("failed to read base directory {}", base.display()),
                    )
                    .with_source(e)
                    .with_context("base", base.display().to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry during file registry walk");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let rel = match entry.path().strip_prefix(base) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let components: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if components.len() < 2 {
                continue;
            }

            let agent = components[0].clone();
            let version = components[1].clone();
            let rel_path = components[2..].join("/");
            let key = format!("{agent}/{version}");
            registry
                .entries
                .entry(key)
                .or_default()
                .insert(rel_path, entry.path().to_path_buf());
        }

        Ok(registry)
    }

    /// Look up the absolute path for `<agent>/<version>/<relative>`.
    #[must_use]
    pub fn lookup(&self, agent: &str, version: &str, relative: &str) -> Option<&Path> {
        self.entries
            .get(&format!("{agent}/{version}"))
            .and_then(|files| files.get(relative))
            .map(PathBuf::as_path)
    }

    /// All relative paths registered for `<agent>/<version>`, in no
    /// particular order.
    #[must_use]
    pub fn list(&self, agent: &str, version: &str) -> Vec<&str> {
        self.entries
            .get(&format!("{agent}/{version}"))
            .map(|files| files.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every `<agent>/<version>` key currently indexed.
    #[must_use]
    pub fn agent_versions(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of indexed `<agent>/<version>` groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no agent/version groups are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_base_dir_is_empty_not_error() {
        let registry = FileRegistry::build("/does/not/exist/at/all").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn indexes_agent_version_relative_layout() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("demo/1.0.0/data/input.csv");
        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, b"a,b,c").unwrap();

        let registry = FileRegistry::build(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        let found = registry.lookup("demo", "1.0.0", "data/input.csv").unwrap();
        assert_eq!(found, nested);
    }

    #[test]
    fn skips_entries_with_fewer_than_two_components() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("loose.txt"), b"x").unwrap();
        fs::create_dir_all(dir.path().join("onlyagent")).unwrap();
        fs::write(dir.path().join("onlyagent/file.txt"), b"x").unwrap();

        let registry = FileRegistry::build(dir.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn directories_are_never_recorded_as_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("demo/1.0.0/empty_subdir")).unwrap();
        fs::write(dir.path().join("demo/1.0.0/real.txt"), b"x").unwrap();

        let registry = FileRegistry::build(dir.path()).unwrap();
        let files = registry.list("demo", "1.0.0");
        assert_eq!(files, vec!["real.txt"]);
    }

    #[test]
    fn multiple_agents_and_versions_are_isolated() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("demo/1.0.0")).unwrap();
        fs::create_dir_all(dir.path().join("demo/2.0.0")).unwrap();
        fs::create_dir_all(dir.path().join("other/1.0.0")).unwrap();
        fs::write(dir.path().join("demo/1.0.0/a.txt"), b"1").unwrap();
        fs::write(dir.path().join("demo/2.0.0/a.txt"), b"2").unwrap();
        fs::write(dir.path().join("other/1.0.0/a.txt"), b"3").unwrap();

        let registry = FileRegistry::build(dir.path()).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.agent_versions().contains(&"demo/1.0.0"));
        assert!(registry.agent_versions().contains(&"demo/2.0.0"));
        assert!(registry.agent_versions().contains(&"other/1.0.0"));
    }

    #[test]
    fn lookup_miss_returns_none() {
        let dir = tempdir().unwrap();
        let registry = FileRegistry::build(dir.path()).unwrap();
        assert!(registry.lookup("nope", "1.0.0", "x").is_none());
    }

    #[test]
    fn nested_relative_paths_join_with_forward_slash() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("demo/1.0.0/a/b/c.txt");
        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, b"x").unwrap();

        let registry = FileRegistry::build(dir.path()).unwrap();
        assert!(registry.lookup("demo", "1.0.0", "a/b/c.txt").is_some());
    }
}
