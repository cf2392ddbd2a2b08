//! Source distribution manifest.
//!
//! The list of paths that must ship with every source-form artifact
//! (license, readme, requirement files, grammar definitions, bundled
//! third-party assets, templates). Checked against the project tree before
//! the source build runs.

use crate::error::ConfigError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceManifest {
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for SourceManifest {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: vec![],
        }
    }
}

fn default_include() -> Vec<String> {
    vec!["LICENSE*".to_string(), "README*".to_string()]
}

impl SourceManifest {
    /// Files under `root` selected by the manifest.
    pub fn resolve(&self, root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let excludes = self.exclude_patterns()?;
        let mut files = Vec::new();

        for pattern in &self.include {
            for path in self.matches(root, pattern)? {
                let relative = path.strip_prefix(root).unwrap_or(&path);
                if excludes.iter().any(|ex| ex.matches_path(relative)) {
                    continue;
                }
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Verify every include pattern selects at least one non-excluded path.
    pub fn check(&self, root: &Path) -> Result<(), ConfigError> {
        let excludes = self.exclude_patterns()?;
        let mut missing = Vec::new();

        for pattern in &self.include {
            let found = self.matches(root, pattern)?.iter().any(|path| {
                let relative = path.strip_prefix(root).unwrap_or(path);
                !excludes.iter().any(|ex| ex.matches_path(relative))
            });
            if !found {
                missing.push(pattern.clone());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingManifestPaths(missing))
        }
    }

    fn matches(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
        let full = root.join(pattern);
        let paths = glob::glob(&full.to_string_lossy()).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(paths.filter_map(|entry| entry.ok()).collect())
    }

    fn exclude_patterns(&self) -> Result<Vec<glob::Pattern>, ConfigError> {
        self.exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        fs::write(dir.path().join("README.md"), "# demo").unwrap();
        fs::create_dir_all(dir.path().join("pkg/data")).unwrap();
        fs::write(dir.path().join("pkg/data/house.twg"), "grammar").unwrap();
        fs::write(dir.path().join("pkg/data/scratch.tmp"), "x").unwrap();
        dir
    }

    #[test]
    fn test_check_passes_when_all_present() {
        let dir = project();
        let manifest = SourceManifest {
            include: vec!["LICENSE*".into(), "README*".into(), "pkg/data/*.twg".into()],
            exclude: vec![],
        };
        assert!(manifest.check(dir.path()).is_ok());
    }

    #[test]
    fn test_check_reports_missing_patterns() {
        let dir = project();
        let manifest = SourceManifest {
            include: vec!["LICENSE*".into(), "requirements.txt".into()],
            exclude: vec![],
        };
        assert_eq!(
            manifest.check(dir.path()),
            Err(ConfigError::MissingManifestPaths(vec![
                "requirements.txt".to_string()
            ]))
        );
    }

    #[test]
    fn test_excluded_matches_do_not_count() {
        let dir = project();
        let manifest = SourceManifest {
            include: vec!["pkg/data/*.tmp".into()],
            exclude: vec!["**/*.tmp".into()],
        };
        assert!(manifest.check(dir.path()).is_err());
    }

    #[test]
    fn test_resolve_lists_files() {
        let dir = project();
        let manifest = SourceManifest {
            include: vec!["pkg/data/*".into()],
            exclude: vec!["**/*.tmp".into()],
        };
        let files = manifest.resolve(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("house.twg"));
    }
}
