//! Glob-based file selection for the codebase loader.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Configuration for file filtering with glob patterns.
///
/// Patterns are matched against paths relative to the loaded root.
#[derive(Debug, Clone, Default)]
pub struct FileFilterConfig {
    exclude_files: Vec<String>,
    allow_only: Vec<String>,
    exclude_directories: Vec<String>,
}

impl FileFilterConfig {
    /// Creates an empty configuration that accepts every file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects files matching any of the patterns.
    #[must_use]
    pub fn exclude_files(mut self, patterns: Vec<String>) -> Self {
        self.exclude_files = patterns;
        self
    }

    /// Rejects everything below directories matching any of the patterns.
    #[must_use]
    pub fn exclude_directories(mut self, patterns: Vec<String>) -> Self {
        self.exclude_directories = patterns;
        self
    }

    /// Accepts only files matching one of the patterns.
    #[must_use]
    pub fn allow_only(mut self, patterns: Vec<String>) -> Self {
        self.allow_only = patterns;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FileFilter {
    exclude_files: GlobSet,
    include_files: Option<GlobSet>,
    exclude_directories: GlobSet,
}

impl FileFilter {
    /// Compiles the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid glob.
    pub(crate) fn new(config: FileFilterConfig) -> Result<Self> {
        let include_files = if config.allow_only.is_empty() {
            None
        } else {
            Some(Self::build_globset(&config.allow_only)?)
        };

        Ok(Self {
            exclude_files: Self::build_globset(&config.exclude_files)?,
            include_files,
            exclude_directories: Self::build_globset(&config.exclude_directories)?,
        })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::config(format!("Invalid glob pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Returns true if the file at `relative` should be loaded.
    pub(crate) fn should_process(&self, relative: &Path) -> bool {
        if let Some(ref include) = self.include_files {
            if !include.is_match(relative) {
                return false;
            }
        }

        if relative
            .ancestors()
            .skip(1)
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.exclude_directories.is_match(a))
        {
            return false;
        }

        !self.exclude_files.is_match(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = FileFilter::new(FileFilterConfig::new()).unwrap();
        assert!(filter.should_process(Path::new("src/app.py")));
        assert!(filter.should_process(Path::new("README.md")));
    }

    #[test]
    fn test_allow_only() {
        let filter = FileFilter::new(
            FileFilterConfig::new().allow_only(vec!["**/*.py".to_string(), "*.py".to_string()]),
        )
        .unwrap();

        assert!(filter.should_process(Path::new("api.py")));
        assert!(filter.should_process(Path::new("src/api.py")));
        assert!(!filter.should_process(Path::new("src/main.rs")));
    }

    #[test]
    fn test_exclude_directories() {
        let filter = FileFilter::new(
            FileFilterConfig::new().exclude_directories(vec!["venv".to_string(), "**/build".to_string()]),
        )
        .unwrap();

        assert!(!filter.should_process(Path::new("venv/lib/site.py")));
        assert!(!filter.should_process(Path::new("pkg/build/out.py")));
        assert!(filter.should_process(Path::new("pkg/src/out.py")));
    }

    #[test]
    fn test_exclude_files() {
        let filter = FileFilter::new(
            FileFilterConfig::new().exclude_files(vec!["*.lock".to_string()]),
        )
        .unwrap();

        assert!(!filter.should_process(Path::new("poetry.lock")));
        assert!(filter.should_process(Path::new("pyproject.toml")));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = FileFilter::new(FileFilterConfig::new().allow_only(vec!["a{".to_string()]));
        assert!(result.unwrap_err().is_config());
    }
}
