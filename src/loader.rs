use crate::{
    config::Config,
    error::{Error, Result},
    file::{SourceFile, has_binary_extension, is_likely_binary},
    filter::FileFilter,
};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Statistics collected while loading a codebase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    /// Files visited after filtering
    pub total_files: usize,

    /// Text files loaded
    pub text_files: usize,

    /// Binary files skipped
    pub binary_files: usize,

    /// Files skipped because they could not be read or decoded
    pub unreadable_files: usize,
}

/// Reads a directory of source files into [`SourceFile`] records.
#[derive(Debug)]
pub struct Loader {
    root_dir: PathBuf,
    output_dir: PathBuf,
    file_filter: FileFilter,
}

impl Loader {
    /// Creates a loader for the configured codebase.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter pattern is invalid.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            root_dir: config.root_dir.clone(),
            output_dir: config.output_dir.clone(),
            file_filter: FileFilter::new(config.file_filter_config.clone())?,
        })
    }

    /// Returns the directory this loader reads.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Loads all readable text files, ordered by relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The root does not exist, is not a directory or cannot be listed
    /// - No readable text file is found
    pub fn load(&self) -> Result<Vec<SourceFile>> {
        self.load_with_stats().map(|(files, _)| files)
    }

    /// Same as [`Loader::load`], also returning statistics.
    ///
    /// # Errors
    ///
    /// See [`Loader::load`].
    pub fn load_with_stats(&self) -> Result<(Vec<SourceFile>, LoadStats)> {
        self.check_root()?;

        debug!("Loading files from {}", self.root_dir.display());

        let mut files = Vec::new();
        let mut stats = LoadStats::default();

        // Stage outputs must never be read back as source
        let output_dir = fs::canonicalize(&self.output_dir).ok();
        if let Some(ref dir) = output_dir {
            debug!("Excluding output directory {}", dir.display());
        }

        let walker = WalkBuilder::new(&self.root_dir)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .hidden(true)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && output_dir.as_deref().is_some_and(|out| {
                        fs::canonicalize(entry.path()).is_ok_and(|path| path == out)
                    }))
            })
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    stats.unreadable_files += 1;
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let relative = pathdiff::diff_paths(path, &self.root_dir)
                .unwrap_or_else(|| path.to_path_buf());

            if !self.file_filter.should_process(&relative) {
                trace!("Filtered out: {}", relative.display());
                continue;
            }

            stats.total_files += 1;

            match Self::read_entry(path, &relative) {
                Ok(Some(file)) => {
                    stats.text_files += 1;
                    files.push(file);
                }
                Ok(None) => {
                    stats.binary_files += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", relative.display(), e);
                    stats.unreadable_files += 1;
                }
            }
        }

        debug!(
            "Load complete: {} total, {} text, {} binary, {} unreadable",
            stats.total_files, stats.text_files, stats.binary_files, stats.unreadable_files
        );

        if files.is_empty() {
            return Err(Error::no_files(&self.root_dir));
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Ok((files, stats))
    }

    fn check_root(&self) -> Result<()> {
        let metadata = fs::metadata(&self.root_dir).map_err(|e| Error::io(&self.root_dir, e))?;

        if !metadata.is_dir() {
            return Err(Error::io(
                &self.root_dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        // Surface permission problems on the root itself instead of an empty walk.
        fs::read_dir(&self.root_dir).map_err(|e| Error::io(&self.root_dir, e))?;

        Ok(())
    }

    /// Reads one file. Returns `Ok(None)` for binary files.
    fn read_entry(path: &Path, relative: &Path) -> Result<Option<SourceFile>> {
        if has_binary_extension(path) || is_likely_binary(path)? {
            debug!("Skipping binary file: {}", relative.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                Error::invalid_utf8(path)
            } else {
                Error::io(path, e)
            }
        })?;

        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        trace!("Loaded {} ({} bytes)", relative_path, content.len());

        Ok(Some(SourceFile::new(
            path.to_path_buf(),
            relative_path,
            content,
        )))
    }
}
