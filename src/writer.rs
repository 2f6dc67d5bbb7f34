use crate::{
    config::Config,
    error::{Error, Result},
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::debug;

/// Writes stage outputs with atomic operations.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    backup_existing: bool,
}

impl OutputWriter {
    /// Creates a writer for the configured output directory.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            backup_existing: config.backup_existing,
        }
    }

    /// Returns the directory outputs are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serializes `value` as pretty JSON and writes it to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let mut json = serde_json::to_string_pretty(value)?;
        json.push('\n');
        self.write_text(path, &json)
    }

    /// Writes `content` to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or the write fails.
    pub fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        self.write_bytes(path, content.as_bytes())
    }

    /// Writes raw bytes to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or the write fails.
    pub fn write_bytes(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        self.write_file_atomic(path, content)?;

        debug!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    /// Writes a file atomically with optional backup.
    ///
    /// # Process
    ///
    /// 1. Creates backup if file exists and backup is enabled
    /// 2. Writes content to temporary file
    /// 3. Syncs temporary file to disk
    /// 4. Atomically renames temporary file to target path
    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if path.exists() && self.backup_existing {
            Self::backup_file(path)?;
        }

        let temp_path = temp_path(path);
        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;

        temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

        drop(temp_file);

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::io(path, e)
        })?;

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(path: &Path) -> Result<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_nanos();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::config(format!("Invalid output path: {}", path.display())))?
            .to_string_lossy();

        let backup_path = path.with_file_name(format!("{filename}.backup.{timestamp}"));

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }

    /// Returns the first `<prefix>_NNN.<extension>` path in `dir` that does
    /// not exist yet, starting from 001.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` exists but cannot be listed.
    pub fn next_numbered_path(dir: &Path, prefix: &str, extension: &str) -> Result<PathBuf> {
        let taken = if dir.is_dir() {
            fs::read_dir(dir)
                .map_err(|e| Error::io(dir, e))?
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let name = entry.file_name();
                    let name = name.to_str()?;
                    name.strip_prefix(prefix)?
                        .strip_prefix('_')?
                        .strip_suffix(extension)?
                        .strip_suffix('.')?
                        .parse::<u32>()
                        .ok()
                })
                .max()
                .unwrap_or(0)
        } else {
            0
        };

        Ok(dir.join(format!("{prefix}_{:03}.{extension}", taken + 1)))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use serde_json::json;

    fn writer(output_dir: &Path) -> OutputWriter {
        let config = Config::builder().output_dir(output_dir).build().unwrap();
        OutputWriter::new(&config)
    }

    #[test]
    fn test_writer_creates_output_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let out = temp.child("output");

        let writer = writer(out.path());
        writer
            .write_text(&out.path().join("diagram.mmd"), "classDiagram\n")
            .unwrap();

        out.child("diagram.mmd").assert("classDiagram\n");
        assert!(!out.child("diagram.mmd.tmp").exists());
    }

    #[test]
    fn test_write_json_is_pretty() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("data.json");

        writer(temp.path())
            .write_json(&path, &json!({"pairs": []}))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"pairs\": []\n}\n");
    }

    #[test]
    fn test_writer_creates_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let existing = temp.child("qa_pairs.json");
        existing.write_str("old content").unwrap();

        writer(temp.path()).write_text(existing.path(), "new").unwrap();

        existing.assert("new");
        let backups: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.contains(".backup."))
            .collect();

        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(temp.path().join(&backups[0])).unwrap(),
            "old content"
        );
    }

    #[test]
    fn test_backup_can_be_disabled() {
        let temp = assert_fs::TempDir::new().unwrap();
        let existing = temp.child("diagram.mmd");
        existing.write_str("old").unwrap();

        let config = Config::builder()
            .output_dir(temp.path())
            .backup_existing(false)
            .build()
            .unwrap();
        OutputWriter::new(&config)
            .write_text(existing.path(), "new")
            .unwrap();

        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_next_numbered_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        let answers = temp.child("answers");

        let first = OutputWriter::next_numbered_path(answers.path(), "question", "json").unwrap();
        assert_eq!(first, answers.path().join("question_001.json"));

        answers.child("question_001.json").touch().unwrap();
        answers.child("question_007.json").touch().unwrap();
        answers.child("notes.txt").touch().unwrap();

        let next = OutputWriter::next_numbered_path(answers.path(), "question", "json").unwrap();
        assert_eq!(next, answers.path().join("question_008.json"));
    }
}
