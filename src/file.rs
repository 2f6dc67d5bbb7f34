use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const CHARS_PER_TOKEN: usize = 4;

static BINARY_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "a", "o", "obj", "png", "jpg", "jpeg", "gif", "bmp", "ico",
        "webp", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "wasm", "pyc",
        "class", "whl", "egg", "pkl", "npy", "h5",
    ]
    .into_iter()
    .collect()
});

/// A text file read from the codebase. Content is kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Absolute path to the file
    pub absolute_path: PathBuf,

    /// Path relative to the loaded root, with `/` separators
    pub relative_path: String,

    /// Raw file text
    pub content: String,

    /// Estimated token count of `content`
    pub token_count: usize,
}

impl SourceFile {
    /// Creates a source file record and estimates its token count.
    #[must_use]
    pub fn new(absolute_path: PathBuf, relative_path: String, content: String) -> Self {
        let token_count = estimate_tokens(&content);
        Self {
            absolute_path,
            relative_path,
            content,
            token_count,
        }
    }

    /// Returns the file name without directories.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Returns the file name without its extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Returns the language name used in fenced code blocks.
    #[must_use]
    pub fn language(&self) -> &'static str {
        detect_language(&self.relative_path)
    }

    /// Returns true for Python sources.
    #[must_use]
    pub fn is_python(&self) -> bool {
        self.language() == "python"
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Estimates tokens at roughly four characters per token.
#[must_use]
pub(crate) fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    text.chars()
        .count()
        .div_ceil(CHARS_PER_TOKEN)
        .max(1)
}

/// Maps a file path to a code fence language tag.
#[must_use]
pub(crate) fn detect_language(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    if name == "dockerfile" {
        return "dockerfile";
    }
    if name == "makefile" {
        return "makefile";
    }

    let Some((_, ext)) = name.rsplit_once('.') else {
        return "";
    };

    match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" => "bash",
        "html" | "htm" => "html",
        "css" => "css",
        "xml" => "xml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "md" | "markdown" => "markdown",
        "sql" => "sql",
        _ => "",
    }
}

/// Determines if a file is likely binary by sampling its first 8 KiB.
///
/// Only a null byte marks the file as binary. Text in any script is left to
/// the UTF-8 decode that follows, which rejects files in other encodings.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub(crate) fn is_likely_binary(path: &Path) -> Result<bool> {
    const BUFFER_SIZE: usize = 8192;

    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = [0u8; BUFFER_SIZE];

    let bytes_read = reader.read(&mut buffer).map_err(|e| Error::io(path, e))?;

    Ok(memchr::memchr(0, &buffer[..bytes_read]).is_some())
}

/// Checks if a file extension suggests a binary file.
#[must_use]
pub(crate) fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}
