use crate::{config::{Config, ContextMode}, file::SourceFile};
use tracing::{debug, warn};

/// A group of files sent to the LLM in one request.
#[derive(Debug, Clone)]
pub struct ContextBatch<'a> {
    /// Sequential batch index (0-based)
    pub index: usize,

    /// Files included in this batch, in load order
    pub files: Vec<&'a SourceFile>,

    /// Total estimated tokens across all files
    pub total_tokens: usize,
}

impl<'a> ContextBatch<'a> {
    fn new(index: usize) -> Self {
        Self {
            index,
            files: Vec::new(),
            total_tokens: 0,
        }
    }

    fn push(&mut self, file: &'a SourceFile) {
        self.total_tokens += file.token_count;
        self.files.push(file);
    }

    /// Returns the number of files in this batch.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Returns true if this batch holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns the relative paths of the files in this batch.
    #[must_use]
    pub fn paths(&self) -> Vec<&'a str> {
        self.files.iter().map(|f| f.relative_path.as_str()).collect()
    }
}

/// Groups loaded files into LLM contexts.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    mode: ContextMode,
    max_tokens: usize,
}

impl Batcher {
    /// Creates a batcher from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            mode: config.context_mode,
            max_tokens: config.max_context_tokens,
        }
    }

    /// Splits files into batches, preserving their order.
    ///
    /// Files with only whitespace are left out. In [`ContextMode::Codebase`] files are packed greedily until the next
    /// file would exceed the token budget. A single file larger than the
    /// budget is placed alone in its own batch and sent whole.
    #[must_use]
    pub fn batch<'a>(&self, files: &'a [SourceFile]) -> Vec<ContextBatch<'a>> {
        let (content, blank): (Vec<&'a SourceFile>, Vec<_>) =
            files.iter().partition(|f| !f.content.trim().is_empty());
        for file in &blank {
            debug!("Skipping blank file: {}", file.relative_path);
        }

        let batches = match self.mode {
            ContextMode::PerFile => content
                .into_iter()
                .enumerate()
                .map(|(index, file)| {
                    let mut batch = ContextBatch::new(index);
                    batch.push(file);
                    batch
                })
                .collect(),
            ContextMode::Codebase => self.pack(content),
        };

        debug!(
            "Grouped {} files into {} context(s) ({:?} mode, {} blank skipped)",
            files.len() - blank.len(),
            batches.len(),
            self.mode,
            blank.len()
        );

        batches
    }

    fn pack<'a>(&self, files: Vec<&'a SourceFile>) -> Vec<ContextBatch<'a>> {
        let mut batches = Vec::new();
        let mut current = ContextBatch::new(0);

        for file in files {
            if file.token_count > self.max_tokens {
                warn!(
                    "File '{}' has ~{} tokens, exceeding the context budget of {}; sending it alone",
                    file.relative_path, file.token_count, self.max_tokens
                );
            }

            let fits = current.total_tokens + file.token_count <= self.max_tokens;
            if !current.is_empty() && !fits {
                let next = ContextBatch::new(batches.len() + 1);
                batches.push(std::mem::replace(&mut current, next));
            }

            current.push(file);
        }

        if !current.is_empty() {
            batches.push(current);
        }

        batches
    }
}
