use super::{StageKind, StageReport};
use crate::{
    analysis::CodebaseAnalysis,
    batch::Batcher,
    config::Config,
    error::{Error, Result},
    llm::LlmClient,
    loader::Loader,
    prompt::{GenerateContext, PromptEngine, PromptKind, SourceView},
    qa::{QaDocument, QaStage},
    response::parse_qa_pairs,
    writer::OutputWriter,
};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Task 1: asks the model for question-answer pairs about the codebase.
pub struct GenerateStage<'a> {
    config: &'a Config,
    client: &'a dyn LlmClient,
}

impl<'a> GenerateStage<'a> {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: &'a Config, client: &'a dyn LlmClient) -> Self {
        Self { config, client }
    }

    /// Loads the codebase, queries the model once per context and writes
    /// every pair to `qa_pairs.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is missing, the codebase cannot be
    /// loaded or holds only blank files, a request fails, a response is
    /// malformed or no context produced a single pair. Nothing is written in
    /// that case.
    #[instrument(skip(self), fields(root = %self.config.root_dir.display()))]
    pub fn run(&self) -> Result<StageReport> {
        self.config.require_api_key()?;
        let start = Instant::now();

        let files = Loader::new(self.config)?.load()?;
        let analysis = CodebaseAnalysis::from_files(&files);
        let batches = Batcher::new(self.config).batch(&files);
        if batches.is_empty() {
            return Err(Error::no_files(&self.config.root_dir));
        }
        let engine = PromptEngine::new(self.config)?;

        info!(
            "Generating QA pairs from {} file(s) in {} request(s)",
            files.len(),
            batches.len()
        );

        let mut pairs = Vec::new();
        for batch in &batches {
            let context = GenerateContext {
                batch_index: batch.index + 1,
                batch_count: batches.len(),
                files: batch
                    .files
                    .iter()
                    .map(|file| SourceView {
                        path: &file.relative_path,
                        lines: file.line_count(),
                        content: &file.content,
                        analysis: analysis.files.iter().find(|a| a.path == file.relative_path),
                    })
                    .collect(),
            };

            let request = engine.request(self.config, PromptKind::GenerateQa, &context)?;
            let response = self.client.complete(&request)?;
            let parsed = parse_qa_pairs(&response)?;

            debug!(
                "Context {}/{} ({} files, ~{} tokens) produced {} pair(s)",
                batch.index + 1,
                batches.len(),
                batch.file_count(),
                batch.total_tokens,
                parsed.len()
            );
            pairs.extend(parsed);
        }

        if pairs.is_empty() {
            return Err(Error::parse(format!(
                "the model returned no question-answer pairs for any of {} context(s)",
                batches.len()
            )));
        }

        let document = QaDocument::new(
            QaStage::Generate,
            &self.config.model,
            self.config.root_dir.display().to_string(),
            pairs,
        );

        let output = self.config.qa_pairs_path();
        OutputWriter::new(self.config).write_json(&output, &document)?;

        info!("Wrote {} pair(s) to {}", document.len(), output.display());

        Ok(StageReport {
            stage: StageKind::Generate,
            output,
            items: document.len(),
            llm_calls: batches.len(),
            duration: start.elapsed(),
        })
    }
}
