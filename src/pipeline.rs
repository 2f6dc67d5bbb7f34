use crate::{
    analysis::CodebaseAnalysis,
    config::Config,
    error::Result,
    llm::LlmClient,
    loader::Loader,
    stage::{AskStage, DescribeStage, GenerateStage, RefineStage, RenderStage, StageReport},
    writer::OutputWriter,
};
use std::time::Instant;
use tracing::{info, instrument};

/// Runs the stages against one configuration and one LLM client.
///
/// Every stage can be invoked on its own; [`Pipeline::run_all`] chains the
/// four tasks through their output files.
pub struct Pipeline<C: LlmClient> {
    config: Config,
    client: C,
}

impl<C: LlmClient> Pipeline<C> {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config, client: C) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, client })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Task 1: generates question-answer pairs.
    ///
    /// # Errors
    ///
    /// See [`GenerateStage::run`].
    pub fn generate(&self) -> Result<StageReport> {
        GenerateStage::new(&self.config, &self.client).run()
    }

    /// Task 2: refines generated pairs.
    ///
    /// # Errors
    ///
    /// See [`RefineStage::run`].
    pub fn refine(&self) -> Result<StageReport> {
        RefineStage::new(&self.config, &self.client).run()
    }

    /// Task 3: writes the diagram description.
    ///
    /// # Errors
    ///
    /// See [`DescribeStage::run`].
    pub fn describe(&self) -> Result<StageReport> {
        DescribeStage::new(&self.config, &self.client).run()
    }

    /// Task 4: renders the diagram description.
    ///
    /// # Errors
    ///
    /// See [`RenderStage::run`].
    pub fn render(&self) -> Result<StageReport> {
        RenderStage::new(&self.config, &self.client).run()
    }

    /// Answers one question about a file.
    ///
    /// # Errors
    ///
    /// See [`AskStage::run`].
    pub fn ask(&self, question: &str) -> Result<StageReport> {
        AskStage::new(&self.config, &self.client).run(question)
    }

    /// Analyzes the codebase and writes `analysis.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the codebase cannot be loaded or the file cannot
    /// be written.
    #[instrument(skip(self), fields(root = %self.config.root_dir.display()))]
    pub fn analyze(&self) -> Result<CodebaseAnalysis> {
        let files = Loader::new(&self.config)?.load()?;
        let analysis = CodebaseAnalysis::from_files(&files);

        let output = self.config.analysis_path();
        OutputWriter::new(&self.config).write_json(&output, &analysis)?;

        info!(
            "Analyzed {} Python file(s), wrote {}",
            analysis.files.len(),
            output.display()
        );
        Ok(analysis)
    }

    /// Runs Tasks 1 to 4 in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage. Outputs of the stages
    /// that completed before it stay on disk.
    #[instrument(skip(self), fields(root = %self.config.root_dir.display()))]
    pub fn run_all(&self) -> Result<Vec<StageReport>> {
        let start = Instant::now();
        let stages: [(&str, fn(&Self) -> Result<StageReport>); 4] = [
            ("generate", Self::generate),
            ("refine", Self::refine),
            ("describe", Self::describe),
            ("render", Self::render),
        ];

        let mut reports = Vec::with_capacity(stages.len());
        for (index, (name, stage)) in stages.iter().enumerate() {
            info!("Stage {}/{}: {name}", index + 1, stages.len());
            let report = stage(self)?;
            info!("✓ {report}");
            reports.push(report);
        }

        info!(
            "✓ Pipeline completed successfully in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(reports)
    }
}
