use super::{StageKind, StageReport};
use crate::{
    analysis::CodebaseAnalysis,
    config::{Config, DiagramSource},
    diagram::{DiagramSpec, class_diagram},
    error::{Error, Result},
    llm::LlmClient,
    loader::Loader,
    prompt::{DiagramContext, PromptEngine, PromptKind},
    response::extract_diagram,
    writer::OutputWriter,
};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Task 3: writes a Mermaid description of the codebase structure.
pub struct DescribeStage<'a> {
    config: &'a Config,
    client: &'a dyn LlmClient,
}

impl<'a> DescribeStage<'a> {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: &'a Config, client: &'a dyn LlmClient) -> Self {
        Self { config, client }
    }

    /// Analyzes the codebase and writes `diagram.mmd`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is missing (LLM source only), the
    /// codebase cannot be loaded or holds no Python file, the request fails
    /// or the response declares no diagram type.
    #[instrument(skip(self), fields(source = ?self.config.diagram_source))]
    pub fn run(&self) -> Result<StageReport> {
        if self.config.diagram_source == DiagramSource::Llm {
            self.config.require_api_key()?;
        }
        let start = Instant::now();

        let files = Loader::new(self.config)?.load()?;
        let analysis = CodebaseAnalysis::from_files(&files);
        if analysis.is_empty() {
            return Err(Error::config(format!(
                "no Python files under {} to describe",
                self.config.root_dir.display()
            )));
        }

        let (text, llm_calls) = match self.config.diagram_source {
            DiagramSource::Llm => (self.describe_with_llm(&analysis)?, 1),
            DiagramSource::Analysis => (class_diagram(&analysis)?.to_string(), 0),
        };

        if let Err(e) = DiagramSpec::parse(&text) {
            warn!("Diagram will not render as written ({e}); render with reinterpretation to repair it");
        }

        let output = self.config.diagram_spec_path();
        let text = format!("{}\n", text.trim_end());
        OutputWriter::new(self.config).write_text(&output, &text)?;

        let lines = text.lines().count();
        info!("Wrote {lines}-line diagram to {}", output.display());

        Ok(StageReport {
            stage: StageKind::Describe,
            output,
            items: lines,
            llm_calls,
            duration: start.elapsed(),
        })
    }

    fn describe_with_llm(&self, analysis: &CodebaseAnalysis) -> Result<String> {
        let engine = PromptEngine::new(self.config)?;
        let request = engine.request(
            self.config,
            PromptKind::DiagramSpec,
            &DiagramContext {
                analysis: &analysis.files,
            },
        )?;

        let response = self.client.complete(&request)?;
        extract_diagram(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use assert_fs::prelude::*;

    fn setup(source: DiagramSource, key: Option<&str>) -> (assert_fs::TempDir, Config) {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/api.py")
            .write_str("import os\n\nclass Search:\n    def fit(self):\n        pass\n")
            .unwrap();
        temp.child("src/app.py")
            .write_str("import api\n\ndef main():\n    api.Search().fit()\n")
            .unwrap();

        let config = Config::builder()
            .root_dir(temp.child("src").path())
            .output_dir(temp.child("out").path())
            .api_key(key.map(str::to_string))
            .diagram_source(source)
            .build()
            .unwrap();

        (temp, config)
    }

    #[test]
    fn test_describe_with_llm() {
        let (_temp, config) = setup(DiagramSource::Llm, Some("test-key"));

        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|request| request.prompt.contains("\"Search.fit\""))
            .times(1)
            .returning(|_| {
                Ok("```mermaid\nclassDiagram\n    class Search {\n        +fit()\n    }\n    app ..> api : imports\n```".to_string())
            });

        let report = DescribeStage::new(&config, &client).run().unwrap();
        assert_eq!(report.llm_calls, 1);

        let written = std::fs::read_to_string(config.diagram_spec_path()).unwrap();
        assert!(written.starts_with("classDiagram\n"));
        assert!(written.ends_with("app ..> api : imports\n"));
        assert_eq!(report.items, 5);
    }

    #[test]
    fn test_describe_without_diagram_header_fails() {
        let (_temp, config) = setup(DiagramSource::Llm, Some("test-key"));

        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_| Ok("Here you go: Search uses fit.".to_string()));

        let err = DescribeStage::new(&config, &client).run().unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(!config.diagram_spec_path().exists());
    }

    #[test]
    fn test_describe_from_analysis_needs_no_credential() {
        let (_temp, config) = setup(DiagramSource::Analysis, None);

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let report = DescribeStage::new(&config, &client).run().unwrap();
        assert_eq!(report.llm_calls, 0);

        let written = std::fs::read_to_string(config.diagram_spec_path()).unwrap();
        assert!(written.contains("api -- Search : contains"));
        assert!(written.contains("class app {\n        +main()\n    }"));
        assert!(written.contains("app ..> api : imports"));
        assert!(DiagramSpec::parse(&written).is_ok());
    }

    #[test]
    fn test_describe_missing_credential_makes_no_call() {
        let (_temp, config) = setup(DiagramSource::Llm, None);

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let err = DescribeStage::new(&config, &client).run().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_describe_without_python_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("README.md").write_str("# Docs").unwrap();
        let config = Config::builder()
            .root_dir(temp.path())
            .output_dir(temp.child("out").path())
            .diagram_source(DiagramSource::Analysis)
            .build()
            .unwrap();

        let client = MockLlmClient::new();
        let err = DescribeStage::new(&config, &client).run().unwrap_err();
        assert!(err.is_config());
    }
}
