use super::{StageKind, StageReport};
use crate::{
    config::Config,
    error::{Error, Result},
    llm::LlmClient,
    prompt::{PromptEngine, PromptKind, RefineContext},
    qa::{QaDocument, QaStage, dedup_pairs},
    response::parse_qa_pairs,
    writer::OutputWriter,
};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Task 2: asks the model to deduplicate and improve generated pairs.
pub struct RefineStage<'a> {
    config: &'a Config,
    client: &'a dyn LlmClient,
}

impl<'a> RefineStage<'a> {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: &'a Config, client: &'a dyn LlmClient) -> Self {
        Self { config, client }
    }

    /// Refines `qa_pairs.json` into `qa_pairs_refined.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is missing, the input document is
    /// missing or empty, the request fails, the response is malformed or
    /// fewer than `min_refined_pairs` distinct pairs remain.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<StageReport> {
        self.config.require_api_key()?;
        let start = Instant::now();

        let input = self.config.qa_pairs_path();
        let document = QaDocument::load(&input)?;
        if document.is_empty() {
            return Err(Error::io(
                &input,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "QA document contains no pairs to refine",
                ),
            ));
        }

        info!("Refining {} pair(s) from {}", document.len(), input.display());

        let engine = PromptEngine::new(self.config)?;
        let request = engine.request(
            self.config,
            PromptKind::RefineQa,
            &RefineContext {
                pairs: &document.pairs,
            },
        )?;

        let response = self.client.complete(&request)?;
        let parsed = parse_qa_pairs(&response)?;
        let returned = parsed.len();
        let pairs = dedup_pairs(parsed);

        if pairs.len() < returned {
            warn!(
                "Dropped {} duplicate pair(s) from the refined set",
                returned - pairs.len()
            );
        }

        if pairs.len() < self.config.min_refined_pairs {
            return Err(Error::InsufficientPairs {
                found: pairs.len(),
                minimum: self.config.min_refined_pairs,
            });
        }

        let refined = QaDocument::new(
            QaStage::Refine,
            &self.config.model,
            input.display().to_string(),
            pairs,
        );

        let output = self.config.refined_pairs_path();
        OutputWriter::new(self.config).write_json(&output, &refined)?;

        info!(
            "Wrote {} refined pair(s) to {} (was {})",
            refined.len(),
            output.display(),
            document.len()
        );

        Ok(StageReport {
            stage: StageKind::Refine,
            output,
            items: refined.len(),
            llm_calls: 1,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::qa::QaPair;

    fn setup(min_pairs: usize, pairs: Vec<QaPair>) -> (assert_fs::TempDir, Config) {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .output_dir(temp.path())
            .api_key(Some("test-key".to_string()))
            .min_refined_pairs(min_pairs)
            .build()
            .unwrap();

        let document = QaDocument::new(QaStage::Generate, "gpt-4", "src", pairs);
        OutputWriter::new(&config)
            .write_json(&config.qa_pairs_path(), &document)
            .unwrap();

        (temp, config)
    }

    fn sample_pairs() -> Vec<QaPair> {
        vec![
            QaPair::new("What does load do?", "Reads files."),
            QaPair::new("What does LOAD do?", "It reads files."),
        ]
    }

    #[test]
    fn test_refine_writes_deduplicated_pairs() {
        let (_temp, config) = setup(1, sample_pairs());

        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|request| request.prompt.contains("What does LOAD do?"))
            .times(1)
            .returning(|_| {
                Ok(r#"```json
[
  {"question": "What does load do?", "answer": "It reads every text file."},
  {"question": "what does  load do?", "answer": "Duplicate."},
  {"question": "Where is output written?", "answer": "To the output directory."}
]
```"#
                    .to_string())
            });

        let report = RefineStage::new(&config, &client).run().unwrap();
        assert_eq!(report.items, 2);

        let refined = QaDocument::load(&config.refined_pairs_path()).unwrap();
        assert_eq!(refined.stage, QaStage::Refine);
        assert_eq!(refined.pairs[0].answer, "It reads every text file.");
        assert_eq!(refined.pairs[1].question, "Where is output written?");
    }

    #[test]
    fn test_refine_below_minimum_fails_without_output() {
        let (_temp, config) = setup(3, sample_pairs());

        let mut client = MockLlmClient::new();
        client.expect_complete().times(1).returning(|_| {
            Ok(r#"[{"question": "What does load do?", "answer": "Reads files."}]"#.to_string())
        });

        let err = RefineStage::new(&config, &client).run().unwrap_err();
        assert!(matches!(err, Error::InsufficientPairs { found: 1, minimum: 3 }));
        assert!(!config.refined_pairs_path().exists());
    }

    #[test]
    fn test_refine_empty_reply_is_below_minimum() {
        let (_temp, config) = setup(1, sample_pairs());

        let mut client = MockLlmClient::new();
        client.expect_complete().times(1).returning(|_| Ok("[]".to_string()));

        let err = RefineStage::new(&config, &client).run().unwrap_err();
        assert!(matches!(err, Error::InsufficientPairs { found: 0, minimum: 1 }));
        assert!(!config.refined_pairs_path().exists());
    }

    #[test]
    fn test_refine_rejects_empty_input_before_call() {
        let (_temp, config) = setup(1, Vec::new());

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let err = RefineStage::new(&config, &client).run().unwrap_err();
        assert!(err.is_file_access());
    }

    #[test]
    fn test_refine_missing_input() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .output_dir(temp.path())
            .api_key(Some("test-key".to_string()))
            .build()
            .unwrap();

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let err = RefineStage::new(&config, &client).run().unwrap_err();
        assert!(err.is_file_access());
    }

    #[test]
    fn test_refine_missing_credential_makes_no_call() {
        let (_temp, config) = setup(1, sample_pairs());
        let config = Config {
            api_key: None,
            ..config
        };

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let err = RefineStage::new(&config, &client).run().unwrap_err();
        assert!(err.is_config());
    }
}
