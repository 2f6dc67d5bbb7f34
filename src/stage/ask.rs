use super::{StageKind, StageReport};
use crate::{
    analysis::CodebaseAnalysis,
    config::Config,
    error::{Error, Result},
    llm::LlmClient,
    loader::Loader,
    prompt::{AnswerContext, PromptEngine, PromptKind},
    qa::QaPair,
    response::parse_answer,
    writer::OutputWriter,
};
use std::time::Instant;
use tracing::{info, instrument};

/// Answers one question about a file named in the question.
pub struct AskStage<'a> {
    config: &'a Config,
    client: &'a dyn LlmClient,
}

impl<'a> AskStage<'a> {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: &'a Config, client: &'a dyn LlmClient) -> Self {
        Self { config, client }
    }

    /// Answers `question` from the structure of the file it mentions and
    /// writes the pair to the next free `answers/question_NNN.json`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the credential is missing, the
    /// question is blank or names no analyzed file; otherwise the errors of
    /// loading, the request and response parsing.
    #[instrument(skip(self))]
    pub fn run(&self, question: &str) -> Result<StageReport> {
        self.config.require_api_key()?;
        let start = Instant::now();

        let question = question.trim();
        if question.is_empty() {
            return Err(Error::config("question must not be empty"));
        }

        let files = Loader::new(self.config)?.load()?;
        let analysis = CodebaseAnalysis::from_files(&files);

        let file = analysis.find_mentioned(question).ok_or_else(|| {
            let available: Vec<&str> = analysis.files.iter().map(|f| f.file_name()).collect();
            Error::config(format!(
                "the question names no analyzed file; mention one of: {}",
                if available.is_empty() {
                    "(no Python files found)".to_string()
                } else {
                    available.join(", ")
                }
            ))
        })?;

        info!("Answering from the analysis of {}", file.path);

        let context = AnswerContext {
            file_name: file.file_name(),
            classes: &file.classes,
            functions: file.functions.iter().map(String::as_str).collect(),
            imports: &file.imports,
            common_functions: analysis.common_functions_summary(),
            question,
        };

        let engine = PromptEngine::new(self.config)?;
        let request = engine.request(self.config, PromptKind::AnswerQuestion, &context)?;
        let answer = parse_answer(&self.client.complete(&request)?)?;

        let output = OutputWriter::next_numbered_path(&self.config.answers_dir(), "question", "json")?;
        OutputWriter::new(self.config).write_json(&output, &QaPair::new(question, answer))?;

        info!("Wrote answer to {}", output.display());

        Ok(StageReport {
            stage: StageKind::Ask,
            output,
            items: 1,
            llm_calls: 1,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use assert_fs::prelude::*;

    fn setup(key: Option<&str>) -> (assert_fs::TempDir, Config) {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/api.py")
            .write_str("import os\n\nclass Search:\n    def fit(self):\n        pass\n\ndef helper():\n    pass\n")
            .unwrap();
        temp.child("src/app.py")
            .write_str("def helper():\n    pass\n")
            .unwrap();

        let config = Config::builder()
            .root_dir(temp.child("src").path())
            .output_dir(temp.child("out").path())
            .api_key(key.map(str::to_string))
            .build()
            .unwrap();

        (temp, config)
    }

    #[test]
    fn test_ask_writes_numbered_answers() {
        let (_temp, config) = setup(Some("test-key"));

        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|request| {
                request.prompt.contains("from the file 'api.py'")
                    && request.prompt.contains("- Classes: Search")
                    && request.prompt.contains("helper (api.py, app.py)")
            })
            .times(2)
            .returning(|_| Ok("  Search wraps a fitted index.\n".to_string()));

        let stage = AskStage::new(&config, &client);
        let first = stage.run("What does API.py do?").unwrap();
        let second = stage.run("Which classes are in api.py?").unwrap();

        assert_eq!(first.output, config.answers_dir().join("question_001.json"));
        assert_eq!(second.output, config.answers_dir().join("question_002.json"));

        let text = std::fs::read_to_string(&first.output).unwrap();
        let pair: QaPair = serde_json::from_str(&text).unwrap();
        assert_eq!(pair.question, "What does API.py do?");
        assert_eq!(pair.answer, "Search wraps a fitted index.");
    }

    #[test]
    fn test_ask_unknown_file_lists_available() {
        let (_temp, config) = setup(Some("test-key"));

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let err = AskStage::new(&config, &client)
            .run("What does main.py do?")
            .unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("api.py, app.py"));
    }

    #[test]
    fn test_ask_missing_credential_makes_no_call() {
        let (_temp, config) = setup(None);

        let mut client = MockLlmClient::new();
        client.expect_complete().times(0);

        let err = AskStage::new(&config, &client).run("What is api.py?").unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));
    }

    #[test]
    fn test_ask_blank_question() {
        let (_temp, config) = setup(Some("test-key"));
        let client = MockLlmClient::new();

        let err = AskStage::new(&config, &client).run("   ").unwrap_err();
        assert!(err.is_config());
    }
}
