use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A single question about the codebase and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// Question text
    pub question: String,
    /// Answer text
    pub answer: String,
}

impl QaPair {
    /// Creates a pair, trimming both fields.
    #[must_use]
    pub fn new(question: impl AsRef<str>, answer: impl AsRef<str>) -> Self {
        Self {
            question: question.as_ref().trim().to_string(),
            answer: answer.as_ref().trim().to_string(),
        }
    }

    /// Returns true if both question and answer have content.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.question.trim().is_empty() && !self.answer.trim().is_empty()
    }

    fn question_key(&self) -> String {
        self.question
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Stage that produced a [`QaDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaStage {
    /// Generated from source files
    Generate,
    /// Refined from a generated document
    Refine,
}

/// A QA result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaDocument {
    /// Producing stage
    pub stage: QaStage,

    /// Model that produced the pairs
    pub model: String,

    /// RFC 3339 creation time
    pub generated_at: String,

    /// Input directory or file
    pub source: String,

    /// The pairs, in output order
    pub pairs: Vec<QaPair>,
}

impl QaDocument {
    /// Creates a document stamped with the current time.
    #[must_use]
    pub fn new(
        stage: QaStage,
        model: impl Into<String>,
        source: impl Into<String>,
        pairs: Vec<QaPair>,
    ) -> Self {
        Self {
            stage,
            model: model.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: source.into(),
            pairs,
        }
    }

    /// Reads a document written by an earlier stage.
    ///
    /// # Errors
    ///
    /// Returns a file access error if the file is missing, unreadable or not
    /// a QA document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        serde_json::from_str(&text).map_err(|e| {
            Error::io(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("not a QA document: {e}"),
                ),
            )
        })
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if the document holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Drops invalid pairs and pairs whose question repeats an earlier one.
///
/// Questions are compared ignoring case and whitespace runs. The first
/// occurrence wins and order is preserved.
#[must_use]
pub fn dedup_pairs(pairs: Vec<QaPair>) -> Vec<QaPair> {
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(QaPair::is_valid)
        .filter(|pair| seen.insert(pair.question_key()))
        .collect()
}
