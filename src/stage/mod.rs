//! Pipeline stages.
//!
//! Each stage reads its input from disk, makes at most the LLM calls it
//! needs, and writes exactly one output. Stages borrow the shared
//! [`Config`](crate::Config) and an [`LlmClient`](crate::LlmClient); the
//! credential is checked before the first call.

mod ask;
mod describe;
mod generate;
mod refine;
mod render;

pub use ask::AskStage;
pub use describe::DescribeStage;
pub use generate::GenerateStage;
pub use refine::RefineStage;
pub use render::RenderStage;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Identifies a stage in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// QA generation (Task 1)
    Generate,
    /// QA refinement (Task 2)
    Refine,
    /// Diagram description (Task 3)
    Describe,
    /// Diagram rendering (Task 4)
    Render,
    /// Single question answering
    Ask,
}

impl StageKind {
    /// Returns the stage name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Refine => "refine",
            Self::Describe => "describe",
            Self::Render => "render",
            Self::Ask => "ask",
        }
    }

    const fn unit(self) -> &'static str {
        match self {
            Self::Generate | Self::Refine => "pairs",
            Self::Describe => "diagram lines",
            Self::Render => "bytes",
            Self::Ask => "answer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Stage that ran
    pub stage: StageKind,

    /// File the stage wrote
    pub output: PathBuf,

    /// Pairs, diagram lines or bytes produced
    pub items: usize,

    /// Chat-completion requests made
    pub llm_calls: usize,

    /// Wall-clock time
    pub duration: Duration,
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<9} {} {} -> {} ({} LLM call{}, {:.2}s)",
            self.stage.name(),
            self.items,
            self.stage.unit(),
            self.output.display(),
            self.llm_calls,
            if self.llm_calls == 1 { "" } else { "s" },
            self.duration.as_secs_f64()
        )
    }
}

/// Prints one line per report.
pub fn print_summary(reports: &[StageReport]) {
    for report in reports {
        println!("✓ {report}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = StageReport {
            stage: StageKind::Generate,
            output: PathBuf::from("output/qa_pairs.json"),
            items: 12,
            llm_calls: 1,
            duration: Duration::from_millis(1500),
        };

        assert_eq!(
            report.to_string(),
            "generate  12 pairs -> output/qa_pairs.json (1 LLM call, 1.50s)"
        );
    }

    #[test]
    fn test_report_serializes_stage_name() {
        let report = StageReport {
            stage: StageKind::Render,
            output: PathBuf::from("diagram.html"),
            items: 10,
            llm_calls: 0,
            duration: Duration::ZERO,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stage"], "render");
        assert!(report.to_string().contains("0 LLM calls"));
    }
}
