//! # codeqa
//!
//! Sends a codebase to an OpenAI-compatible chat-completion API to produce
//! question-answer pairs and class diagrams, then renders the diagrams.
//!
//! ## Features
//!
//! - `.gitignore`-aware loading that keeps file text byte-for-byte
//! - Structure analysis of Python sources (classes, methods, imports, calls)
//! - Strictly validated QA documents and Mermaid diagrams
//! - Atomic output writes with automatic backups
//! - Prompt templates that can be overridden per call
//!
//! ## Quick Start
//!
//! ```no_run
//! use codeqa::{Config, OpenAiClient, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .root_dir("./src")
//!     .output_dir("./output")
//!     .api_key(std::env::var("OPENAI_API_KEY").ok())
//!     .build()?;
//!
//! let client = OpenAiClient::new(&config)?;
//! for report in Pipeline::new(config, client)?.run_all()? {
//!     println!("{report}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Four stages communicate only through files in the output directory:
//! 1. **Generate**: source files to `qa_pairs.json`
//! 2. **Refine**: `qa_pairs.json` to `qa_pairs_refined.json`
//! 3. **Describe**: source files to `diagram.mmd`
//! 4. **Render**: `diagram.mmd` to `diagram.html`, `.svg` or `.png`

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod batch;
mod config;
mod error;
mod file;
mod filter;
mod loader;
mod pipeline;
mod writer;

pub mod analysis;
pub mod diagram;
pub mod llm;
pub mod prompt;
pub mod qa;
pub mod render;
pub mod response;
pub mod stage;

pub use analysis::{CodebaseAnalysis, FileAnalysis};
pub use batch::{Batcher, ContextBatch};
pub use config::{
    API_KEY_ENV, ApiKey, Config, ConfigBuilder, ContextMode, DiagramSource, RenderMode,
    RendererKind,
};
pub use diagram::{DiagramKind, DiagramSpec};
pub use error::{Error, ErrorKind, Result};
pub use file::SourceFile;
pub use filter::FileFilterConfig;
pub use llm::{CompletionRequest, LlmClient, OpenAiClient};
pub use loader::{LoadStats, Loader};
pub use pipeline::Pipeline;
pub use qa::{QaDocument, QaPair, QaStage};
pub use stage::{StageKind, StageReport};
pub use writer::OutputWriter;

#[cfg(feature = "test-export-mocks")]
pub use llm::MockLlmClient;
