use super::{StageKind, StageReport};
use crate::{
    config::{Config, RenderMode},
    diagram::DiagramSpec,
    error::{Error, Result},
    llm::LlmClient,
    prompt::{PromptEngine, PromptKind, ReinterpretContext},
    render::renderer_for,
    response::extract_diagram,
    writer::OutputWriter,
};
use std::fs;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Task 4: turns `diagram.mmd` into a rendered artifact.
pub struct RenderStage<'a> {
    config: &'a Config,
    client: &'a dyn LlmClient,
}

impl<'a> RenderStage<'a> {
    /// Creates the stage.
    #[must_use]
    pub fn new(config: &'a Config, client: &'a dyn LlmClient) -> Self {
        Self { config, client }
    }

    /// Validates the diagram, optionally after the model repaired it, and
    /// writes the artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the diagram file cannot be read, reinterpretation
    /// is configured without a credential or fails, or the diagram is
    /// rejected by validation or the renderer. No artifact is written then.
    #[instrument(skip(self), fields(mode = ?self.config.render_mode, renderer = ?self.config.renderer))]
    pub fn run(&self) -> Result<StageReport> {
        if self.config.render_mode == RenderMode::Reinterpret {
            self.config.require_api_key()?;
        }
        let start = Instant::now();

        let input = self.config.diagram_spec_path();
        let mut text = fs::read_to_string(&input).map_err(|e| Error::io(&input, e))?;

        let llm_calls = match self.config.render_mode {
            RenderMode::Forward => 0,
            RenderMode::Reinterpret => {
                text = self.reinterpret(&text)?;
                1
            }
        };

        let spec = DiagramSpec::parse(&text)?;
        debug!("Diagram validated as {:?}", spec.kind());

        let artifact = renderer_for(self.config)?.render(&spec)?;

        let output = self.config.artifact_path();
        OutputWriter::new(self.config).write_bytes(&output, &artifact)?;

        info!("Rendered diagram to {} ({} bytes)", output.display(), artifact.len());

        Ok(StageReport {
            stage: StageKind::Render,
            output,
            items: artifact.len(),
            llm_calls,
            duration: start.elapsed(),
        })
    }

    fn reinterpret(&self, diagram: &str) -> Result<String> {
        let engine = PromptEngine::new(self.config)?;
        let request = engine.request(
            self.config,
            PromptKind::ReinterpretDiagram,
            &ReinterpretContext { diagram },
        )?;

        let response = self.client.complete(&request)?;
        extract_diagram(&response)
    }
}
