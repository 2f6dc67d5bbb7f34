use crate::{
    config::{Config, RendererKind},
    diagram::DiagramSpec,
    error::{Error, Result},
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tera::{Context, Tera};
use tracing::debug;

const PAGE_TEMPLATE: &str = "diagram.html";

/// Turns a validated diagram into artifact bytes.
pub trait Renderer {
    /// Renders `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if the backend rejects the diagram.
    fn render(&self, spec: &DiagramSpec) -> Result<Vec<u8>>;
}

/// Creates the configured renderer.
///
/// # Errors
///
/// Returns an error if the HTML page template fails to compile.
pub fn renderer_for(config: &Config) -> Result<Box<dyn Renderer>> {
    Ok(match config.renderer {
        RendererKind::Html => Box::new(HtmlRenderer::new()?),
        RendererKind::Svg | RendererKind::Png => Box::new(MermaidCliRenderer::new(config)),
    })
}

/// Self-contained HTML page that renders the diagram in the browser.
#[derive(Debug)]
pub struct HtmlRenderer {
    tera: Tera,
}

impl HtmlRenderer {
    /// Creates the renderer.
    ///
    /// # Errors
    ///
    /// Returns an error if the page template fails to compile.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(PAGE_TEMPLATE, include_str!("../templates/diagram.html.tera"))
            .map_err(|e| Error::template(PAGE_TEMPLATE, e))?;
        Ok(Self { tera })
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, spec: &DiagramSpec) -> Result<Vec<u8>> {
        let mut context = Context::new();
        context.insert("title", "Codebase diagram");
        context.insert("diagram", spec.as_str().trim_end());
        context.insert("generated_at", &chrono::Utc::now().to_rfc3339());

        // The page name ends in .html, so the diagram text is HTML-escaped
        let page = self
            .tera
            .render(PAGE_TEMPLATE, &context)
            .map_err(|e| Error::template(PAGE_TEMPLATE, e))?;

        Ok(page.into_bytes())
    }
}

/// Image renderer backed by the Mermaid CLI (`mmdc`).
#[derive(Debug, Clone)]
pub struct MermaidCliRenderer {
    program: PathBuf,
    extension: &'static str,
}

impl MermaidCliRenderer {
    /// Creates a renderer producing the configured image format.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.mmdc_program.clone(),
            extension: config.renderer.extension(),
        }
    }

    fn scratch_file(suffix: &str) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix("codeqa-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| Error::io(std::env::temp_dir(), e))
    }

    fn run(&self, input: &Path, output: &Path) -> Result<Vec<u8>> {
        debug!(
            "Running {} -i {} -o {}",
            self.program.display(),
            input.display(),
            output.display()
        );

        let result = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .output()
            .map_err(|e| {
                Error::render(format!(
                    "could not run '{}': {e}",
                    self.program.display()
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::render(format!(
                "'{}' exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        let bytes = fs::read(output).map_err(|e| {
            Error::render(format!("renderer produced no output at {}: {e}", output.display()))
        })?;

        if bytes.is_empty() {
            return Err(Error::render(format!(
                "'{}' wrote an empty {} file",
                self.program.display(),
                self.extension
            )));
        }

        Ok(bytes)
    }
}

impl Renderer for MermaidCliRenderer {
    fn render(&self, spec: &DiagramSpec) -> Result<Vec<u8>> {
        // Both files are removed when dropped, on every return path
        let input = Self::scratch_file(".mmd")?;
        let output = Self::scratch_file(&format!(".{}", self.extension))?;

        fs::write(input.path(), spec.as_str()).map_err(|e| Error::io(input.path(), e))?;

        self.run(input.path(), output.path())
    }
}
