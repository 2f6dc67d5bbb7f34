use crate::error::{Error, Result};
use crate::filter::{FileFilter, FileFilterConfig};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable the CLI reads the API key from.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 100_000;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MIN_REFINED_PAIRS: usize = 1;
const DEFAULT_MMDC_PROGRAM: &str = "mmdc";

const QA_PAIRS_FILE: &str = "qa_pairs.json";
const REFINED_PAIRS_FILE: &str = "qa_pairs_refined.json";
const DIAGRAM_SPEC_FILE: &str = "diagram.mmd";
const ANALYSIS_FILE: &str = "analysis.json";
const ANSWERS_DIR: &str = "answers";

/// How source files are grouped into LLM contexts for QA generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// Pack the whole codebase into as few contexts as the token budget allows
    #[default]
    Codebase,
    /// One request per file
    PerFile,
}

/// Where the diagram description comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagramSource {
    /// Ask the LLM to write the diagram from the structure analysis
    #[default]
    Llm,
    /// Generate the diagram locally from the structure analysis
    Analysis,
}

/// What the rendering stage does with the diagram text before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Hand the text to the renderer unchanged
    #[default]
    Forward,
    /// Let the LLM repair and normalise the text first
    Reinterpret,
}

/// Diagram renderer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererKind {
    /// Self-contained HTML page rendered by Mermaid in the browser
    #[default]
    Html,
    /// SVG image produced by the Mermaid CLI
    Svg,
    /// PNG image produced by the Mermaid CLI
    Png,
}

impl RendererKind {
    /// Returns the file extension of the produced artifact.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

/// Secret API key. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a raw key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for use in an authorization header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Configuration shared by every stage.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Codebase directory to load source files from
    pub root_dir: PathBuf,

    /// Directory all stage outputs are written to
    pub output_dir: PathBuf,

    /// Credential for the chat-completion API
    pub api_key: Option<ApiKey>,

    /// Model name sent with every request
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Upper bound on generated tokens per response
    pub max_response_tokens: Option<u32>,

    /// Timeout for a single LLM request
    pub request_timeout: Duration,

    /// File grouping for QA generation
    pub context_mode: ContextMode,

    /// Estimated token budget for one LLM context
    pub max_context_tokens: usize,

    /// Fewest pairs the refinement stage may write
    pub min_refined_pairs: usize,

    /// Source of the diagram description
    pub diagram_source: DiagramSource,

    /// Rendering stage behaviour
    pub render_mode: RenderMode,

    /// Rendering backend
    pub renderer: RendererKind,

    /// Mermaid CLI executable used by image renderers
    pub mmdc_program: PathBuf,

    /// Directory with `.tera` files overriding built-in prompts
    pub prompt_dir: Option<PathBuf>,

    /// Glob filters applied while loading files
    pub file_filter_config: FileFilterConfig,

    /// Create backups of existing output files
    pub backup_existing: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use codeqa::Config;
    ///
    /// let config = Config::builder()
    ///     .root_dir("./src")
    ///     .max_context_tokens(50_000)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// The root directory is not checked here; the loader reports an
    /// unreadable codebase as a file access error.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric setting is out of range, the model or
    /// endpoint is empty, a glob pattern is invalid or the prompt directory
    /// does not exist.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if self.max_context_tokens == 0 {
            return Err(Error::config("max_context_tokens must be greater than 0"));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be greater than 0"));
        }

        if let Some(ref dir) = self.prompt_dir {
            if !dir.is_dir() {
                return Err(Error::config(format!(
                    "Prompt directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        FileFilter::new(self.file_filter_config.clone())?;

        Ok(())
    }

    /// Returns the API key or fails before any request is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if no key was configured.
    pub fn require_api_key(&self) -> Result<&ApiKey> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose().trim().is_empty())
            .ok_or_else(|| Error::missing_credential(API_KEY_ENV))
    }

    /// Path of the QA generation output.
    #[must_use]
    pub fn qa_pairs_path(&self) -> PathBuf {
        self.output_dir.join(QA_PAIRS_FILE)
    }

    /// Path of the QA refinement output.
    #[must_use]
    pub fn refined_pairs_path(&self) -> PathBuf {
        self.output_dir.join(REFINED_PAIRS_FILE)
    }

    /// Path of the diagram description.
    #[must_use]
    pub fn diagram_spec_path(&self) -> PathBuf {
        self.output_dir.join(DIAGRAM_SPEC_FILE)
    }

    /// Path of the rendered diagram.
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("diagram.{}", self.renderer.extension()))
    }

    /// Path of the structure analysis dump.
    #[must_use]
    pub fn analysis_path(&self) -> PathBuf {
        self.output_dir.join(ANALYSIS_FILE)
    }

    /// Directory holding answered questions.
    #[must_use]
    pub fn answers_dir(&self) -> PathBuf {
        self.output_dir.join(ANSWERS_DIR)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_response_tokens: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            context_mode: ContextMode::default(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            min_refined_pairs: DEFAULT_MIN_REFINED_PAIRS,
            diagram_source: DiagramSource::default(),
            render_mode: RenderMode::default(),
            renderer: RendererKind::default(),
            mmdc_program: PathBuf::from(DEFAULT_MMDC_PROGRAM),
            prompt_dir: None,
            file_filter_config: FileFilterConfig::default(),
            backup_existing: true,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the codebase directory.
    #[must_use]
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    /// Sets the API key. Blank keys are treated as missing.
    #[must_use]
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.config.api_key = key
            .filter(|k| !k.trim().is_empty())
            .map(ApiKey::new);
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Sets the response token limit.
    #[must_use]
    pub fn max_response_tokens(mut self, tokens: Option<u32>) -> Self {
        self.config.max_response_tokens = tokens;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the context grouping mode.
    #[must_use]
    pub fn context_mode(mut self, mode: ContextMode) -> Self {
        self.config.context_mode = mode;
        self
    }

    /// Sets the token budget per LLM context.
    #[must_use]
    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.config.max_context_tokens = tokens;
        self
    }

    /// Sets the minimum number of refined pairs.
    #[must_use]
    pub fn min_refined_pairs(mut self, minimum: usize) -> Self {
        self.config.min_refined_pairs = minimum;
        self
    }

    /// Sets the diagram source.
    #[must_use]
    pub fn diagram_source(mut self, source: DiagramSource) -> Self {
        self.config.diagram_source = source;
        self
    }

    /// Sets the rendering mode.
    #[must_use]
    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.config.render_mode = mode;
        self
    }

    /// Sets the renderer backend.
    #[must_use]
    pub fn renderer(mut self, renderer: RendererKind) -> Self {
        self.config.renderer = renderer;
        self
    }

    /// Sets the Mermaid CLI executable.
    #[must_use]
    pub fn mmdc_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.mmdc_program = program.into();
        self
    }

    /// Sets a directory of prompt template overrides.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the file filter configuration.
    #[must_use]
    pub fn file_filter_config(mut self, config: FileFilterConfig) -> Self {
        self.config.file_filter_config = config;
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.config.backup_existing = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
