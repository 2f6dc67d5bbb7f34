//! Prompt templates for every LLM call.
//!
//! Built-in templates are compiled into the binary. A directory of
//! `<name>.tera` files can replace any of them; overrides are validated
//! before the first request so a broken template fails fast.

use crate::{
    analysis::FileAnalysis,
    config::Config,
    error::{Error, Result},
    file::detect_language,
    llm::CompletionRequest,
    qa::QaPair,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tera::{Context, Tera, Value};
use tracing::{debug, info};

/// Maximum template override size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// The LLM calls the pipeline makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Question-answer pairs from source files
    GenerateQa,
    /// Refinement of generated pairs
    RefineQa,
    /// Class diagram from the structure analysis
    DiagramSpec,
    /// Repair of a diagram before rendering
    ReinterpretDiagram,
    /// Answer to a question about one file
    AnswerQuestion,
}

impl PromptKind {
    /// Returns the template name, also the override file stem.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::GenerateQa => "generate_qa",
            Self::RefineQa => "refine_qa",
            Self::DiagramSpec => "diagram_spec",
            Self::ReinterpretDiagram => "reinterpret_diagram",
            Self::AnswerQuestion => "answer_question",
        }
    }

    /// Returns all prompt kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::GenerateQa,
            Self::RefineQa,
            Self::DiagramSpec,
            Self::ReinterpretDiagram,
            Self::AnswerQuestion,
        ]
    }

    /// Returns the system message sent with this prompt.
    #[must_use]
    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::GenerateQa => {
                "You are a senior engineer documenting a codebase for new team members. \
                 You write precise questions and answers grounded only in the code you are shown, \
                 and you always reply with valid JSON."
            }
            Self::RefineQa => {
                "You are a technical editor. You merge duplicates, fix inaccuracies and sharpen \
                 wording in question-answer sets, and you always reply with valid JSON."
            }
            Self::DiagramSpec => {
                "You are a software architect who draws Mermaid diagrams. \
                 You reply with Mermaid source only, without commentary."
            }
            Self::ReinterpretDiagram => {
                "You are a Mermaid syntax expert. You fix diagrams so they render, changing as \
                 little as possible, and reply with Mermaid source only."
            }
            Self::AnswerQuestion => {
                "You answer questions about a Python codebase using only the analysis you are given."
            }
        }
    }

    /// Variables an override must reference to be useful.
    const fn required_variables(self) -> &'static [&'static str] {
        match self {
            Self::GenerateQa => &["files"],
            Self::RefineQa => &["pairs"],
            Self::DiagramSpec => &["analysis"],
            Self::ReinterpretDiagram => &["diagram"],
            Self::AnswerQuestion => &["question"],
        }
    }

    const fn builtin(self) -> &'static str {
        match self {
            Self::GenerateQa => include_str!("../templates/generate_qa.tera"),
            Self::RefineQa => include_str!("../templates/refine_qa.tera"),
            Self::DiagramSpec => include_str!("../templates/diagram_spec.tera"),
            Self::ReinterpretDiagram => include_str!("../templates/reinterpret_diagram.tera"),
            Self::AnswerQuestion => include_str!("../templates/answer_question.tera"),
        }
    }
}

/// One source file as shown to the model.
#[derive(Debug, Serialize)]
pub(crate) struct SourceView<'a> {
    pub(crate) path: &'a str,
    pub(crate) lines: usize,
    pub(crate) content: &'a str,
    pub(crate) analysis: Option<&'a FileAnalysis>,
}

/// Variables of [`PromptKind::GenerateQa`].
#[derive(Debug, Serialize)]
pub(crate) struct GenerateContext<'a> {
    pub(crate) batch_index: usize,
    pub(crate) batch_count: usize,
    pub(crate) files: Vec<SourceView<'a>>,
}

/// Variables of [`PromptKind::RefineQa`].
#[derive(Debug, Serialize)]
pub(crate) struct RefineContext<'a> {
    pub(crate) pairs: &'a [QaPair],
}

/// Variables of [`PromptKind::DiagramSpec`].
#[derive(Debug, Serialize)]
pub(crate) struct DiagramContext<'a> {
    pub(crate) analysis: &'a [FileAnalysis],
}

/// Variables of [`PromptKind::ReinterpretDiagram`].
#[derive(Debug, Serialize)]
pub(crate) struct ReinterpretContext<'a> {
    pub(crate) diagram: &'a str,
}

/// Variables of [`PromptKind::AnswerQuestion`].
#[derive(Debug, Serialize)]
pub(crate) struct AnswerContext<'a> {
    pub(crate) file_name: &'a str,
    pub(crate) classes: &'a [String],
    pub(crate) functions: Vec<&'a str>,
    pub(crate) imports: &'a [String],
    pub(crate) common_functions: String,
    pub(crate) question: &'a str,
}

/// Renders prompts and wraps them into requests.
#[derive(Debug)]
pub struct PromptEngine {
    tera: Tera,
}

impl PromptEngine {
    /// Creates an engine with the built-in templates and any overrides from
    /// the configured prompt directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be read or fails validation.
    pub fn new(config: &Config) -> Result<Self> {
        let mut tera = Tera::default();

        for kind in PromptKind::all() {
            tera.add_raw_template(kind.id(), kind.builtin())
                .map_err(|e| Error::template(kind.id(), e))?;
        }

        if let Some(ref dir) = config.prompt_dir {
            Self::register_overrides(&mut tera, dir)?;
        }

        tera.register_filter("detect_language", detect_language_filter);
        tera.register_filter("list_or", list_or_filter);

        Ok(Self { tera })
    }

    fn register_overrides(tera: &mut Tera, dir: &Path) -> Result<()> {
        for kind in PromptKind::all() {
            let path = dir.join(format!("{}.tera", kind.id()));
            if !path.is_file() {
                continue;
            }

            let content = validate_override(*kind, &path)?;
            tera.add_raw_template(kind.id(), &content)
                .map_err(|e| Error::template(kind.id(), e))?;

            info!("Using prompt override {}", path.display());
        }
        Ok(())
    }

    /// Renders the prompt text for `kind`.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn render(&self, kind: PromptKind, context: &impl Serialize) -> Result<String> {
        let context = Context::from_serialize(context).map_err(|e| Error::template(kind.id(), e))?;

        let rendered = self
            .tera
            .render(kind.id(), &context)
            .map_err(|e| Error::template(kind.id(), e))?;

        debug!("Rendered {} prompt ({} chars)", kind.id(), rendered.len());
        Ok(rendered)
    }

    /// Renders `kind` and pairs it with its system message.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn request(
        &self,
        config: &Config,
        kind: PromptKind,
        context: &impl Serialize,
    ) -> Result<CompletionRequest> {
        let prompt = self.render(kind, context)?;
        Ok(CompletionRequest::new(config, kind.system_prompt(), prompt))
    }
}

/// Checks an override file and returns its content.
///
/// The file must be at most 1MB, non-blank, valid Tera and reference the
/// variables its prompt is rendered with.
fn validate_override(kind: PromptKind, path: &Path) -> Result<String> {
    let name = path.display().to_string();

    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if metadata.len() > MAX_TEMPLATE_SIZE {
        return Err(Error::invalid_template(
            &name,
            format!(
                "Template file too large: {} bytes (max: {} bytes)",
                metadata.len(),
                MAX_TEMPLATE_SIZE
            ),
        ));
    }

    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    if content.trim().is_empty() {
        return Err(Error::invalid_template(&name, "Template file is empty"));
    }

    Tera::default()
        .add_raw_template("validation", &content)
        .map_err(|e| Error::template(&name, e))?;

    let missing: Vec<&str> = kind
        .required_variables()
        .iter()
        .filter(|var| !content.contains(*var))
        .copied()
        .collect();

    if !missing.is_empty() {
        return Err(Error::invalid_template(
            &name,
            format!(
                "Template never references {}; see templates/{}.tera for the available variables",
                missing.join(", "),
                kind.id()
            ),
        ));
    }

    Ok(content)
}

fn detect_language_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let language = value.as_str().map_or("", detect_language);
    Ok(Value::String(language.to_string()))
}

/// Joins a list with `", "`, or yields the `empty` argument for an empty list.
fn list_or_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
            .collect(),
        Value::Null => Vec::new(),
        other => return Ok(other.clone()),
    };

    if items.is_empty() {
        let fallback = args.get("empty").and_then(Value::as_str).unwrap_or("none");
        return Ok(Value::String(fallback.to_string()));
    }

    Ok(Value::String(items.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_python;
    use assert_fs::prelude::*;

    fn engine() -> PromptEngine {
        PromptEngine::new(&Config::default()).unwrap()
    }

    #[test]
    fn test_builtin_templates_compile() {
        let engine = engine();
        for kind in PromptKind::all() {
            assert!(engine.tera.get_template_names().any(|n| n == kind.id()));
        }
    }

    #[test]
    fn test_render_generate_prompt() {
        let analysis = analyze_python("api.py", "class Api:\n    def ask(self):\n        pass\n");
        let context = GenerateContext {
            batch_index: 1,
            batch_count: 1,
            files: vec![SourceView {
                path: "api.py",
                lines: 3,
                content: "class Api:\n    def ask(self):\n        pass",
                analysis: Some(&analysis),
            }],
        };

        let prompt = engine().render(PromptKind::GenerateQa, &context).unwrap();
        assert!(prompt.contains("## api.py (3 lines)"));
        assert!(prompt.contains("```python\nclass Api:"));
        assert!(prompt.contains("Classes: Api"));
        assert!(prompt.contains("Functions and methods: Api.ask"));
        assert!(prompt.contains("Imports: No imports"));
        assert!(prompt.contains("JSON array"));
        assert!(!prompt.contains("part 1 of"));
    }

    #[test]
    fn test_render_generate_prompt_for_batch() {
        let context = GenerateContext {
            batch_index: 2,
            batch_count: 3,
            files: vec![SourceView {
                path: "README.md",
                lines: 1,
                content: "# Title",
                analysis: None,
            }],
        };

        let prompt = engine().render(PromptKind::GenerateQa, &context).unwrap();
        assert!(prompt.contains("part 2 of 3"));
        assert!(!prompt.contains("Classes:"));
    }

    #[test]
    fn test_render_refine_prompt() {
        let pairs = vec![QaPair::new("What is X?", "It is \"Y\".")];
        let prompt = engine()
            .render(PromptKind::RefineQa, &RefineContext { pairs: &pairs })
            .unwrap();

        assert!(prompt.contains("1 question-answer pair were"));
        assert!(prompt.contains(r#""question": "What is X?""#));
        assert!(prompt.contains(r#"It is \"Y\"."#));
    }

    #[test]
    fn test_render_answer_prompt_fallbacks() {
        let context = AnswerContext {
            file_name: "app.py",
            classes: &[],
            functions: vec!["ask_api"],
            imports: &[],
            common_functions: "There are no functions shared between files.".to_string(),
            question: "What does app.py do?",
        };

        let prompt = engine().render(PromptKind::AnswerQuestion, &context).unwrap();
        assert!(prompt.contains("- Classes: No classes"));
        assert!(prompt.contains("- Functions and Methods: ask_api"));
        assert!(prompt.contains("- Imports: No imports"));
        assert!(prompt.contains("Question: What does app.py do?"));
    }

    #[test]
    fn test_request_carries_system_prompt() {
        let config = Config::builder().temperature(0.3).build().unwrap();
        let engine = PromptEngine::new(&config).unwrap();
        let request = engine
            .request(&config, PromptKind::ReinterpretDiagram, &ReinterpretContext {
                diagram: "classDiagram\n  A --> B",
            })
            .unwrap();

        assert_eq!(request.system, PromptKind::ReinterpretDiagram.system_prompt());
        assert!(request.prompt.contains("A --> B"));
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_override_replaces_builtin() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("reinterpret_diagram.tera")
            .write_str("FIX: {{ diagram }}")
            .unwrap();

        let config = Config::builder().prompt_dir(temp.path()).build().unwrap();
        let engine = PromptEngine::new(&config).unwrap();
        let prompt = engine
            .render(PromptKind::ReinterpretDiagram, &ReinterpretContext { diagram: "graph TD" })
            .unwrap();

        assert_eq!(prompt, "FIX: graph TD");
    }

    #[test]
    fn test_override_validation() {
        let temp = assert_fs::TempDir::new().unwrap();

        let empty = temp.child("empty.tera");
        empty.write_str("  \n ").unwrap();
        let err = validate_override(PromptKind::RefineQa, empty.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));

        let broken = temp.child("broken.tera");
        broken.write_str("{% if pairs %}\nUnclosed if").unwrap();
        assert!(validate_override(PromptKind::RefineQa, broken.path()).unwrap_err().is_config());

        let unused = temp.child("unused.tera");
        unused.write_str("Improve these.").unwrap();
        let err = validate_override(PromptKind::RefineQa, unused.path()).unwrap_err();
        assert!(err.to_string().contains("never references pairs"));

        let large = temp.child("large.tera");
        large.write_str(&"x".repeat((MAX_TEMPLATE_SIZE + 1) as usize)).unwrap();
        let err = validate_override(PromptKind::RefineQa, large.path()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_list_or_filter() {
        let args = HashMap::from([("empty".to_string(), Value::String("none here".into()))]);

        let list = serde_json::json!(["a", "b"]);
        assert_eq!(list_or_filter(&list, &args).unwrap(), Value::String("a, b".into()));

        let empty = serde_json::json!([]);
        assert_eq!(list_or_filter(&empty, &args).unwrap(), Value::String("none here".into()));
    }

    #[test]
    fn test_detect_language_filter() {
        let value = Value::String("pkg/mod.py".into());
        let result = detect_language_filter(&value, &HashMap::new()).unwrap();
        assert_eq!(result.as_str(), Some("python"));
    }
}
