//! Mermaid diagram descriptions.
//!
//! [`DiagramSpec`] only exists for text that passed validation, so every
//! stage that holds one can write or render it without checking again.

use crate::{
    analysis::CodebaseAnalysis,
    error::{Error, Result},
};
use std::borrow::Cow;
use std::fmt::{self, Write as _};

/// Diagram types accepted by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramKind {
    /// `classDiagram`
    Class,
    /// `flowchart` or `graph`
    Flowchart,
    /// `sequenceDiagram`
    Sequence,
    /// `stateDiagram` or `stateDiagram-v2`
    State,
    /// `erDiagram`
    EntityRelationship,
}

impl DiagramKind {
    /// Recognizes the header line of a diagram.
    #[must_use]
    pub fn from_header(line: &str) -> Option<Self> {
        let keyword = line.split_whitespace().next()?;
        match keyword {
            "classDiagram" | "classDiagram-v2" => Some(Self::Class),
            "flowchart" | "graph" => Some(Self::Flowchart),
            "sequenceDiagram" => Some(Self::Sequence),
            "stateDiagram" | "stateDiagram-v2" => Some(Self::State),
            "erDiagram" => Some(Self::EntityRelationship),
            _ => None,
        }
    }

    /// Arrow tokens that make a line a relationship.
    const fn arrows(self) -> &'static [&'static str] {
        match self {
            Self::Class => &[
                "<|--", "--|>", "<|..", "..|>", "*--", "--*", "o--", "--o", "-->", "<--",
                "..>", "<..", "--", "..",
            ],
            Self::Flowchart => &["-.->", "==>", "-->", "---", "-.-", "==="],
            Self::Sequence => &["-->>", "->>", "--x", "-x", "--)", "-)", "-->", "->"],
            Self::State => &["-->"],
            Self::EntityRelationship => &["--", ".."],
        }
    }
}

/// A validated Mermaid diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSpec {
    kind: DiagramKind,
    text: String,
}

impl DiagramSpec {
    /// Validates diagram text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if the header is missing or unknown, the body
    /// is empty, brackets or quotes are unbalanced, or a relationship line is
    /// missing one of its ends.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(n, line)| (n + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with("%%"));

        let (_, header) = lines
            .next()
            .ok_or_else(|| Error::render("diagram text is empty"))?;

        let kind = DiagramKind::from_header(header).ok_or_else(|| {
            Error::render(format!("missing or unknown diagram header: '{header}'"))
        })?;

        let body: Vec<(usize, &str)> = lines.collect();
        if body.is_empty() {
            return Err(Error::render("diagram has no body"));
        }

        check_balance(kind, text)?;

        let mut block_depth = 0usize;
        for (number, line) in body {
            if block_depth == 0 {
                check_relationship(kind, number, line)?;
            }
            let line = structural(kind, line);
            block_depth = (block_depth + line.matches('{').count())
                .saturating_sub(line.matches('}').count());
        }

        Ok(Self {
            kind,
            text: format!("{text}\n"),
        })
    }

    /// Returns the diagram type.
    #[must_use]
    pub const fn kind(&self) -> DiagramKind {
        self.kind
    }

    /// Returns the diagram text, ending in a newline.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for DiagramSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Reduces a line to the characters that take part in bracket matching.
///
/// ER cardinality markers such as `}o` and `|{` are blanked. Sequence message
/// and note text after ':' is dropped, as are async `-)` arrows. The `>` that
/// opens a flowchart asymmetric node (`A>label]`) is read as `[`.
fn structural(kind: DiagramKind, line: &str) -> Cow<'_, str> {
    match kind {
        DiagramKind::EntityRelationship if line.contains("--") || line.contains("..") => {
            let mut cleaned = line.to_string();
            for marker in ["}o", "}|", "o{", "|{"] {
                cleaned = cleaned.replace(marker, "  ");
            }
            Cow::Owned(cleaned)
        }
        DiagramKind::Sequence => {
            let head = line.split_once(':').map_or(line, |(head, _)| head);
            if head.contains("-)") {
                // Async arrow, not a bracket
                Cow::Owned(head.replace("-)", "  "))
            } else {
                Cow::Borrowed(head)
            }
        }
        DiagramKind::Flowchart => asymmetric_nodes(line),
        _ => Cow::Borrowed(line),
    }
}

fn asymmetric_nodes(line: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut in_label = false;
    let mut previous = ' ';
    let mut changed = false;

    for c in line.chars() {
        let mut kept = c;
        match c {
            '"' => in_quote = !in_quote,
            _ if in_quote => {}
            // Edge labels: A -->|text| B
            '|' => in_label = !in_label,
            _ if in_label => {}
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            '>' if depth == 0 && (previous.is_alphanumeric() || previous == '_') => {
                kept = '[';
                depth += 1;
                changed = true;
            }
            _ => {}
        }
        out.push(kept);
        previous = c;
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(line)
    }
}

fn check_balance(kind: DiagramKind, text: &str) -> Result<()> {
    let mut stack = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        if line.trim_start().starts_with("%%") {
            continue;
        }
        let line = structural(kind, line);

        let mut in_quote = false;
        for c in line.chars() {
            if c == '"' {
                in_quote = !in_quote;
                continue;
            }
            if in_quote {
                continue;
            }

            match c {
                '{' | '[' | '(' => stack.push((c, number)),
                '}' | ']' | ')' => {
                    let expected = match c {
                        '}' => '{',
                        ']' => '[',
                        _ => '(',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Err(Error::render(format!(
                                "unbalanced '{c}' on line {number}"
                            )));
                        }
                    }
                }
                _ => {}
            }
        }

        if in_quote {
            return Err(Error::render(format!(
                "unterminated quote on line {number}"
            )));
        }
    }

    match stack.pop() {
        Some((open, number)) => Err(Error::render(format!(
            "'{open}' opened on line {number} is never closed"
        ))),
        None => Ok(()),
    }
}

fn check_relationship(kind: DiagramKind, number: usize, line: &str) -> Result<()> {
    let Some((arrow, position)) = find_arrow(kind, line) else {
        return Ok(());
    };

    let left = line[..position].trim();
    let rest = &line[position + arrow.len()..];
    // Sequence messages and labelled relations put text after ':'
    let right = rest.split_once(':').map_or(rest, |(target, _)| target).trim();

    let blank = |side: &str| {
        side.trim_matches(|c: char| c == '"' || c.is_whitespace())
            .is_empty()
    };

    if blank(left) || blank(right) {
        return Err(Error::render(format!(
            "malformed relationship on line {number}: '{line}'"
        )));
    }

    Ok(())
}

fn find_arrow(kind: DiagramKind, line: &str) -> Option<(&'static str, usize)> {
    // Arrows inside labels do not count. Byte offsets must match `line`.
    let mut unquoted = String::with_capacity(line.len());
    let mut in_quote = false;
    for c in line.chars() {
        if c == '"' {
            in_quote = !in_quote;
        }
        if in_quote || c == '"' {
            unquoted.extend(std::iter::repeat_n(' ', c.len_utf8()));
        } else {
            unquoted.push(c);
        }
    }

    kind.arrows()
        .iter()
        .filter_map(|arrow| unquoted.find(arrow).map(|pos| (*arrow, pos)))
        .min_by_key(|(arrow, pos)| (*pos, std::cmp::Reverse(arrow.len())))
}

/// Generates a class diagram from the structure analysis.
///
/// Each class lists its methods, standalone functions are grouped under a
/// class named after their file, a file is linked to its first class with
/// `contains`, and every import becomes a `..>` dependency on the last
/// segment of the imported path.
///
/// # Errors
///
/// Returns [`Error::Render`] if the analysis holds nothing to draw.
pub fn class_diagram(analysis: &CodebaseAnalysis) -> Result<DiagramSpec> {
    let mut out = String::from("classDiagram\n");

    for file in &analysis.files {
        let file_id = identifier(file.module_name());

        for class in &file.classes {
            let _ = writeln!(out, "    class {} {{", identifier(class));
            for method in file.methods_of(class) {
                let _ = writeln!(out, "        +{method}()");
            }
            out.push_str("    }\n");
        }

        if let Some(first) = file.classes.first() {
            let _ = writeln!(out, "    {file_id} -- {} : contains", identifier(first));
        }

        let standalone = file.standalone_functions();
        if !standalone.is_empty() {
            let _ = writeln!(out, "    class {file_id} {{");
            for function in standalone {
                let _ = writeln!(out, "        +{function}()");
            }
            out.push_str("    }\n");
        }

        for import in &file.imports {
            let module = import.rsplit('.').next().unwrap_or(import);
            let _ = writeln!(out, "    {file_id} ..> {} : imports", identifier(module));
        }
    }

    DiagramSpec::parse(&out)
}

/// Makes a name usable as a Mermaid class identifier.
fn identifier(name: &str) -> String {
    let mut id: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if id.is_empty() || id.starts_with(|c: char| c.is_ascii_digit()) {
        id.insert(0, '_');
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_python;

    #[test]
    fn test_parse_class_diagram() {
        let spec = DiagramSpec::parse(
            "classDiagram\n    class Api {\n        +ask()\n    }\n    app ..> Api : imports\n",
        )
        .unwrap();
        assert_eq!(spec.kind(), DiagramKind::Class);
        assert!(spec.as_str().ends_with("imports\n"));
    }

    #[test]
    fn test_parse_other_kinds() {
        let cases = [
            ("flowchart TD\n    A[Load] --> B[Ask]", DiagramKind::Flowchart),
            ("graph LR\n    A --- B", DiagramKind::Flowchart),
            ("sequenceDiagram\n    Alice->>Bob: Hello", DiagramKind::Sequence),
            ("stateDiagram-v2\n    [*] --> Idle", DiagramKind::State),
            ("erDiagram\n    USER ||--o{ ORDER : places", DiagramKind::EntityRelationship),
        ];

        for (text, kind) in cases {
            assert_eq!(DiagramSpec::parse(text).unwrap().kind(), kind, "{text}");
        }
    }

    #[test]
    fn test_leading_comments_are_skipped() {
        let spec = DiagramSpec::parse("%% generated\n\nclassDiagram\n    A <|-- B").unwrap();
        assert_eq!(spec.kind(), DiagramKind::Class);
    }

    #[test]
    fn test_rejects_missing_header() {
        let err = DiagramSpec::parse("    A --> B").unwrap_err();
        assert!(err.is_render());
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_rejects_empty_text_and_body() {
        assert!(DiagramSpec::parse("   \n").unwrap_err().is_render());
        assert!(DiagramSpec::parse("classDiagram\n").unwrap_err().is_render());
    }

    #[test]
    fn test_rejects_unbalanced_braces() {
        let err = DiagramSpec::parse("classDiagram\n    class Api {\n        +ask()\n").unwrap_err();
        assert!(err.is_render());
        assert!(err.to_string().contains("never closed"));

        let err = DiagramSpec::parse("flowchart TD\n    A[Load) --> B").unwrap_err();
        assert!(err.to_string().contains("unbalanced"));
    }

    #[test]
    fn test_rejects_unterminated_quote() {
        let err = DiagramSpec::parse("flowchart TD\n    A[\"Load] --> B").unwrap_err();
        assert!(err.to_string().contains("quote"));
    }

    #[test]
    fn test_rejects_dangling_relationship() {
        let err = DiagramSpec::parse("classDiagram\n    app ..> : imports").unwrap_err();
        assert!(err.to_string().contains("malformed relationship"));

        let err = DiagramSpec::parse("flowchart TD\n    A -->").unwrap_err();
        assert!(err.is_render());
    }

    #[test]
    fn test_brackets_inside_labels_are_ignored() {
        let spec = DiagramSpec::parse("flowchart TD\n    A[\"call f(x\"] --> B");
        assert!(spec.is_ok());
    }

    #[test]
    fn test_flowchart_asymmetric_node() {
        let spec = DiagramSpec::parse("graph TD\n    A>Flag] --> B(Round)\n    B -->|a>b| C>Done]");
        assert_eq!(spec.unwrap().kind(), DiagramKind::Flowchart);

        let err = DiagramSpec::parse("graph TD\n    A>Flag --> B").unwrap_err();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn test_sequence_message_text_is_free_form() {
        let spec = DiagramSpec::parse(
            "sequenceDiagram\n    Alice->>Bob: call (maybe\n    Note right of Bob: returns [x\n    Bob--)Alice: done)",
        );
        assert_eq!(spec.unwrap().kind(), DiagramKind::Sequence);

        let err = DiagramSpec::parse("sequenceDiagram\n    rect rgb(0, 0, 255\n    Alice->>Bob: hi")
            .unwrap_err();
        assert!(err.is_render());
    }

    #[test]
    fn test_class_diagram_from_analysis() {
        let api = analyze_python(
            "src/api.py",
            "import os\nfrom sklearn.neighbors import NearestNeighbors\n\nclass SemanticSearch:\n    def fit(self):\n        pass\n\ndef preprocess(text):\n    return text\n",
        );
        let app = analyze_python("src/app.py", "import gradio\n\ndef ask_api():\n    pass\n");
        let analysis = CodebaseAnalysis::from_analyses(vec![api, app]);

        let spec = class_diagram(&analysis).unwrap();
        let text = spec.as_str();

        assert!(text.starts_with("classDiagram\n"));
        assert!(text.contains("    class SemanticSearch {\n        +fit()\n    }\n"));
        assert!(text.contains("    api -- SemanticSearch : contains\n"));
        assert!(text.contains("    class api {\n        +preprocess()\n    }\n"));
        assert!(text.contains("    api ..> NearestNeighbors : imports\n"));
        assert!(text.contains("    app ..> gradio : imports\n"));
        assert!(text.contains("        +ask_api()\n"));
        assert!(!text.contains("+fit()\n        +preprocess"));
    }

    #[test]
    fn test_class_diagram_of_empty_analysis_fails() {
        let err = class_diagram(&CodebaseAnalysis::default()).unwrap_err();
        assert!(err.is_render());
    }

    #[test]
    fn test_identifier_sanitizing() {
        assert_eq!(identifier("my-module"), "my_module");
        assert_eq!(identifier("2fa"), "_2fa");
        assert_eq!(identifier("ok_name"), "ok_name");
    }
}
