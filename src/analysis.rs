//! Structural analysis of Python sources.
//!
//! A line scanner, not a parser: it tracks indentation to attribute `def`
//! statements to their enclosing class, strips comments and string literals
//! before matching, and follows bracketed continuation lines. That is enough
//! to describe classes, methods, imports and call sites for prompts and
//! diagrams.

use crate::file::SourceFile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^class\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));
static DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^import\s+(.+)$").expect("valid regex"));
static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^from\s+([A-Za-z0-9_.]+)\s+import\s+(.+)$").expect("valid regex")
});
static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex"));

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "as", "assert", "await", "class", "def", "del", "elif", "else", "except",
        "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not",
        "or", "raise", "return", "while", "with", "yield",
    ]
    .into_iter()
    .collect()
});

/// Structure extracted from one Python file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Path relative to the codebase root
    pub path: String,

    /// Class names in order of appearance
    pub classes: Vec<String>,

    /// Functions; methods are qualified as `Class.method`
    pub functions: BTreeSet<String>,

    /// Imported modules and names
    pub imports: Vec<String>,

    /// Call counts keyed by callee name
    pub calls: BTreeMap<String, usize>,
}

impl FileAnalysis {
    /// Returns the file name without directories.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns the file name without extension.
    #[must_use]
    pub fn module_name(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map_or(name, |(stem, _)| stem)
    }

    /// Returns the method names of `class`, unqualified.
    #[must_use]
    pub fn methods_of(&self, class: &str) -> Vec<&str> {
        self.functions
            .iter()
            .filter_map(|f| f.split_once('.'))
            .filter(|(owner, _)| *owner == class)
            .map(|(_, method)| method)
            .collect()
    }

    /// Returns functions that do not belong to a class.
    #[must_use]
    pub fn standalone_functions(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| !f.contains('.'))
            .map(String::as_str)
            .collect()
    }
}

/// Analysis of every Python file in a codebase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebaseAnalysis {
    /// Per-file results, in load order
    pub files: Vec<FileAnalysis>,

    /// Functions defined in more than one file, with the files defining them
    pub common_functions: BTreeMap<String, Vec<String>>,
}

impl CodebaseAnalysis {
    /// Analyzes all Python files among `files`.
    #[must_use]
    pub fn from_files(files: &[SourceFile]) -> Self {
        let analyses: Vec<FileAnalysis> = files
            .iter()
            .filter(|f| f.is_python())
            .map(|f| analyze_python(&f.relative_path, &f.content))
            .collect();

        debug!(
            "Analyzed {} Python file(s) out of {} loaded",
            analyses.len(),
            files.len()
        );

        Self::from_analyses(analyses)
    }

    /// Builds the codebase view from per-file results.
    #[must_use]
    pub fn from_analyses(files: Vec<FileAnalysis>) -> Self {
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in &files {
            for function in &file.functions {
                owners
                    .entry(function.clone())
                    .or_default()
                    .push(file.path.clone());
            }
        }
        owners.retain(|_, paths| paths.len() > 1);

        Self {
            files,
            common_functions: owners,
        }
    }

    /// Returns true if no Python file was analyzed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Finds the first file whose name occurs in `text`, ignoring case.
    #[must_use]
    pub fn find_mentioned(&self, text: &str) -> Option<&FileAnalysis> {
        let text = text.to_lowercase();
        self.files
            .iter()
            .find(|f| text.contains(&f.file_name().to_lowercase()))
    }

    /// Describes the shared functions in one line.
    #[must_use]
    pub fn common_functions_summary(&self) -> String {
        if self.files.len() < 2 {
            return "Not enough files to compare functions.".to_string();
        }
        if self.common_functions.is_empty() {
            return "There are no functions shared between files.".to_string();
        }

        self.common_functions
            .iter()
            .map(|(name, paths)| format!("{name} ({})", paths.join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug)]
enum Scope {
    Class(String),
    Function,
}

/// Extracts classes, functions, imports and calls from Python source text.
#[must_use]
pub fn analyze_python(path: &str, source: &str) -> FileAnalysis {
    let mut analysis = FileAnalysis {
        path: path.to_string(),
        ..FileAnalysis::default()
    };

    let mut scopes: Vec<(usize, Scope)> = Vec::new();
    let mut triple_quote: Option<char> = None;
    let mut depth: i32 = 0;
    let mut pending_from: Option<(String, String)> = None;

    for raw in source.lines() {
        let inside_string = triple_quote.is_some();
        let line = sanitize_line(raw, &mut triple_quote);
        let code = line.trim();
        if code.is_empty() {
            continue;
        }

        // The tail of a multi-line string says nothing about indentation.
        if inside_string {
            depth = (depth + bracket_delta(code)).max(0);
            count_calls(&mut analysis.calls, code);
            continue;
        }

        if let Some((module, mut names)) = pending_from.take() {
            names.push(' ');
            names.push_str(code);
            if code.contains(')') {
                push_from_imports(&mut analysis.imports, &module, &names);
            } else {
                pending_from = Some((module, names));
            }
            depth = (depth + bracket_delta(code)).max(0);
            continue;
        }

        let continuation = depth > 0;
        depth = (depth + bracket_delta(code)).max(0);

        if continuation {
            count_calls(&mut analysis.calls, code);
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        while scopes.last().is_some_and(|(level, _)| *level >= indent) {
            scopes.pop();
        }

        if let Some(caps) = CLASS_RE.captures(code) {
            let name = caps[1].to_string();
            let rest = &code[caps.get(0).map_or(0, |m| m.end())..];
            count_calls(&mut analysis.calls, rest);
            analysis.classes.push(name.clone());
            scopes.push((indent, Scope::Class(name)));
        } else if let Some(caps) = DEF_RE.captures(code) {
            let name = &caps[1];
            let owner = scopes.iter().rev().find_map(|(_, scope)| match scope {
                Scope::Class(class) => Some(class.as_str()),
                Scope::Function => None,
            });
            let qualified = owner.map_or_else(|| name.to_string(), |class| format!("{class}.{name}"));
            analysis.functions.insert(qualified);

            let rest = &code[caps.get(0).map_or(0, |m| m.end())..];
            count_calls(&mut analysis.calls, rest);
            scopes.push((indent, Scope::Function));
        } else if let Some(caps) = FROM_RE.captures(code) {
            let module = caps[1].to_string();
            let names = caps[2].to_string();
            if names.trim_start().starts_with('(') && !names.contains(')') {
                pending_from = Some((module, names));
            } else {
                push_from_imports(&mut analysis.imports, &module, &names);
            }
        } else if let Some(caps) = IMPORT_RE.captures(code) {
            for part in caps[1].split(',') {
                let name = strip_alias(part);
                if !name.is_empty() {
                    analysis.imports.push(name.to_string());
                }
            }
        } else {
            count_calls(&mut analysis.calls, code);
        }
    }

    analysis.functions = filter_class_methods(analysis.functions);
    analysis
}

/// Drops bare function names that also exist as a qualified class method.
fn filter_class_methods(functions: BTreeSet<String>) -> BTreeSet<String> {
    let method_names: HashSet<String> = functions
        .iter()
        .filter_map(|f| f.rsplit_once('.').map(|(_, m)| m.to_string()))
        .collect();

    functions
        .into_iter()
        .filter(|f| f.contains('.') || !method_names.contains(f))
        .collect()
}

fn push_from_imports(imports: &mut Vec<String>, module: &str, names: &str) {
    let module = module.trim_start_matches('.');
    let names = names.replace(['(', ')'], " ");

    for part in names.split(',') {
        let name = strip_alias(part);
        if name.is_empty() {
            continue;
        }
        if module.is_empty() {
            imports.push(name.to_string());
        } else {
            imports.push(format!("{module}.{name}"));
        }
    }
}

fn strip_alias(part: &str) -> &str {
    let part = part.trim();
    part.split_once(" as ").map_or(part, |(name, _)| name.trim())
}

fn count_calls(calls: &mut BTreeMap<String, usize>, code: &str) {
    for caps in CALL_RE.captures_iter(code) {
        let name = &caps[1];
        if KEYWORDS.contains(name) {
            continue;
        }
        *calls.entry(name.to_string()).or_insert(0) += 1;
    }
}

fn bracket_delta(code: &str) -> i32 {
    code.chars().fold(0, |acc, c| match c {
        '(' | '[' | '{' => acc + 1,
        ')' | ']' | '}' => acc - 1,
        _ => acc,
    })
}

/// Removes comments and the contents of string literals from one line.
///
/// `triple_quote` carries an open `"""`/`'''` string across lines. Literals
/// are replaced by an empty pair of quotes so brackets around them survive.
fn sanitize_line(line: &str, triple_quote: &mut Option<char>) -> String {
    let chars: Vec<char> = line.chars().collect();
    let is_triple = |i: usize, q: char| {
        i + 2 < chars.len() && chars[i] == q && chars[i + 1] == q && chars[i + 2] == q
    };

    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        if let Some(q) = *triple_quote {
            if is_triple(i, q) {
                *triple_quote = None;
                out.push(q);
                out.push(q);
                i += 3;
            } else {
                i += 1;
            }
            continue;
        }

        let c = chars[i];
        match c {
            '#' => break,
            '"' | '\'' if is_triple(i, c) => {
                *triple_quote = Some(c);
                i += 3;
            }
            '"' | '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                out.push(c);
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}
