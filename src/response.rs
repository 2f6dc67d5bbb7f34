//! Conversion of raw model output into typed values.
//!
//! Models wrap their answers in prose and Markdown fences. Everything here
//! strips that packaging, then validates strictly: a response that does not
//! match the expected shape is an [`Error::Parse`], never a partial result.

use crate::{
    diagram::DiagramKind,
    error::{Error, Result},
    qa::QaPair,
};
use serde_json::Value;

/// Returns the contents of the first fenced code block, or the trimmed text
/// if there is none.
///
/// When `preferred` is given, a block tagged with that language wins over
/// earlier untagged blocks.
#[must_use]
pub fn strip_code_fences<'a>(text: &'a str, preferred: Option<&str>) -> &'a str {
    let blocks = fenced_blocks(text);

    let chosen = preferred
        .and_then(|lang| blocks.iter().find(|(tag, _)| tag.eq_ignore_ascii_case(lang)))
        .or_else(|| blocks.first());

    chosen.map_or_else(|| text.trim(), |(_, body)| body.trim())
}

fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(line_end) = after.find('\n') else {
            break;
        };
        let tag = after[..line_end].trim();
        let body_start = &after[line_end + 1..];

        match body_start.find("```") {
            Some(end) => {
                blocks.push((tag, &body_start[..end]));
                rest = &body_start[end + 3..];
            }
            None => {
                // Unclosed fence: take the remainder
                blocks.push((tag, body_start));
                break;
            }
        }
    }

    blocks
}

/// Parses question-answer pairs from a model response.
///
/// Accepts a JSON array of `{question, answer}` objects or an object with a
/// `pairs` array, optionally surrounded by prose or code fences.
///
/// # Errors
///
/// Returns [`Error::Parse`] if no JSON is found or an element lacks a
/// non-empty `question` or `answer` string. An empty array is a valid answer
/// for a context with nothing worth asking about.
pub fn parse_qa_pairs(text: &str) -> Result<Vec<QaPair>> {
    let value = extract_json(strip_code_fences(text, Some("json")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("pairs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::parse(
                    "expected a JSON array of pairs or an object with a 'pairs' array",
                ));
            }
        },
        other => {
            return Err(Error::parse(format!(
                "expected a JSON array of pairs, got {}",
                json_type(&other)
            )));
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_pair(index, item))
        .collect()
}

fn parse_pair(index: usize, item: &Value) -> Result<QaPair> {
    let field = |name: &str| {
        item.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::parse(format!("pair {index} has no non-empty '{name}' string"))
            })
    };

    Ok(QaPair::new(field("question")?, field("answer")?))
}

/// Finds the outermost JSON value in `text`.
fn extract_json(text: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    let start = text
        .find(['[', '{'])
        .ok_or_else(|| Error::parse("response contains no JSON"))?;
    let close = if text.as_bytes()[start] == b'[' { ']' } else { '}' };
    let end = text
        .rfind(close)
        .filter(|&end| end > start)
        .ok_or_else(|| Error::parse("response contains unterminated JSON"))?;

    serde_json::from_str(&text[start..=end])
        .map_err(|e| Error::parse(format!("response JSON is invalid: {e}")))
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extracts Mermaid diagram text from a model response.
///
/// Fences are removed and any prose before the diagram header is dropped.
///
/// # Errors
///
/// Returns [`Error::Parse`] if no line declares a known diagram type.
pub fn extract_diagram(text: &str) -> Result<String> {
    let body = strip_code_fences(text, Some("mermaid"));

    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if DiagramKind::from_header(line.trim()).is_some() {
            return Ok(body[offset..].trim().to_string());
        }
        offset += line.len();
    }

    Err(Error::parse("response does not declare a Mermaid diagram type"))
}

/// Returns the trimmed free-text answer.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the answer is blank.
pub fn parse_answer(text: &str) -> Result<String> {
    let answer = text.trim();
    if answer.is_empty() {
        return Err(Error::parse("answer is empty"));
    }
    Ok(answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let pairs = parse_qa_pairs(
            r#"[{"question": "What does function X do?", "answer": "It returns Y"}]"#,
        )
        .unwrap();

        assert_eq!(pairs, vec![QaPair::new("What does function X do?", "It returns Y")]);
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let text = "Here are the pairs:\n\n```json\n[\n  {\"question\": \"Q1\", \"answer\": \"A1\"},\n  {\"question\": \"Q2\", \"answer\": \"A2\"}\n]\n```\nLet me know!";
        let pairs = parse_qa_pairs(text).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].answer, "A2");
    }

    #[test]
    fn test_parse_object_with_pairs() {
        let pairs = parse_qa_pairs(r#"{"pairs": [{"question": "Q", "answer": "A"}]}"#).unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_parse_json_after_prose_without_fence() {
        let pairs =
            parse_qa_pairs("Sure! [{\"question\": \"Q\", \"answer\": \"A\"}] Done.").unwrap();
        assert_eq!(pairs[0].question, "Q");
    }

    #[test]
    fn test_rejects_missing_field() {
        let err = parse_qa_pairs(r#"[{"question": "Q", "answer": "A"}, {"question": "Q2"}]"#)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("pair 1"));
    }

    #[test]
    fn test_rejects_blank_answer() {
        let err = parse_qa_pairs(r#"[{"question": "Q", "answer": "   "}]"#).unwrap_err();
        assert!(err.is_request());
    }

    #[test]
    fn test_empty_array_is_no_pairs() {
        assert!(parse_qa_pairs("[]").unwrap().is_empty());
        assert!(parse_qa_pairs("```json\n{\"pairs\": []}\n```").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(parse_qa_pairs("I could not find any questions.").is_err());
        assert!(parse_qa_pairs("\"just a string\"").is_err());
        assert!(parse_qa_pairs(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("  plain  ", None), "plain");
        assert_eq!(strip_code_fences("```\nbody\n```", None), "body");
        assert_eq!(
            strip_code_fences("```text\nnote\n```\n```mermaid\ngraph TD\n```", Some("mermaid")),
            "graph TD"
        );
        assert_eq!(strip_code_fences("```json\n[1]", None), "[1]");
    }

    #[test]
    fn test_extract_diagram_from_fence() {
        let text = "Here is the diagram:\n```mermaid\nclassDiagram\n    A <|-- B\n```\n";
        assert_eq!(extract_diagram(text).unwrap(), "classDiagram\n    A <|-- B");
    }

    #[test]
    fn test_extract_diagram_drops_preamble() {
        let text = "Sure, the diagram follows.\n\nclassDiagram\n    class Api\n";
        assert_eq!(extract_diagram(text).unwrap(), "classDiagram\n    class Api");
    }

    #[test]
    fn test_extract_diagram_requires_header() {
        let err = extract_diagram("I cannot draw that.").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("  It loads files.\n").unwrap(), "It loads files.");
        assert!(parse_answer(" \n ").is_err());
    }
}
