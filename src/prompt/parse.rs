//! Turns raw model output back into a typed [`GenerationResult`].
//!
//! A completion that simply lacks the structure a mode invites (no `Action:`
//! in tool mode, no citations in RAG mode) is a valid outcome. Only broken
//! structure or references to tools/documents the request never supplied
//! are errors.

use super::template::{
    ACTION_MARKER, CITATION_CLOSE, CITATION_OPEN, DIRECTLY_ANSWER, GROUNDED_ANSWER_MARKER,
    STOP_MARKERS,
};
use super::types::{Document, Request, ToolSpec};
use crate::error::{Error, Result};
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationResult {
    PlainText {
        text: String,
    },
    ToolCall {
        name: String,
        arguments: Map<String, Value>,
    },
    GroundedAnswer {
        text: String,
        citations: Vec<Citation>,
    },
}

impl GenerationResult {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    /// Prose carried by the result; empty for a tool call.
    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::GroundedAnswer { text, .. } => text,
            Self::ToolCall { .. } => "",
        }
    }
}

/// A cited span of the answer. `start..end` are byte offsets into the answer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub document_id: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

pub fn parse(request: &Request, raw: &str) -> Result<GenerationResult> {
    match request {
        Request::Completion { .. } => Ok(GenerationResult::plain(strip_stop_markers(raw))),
        Request::Chat { .. } => Ok(parse_plain(raw)),
        Request::Tool { tools, .. } => parse_tool_call(raw, tools),
        Request::Rag { documents, .. } => parse_grounded(raw, documents),
    }
}

/// Cuts the completion at the first stop marker. Everything before it is kept as is.
pub fn strip_stop_markers(raw: &str) -> &str {
    let cut = STOP_MARKERS
        .iter()
        .filter_map(|marker| raw.find(marker))
        .min()
        .unwrap_or(raw.len());
    &raw[..cut]
}

/// Assistant reply: cut at the stop marker, surrounding whitespace dropped.
pub fn parse_plain(raw: &str) -> GenerationResult {
    GenerationResult::plain(strip_stop_markers(raw).trim())
}

#[derive(Deserialize)]
struct Action {
    #[serde(alias = "name")]
    tool_name: String,
    #[serde(default, alias = "arguments")]
    parameters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Actions {
    Many(Vec<Action>),
    One(Action),
}

pub fn parse_tool_call(raw: &str, known_tools: &[ToolSpec]) -> Result<GenerationResult> {
    let text = strip_stop_markers(raw).trim();
    let Some(marker) = find_action_marker(text) else {
        return Ok(GenerationResult::plain(text));
    };

    let preface = text[..marker].trim();
    let json = action_payload(&text[marker + ACTION_MARKER.len()..])?;

    let actions = match serde_json::from_str::<Actions>(json) {
        Ok(Actions::Many(actions)) => actions,
        Ok(Actions::One(action)) => vec![action],
        Err(e) => {
            return Err(Error::malformed_completion(format!(
                "action list is not valid JSON: {e}"
            )));
        }
    };

    let user_defines_direct_answer = known_tools.iter().any(|t| t.name == DIRECTLY_ANSWER);
    let is_builtin = |name: &str| name == DIRECTLY_ANSWER && !user_defines_direct_answer;

    for action in &actions {
        if !is_builtin(&action.tool_name) && !known_tools.iter().any(|t| t.name == action.tool_name)
        {
            return Err(Error::unknown_tool(&action.tool_name));
        }
    }

    let mut actions = actions.into_iter();
    let Some(first) = actions.next() else {
        debug!("empty action list, treating completion as a direct answer");
        return Ok(GenerationResult::plain(preface));
    };
    if is_builtin(&first.tool_name) {
        debug!("model chose {DIRECTLY_ANSWER}");
        return Ok(GenerationResult::plain(preface));
    }
    let dropped: Vec<String> = actions.map(|a| a.tool_name).collect();
    if !dropped.is_empty() {
        warn!(
            tool = %first.tool_name,
            ?dropped,
            "completion requested several actions, returning the first"
        );
    }

    let arguments = match first.parameters {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(Error::malformed_completion(format!(
                "parameters for '{}' must be a JSON object, got {other}",
                first.tool_name
            )));
        }
    };

    Ok(GenerationResult::ToolCall {
        name: first.tool_name,
        arguments,
    })
}

/// Byte offset of an `Action:` that opens a line and is followed by a JSON
/// list, object or fence. `Action:` in running prose is not a tool call.
fn find_action_marker(text: &str) -> Option<usize> {
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let marker = line_start + (line.len() - line.trim_start().len());
        if text[marker..].starts_with(ACTION_MARKER) {
            let payload = text[marker + ACTION_MARKER.len()..].trim_start();
            if ["```", "[", "{"].iter().any(|open| payload.starts_with(open)) {
                return Some(marker);
            }
        }
        line_start += line.len();
    }
    None
}

/// Extracts the JSON following `Action:`, unwrapping a markdown fence if one is opened.
fn action_payload(after_marker: &str) -> Result<&str> {
    let body = after_marker.trim_start();
    let Some(fenced) = body.strip_prefix("```") else {
        return Ok(body.trim());
    };
    let fenced = fenced.strip_prefix("json").unwrap_or(fenced);
    match fenced.find("```") {
        Some(end) => Ok(fenced[..end].trim()),
        None => Err(Error::malformed_completion(
            "action block opened with ``` but never closed",
        )),
    }
}

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<co:\s*([^>]*)>(.*?)</co:\s*([^>]*)>").expect("citation pattern compiles")
});

pub fn parse_grounded(raw: &str, known_documents: &[Document]) -> Result<GenerationResult> {
    let text = strip_stop_markers(raw).trim();
    let body = match text.find(GROUNDED_ANSWER_MARKER) {
        Some(pos) => text[pos + GROUNDED_ANSWER_MARKER.len()..].trim_start(),
        None => text,
    };

    let mut answer = String::with_capacity(body.len());
    let mut citations = Vec::new();
    let mut cursor = 0;

    for caps in CITATION.captures_iter(body) {
        let caps = caps.map_err(|e| Error::malformed_completion(format!("citation scan: {e}")))?;
        let (Some(whole), Some(ids), Some(span), Some(closing)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let document_ids = parse_citation_ids(ids.as_str())?;
        if parse_citation_ids(closing.as_str())? != document_ids {
            return Err(Error::malformed_completion(format!(
                "citation opened with <co: {}> but closed with </co: {}>",
                ids.as_str().trim(),
                closing.as_str().trim()
            )));
        }

        push_prose(&mut answer, &body[cursor..whole.start()])?;
        let start = answer.len();
        push_prose(&mut answer, span.as_str())?;
        let end = answer.len();

        for document_id in document_ids {
            if document_id >= known_documents.len() {
                return Err(Error::DanglingCitation {
                    document_id,
                    available: known_documents.len(),
                });
            }
            citations.push(Citation {
                document_id,
                start,
                end,
                text: span.as_str().to_string(),
            });
        }
        cursor = whole.end();
    }
    push_prose(&mut answer, &body[cursor..])?;

    debug!(citations = citations.len(), "parsed grounded answer");
    Ok(GenerationResult::GroundedAnswer {
        text: answer,
        citations,
    })
}

/// Appends text that must not contain leftover citation markup.
fn push_prose(answer: &mut String, segment: &str) -> Result<()> {
    if segment.contains(CITATION_OPEN) || segment.contains(CITATION_CLOSE) {
        return Err(Error::malformed_completion(
            "unterminated or unbalanced citation markup",
        ));
    }
    answer.push_str(segment);
    Ok(())
}

fn parse_citation_ids(ids: &str) -> Result<Vec<usize>> {
    let ids: Vec<usize> = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| Error::malformed_completion(format!("invalid citation id '{s}'")))
        })
        .collect::<Result<_>>()?;
    if ids.is_empty() {
        return Err(Error::malformed_completion("citation without a document id"));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::types::Parameter;
    use serde_json::json;

    fn search_tool() -> ToolSpec {
        ToolSpec::new(
            "internet_search",
            "Search",
            vec![Parameter::new("query", "str", "Query", true)],
        )
    }

    #[test]
    fn strip_cuts_at_first_marker() {
        assert_eq!(
            strip_stop_markers("Hello there<|END_OF_TURN_TOKEN|><EOS_TOKEN>"),
            "Hello there"
        );
        assert_eq!(strip_stop_markers("  no markers \n"), "  no markers \n");
        assert_eq!(strip_stop_markers("<EOS_TOKEN>"), "");
    }

    #[test]
    fn completion_keeps_leading_whitespace() {
        let req = Request::Completion {
            prompt: "Once upon a time".into(),
        };
        assert_eq!(
            parse(&req, " there was\n").unwrap(),
            GenerationResult::plain(" there was\n")
        );
        assert_eq!(
            parse(&req, " there was<|END_OF_TURN_TOKEN|>junk").unwrap(),
            GenerationResult::plain(" there was")
        );
    }

    #[test]
    fn action_word_in_prose_is_plain_text() {
        let raw = "Here is a slogan. Call to Action: buy now!";
        assert_eq!(
            parse_tool_call(raw, &[search_tool()]).unwrap(),
            GenerationResult::plain(raw)
        );

        let line_start = "Action: sign up before Friday.";
        assert_eq!(
            parse_tool_call(line_start, &[search_tool()]).unwrap(),
            GenerationResult::plain(line_start)
        );
    }

    #[test]
    fn action_marker_on_later_line() {
        let raw = "Let me search for that.\n  Action: ```json\n[{\"tool_name\": \"internet_search\", \"parameters\": {\"query\": \"weather\"}}]\n```";
        let result = parse_tool_call(raw, &[search_tool()]).unwrap();
        assert!(matches!(result, GenerationResult::ToolCall { ref name, .. } if name == "internet_search"));
    }

    #[test]
    fn directly_answer_is_plain_text() {
        let raw = "Action: ```json\n[{\"tool_name\": \"directly_answer\", \"parameters\": {}}]\n```";
        assert_eq!(
            parse_tool_call(raw, &[search_tool()]).unwrap(),
            GenerationResult::plain("")
        );
    }

    #[test]
    fn caller_defined_directly_answer_is_a_tool_call() {
        let own = ToolSpec::new(DIRECTLY_ANSWER, "Caller's own handler", vec![]);
        let raw = "Action: ```json\n[{\"tool_name\": \"directly_answer\", \"parameters\": {}}]\n```";
        assert_eq!(
            parse_tool_call(raw, &[own]).unwrap(),
            GenerationResult::ToolCall {
                name: DIRECTLY_ANSWER.into(),
                arguments: Map::new(),
            }
        );
    }

    #[test]
    fn mismatched_citation_close_is_malformed() {
        let docs = vec![Document::new("a", "x"), Document::new("b", "y")];
        assert!(matches!(
            parse_grounded("Grounded answer: <co: 0>x</co: 1>", &docs),
            Err(Error::MalformedCompletion(_))
        ));
        assert!(parse_grounded("Grounded answer: <co: 0, 1>x</co: 0,1>", &docs).is_ok());
    }

    #[test]
    fn unfenced_single_object_action() {
        let raw = r#"Action: {"tool_name": "internet_search", "parameters": {"query": "weather"}}"#;
        let result = parse_tool_call(raw, &[search_tool()]).unwrap();
        assert_eq!(
            result,
            GenerationResult::ToolCall {
                name: "internet_search".into(),
                arguments: json!({"query": "weather"}).as_object().unwrap().clone(),
            }
        );
    }

    #[test]
    fn unterminated_fence_is_malformed() {
        let raw = "Action: ```json\n[{\"tool_name\": \"internet_search\", \"parameters\": {}}]";
        assert!(matches!(
            parse_tool_call(raw, &[search_tool()]),
            Err(Error::MalformedCompletion(_))
        ));
    }

    #[test]
    fn invalid_action_json_is_malformed() {
        let raw = "Action: ```json\n[{\"tool_name\": ]\n```";
        assert!(matches!(
            parse_tool_call(raw, &[search_tool()]),
            Err(Error::MalformedCompletion(_))
        ));
    }

    #[test]
    fn non_object_parameters_are_malformed() {
        let raw = "Action: ```json\n[{\"tool_name\": \"internet_search\", \"parameters\": [1]}]\n```";
        assert!(matches!(
            parse_tool_call(raw, &[search_tool()]),
            Err(Error::MalformedCompletion(_))
        ));
    }

    #[test]
    fn empty_action_list_is_direct_answer() {
        let raw = "I can answer that myself.\nAction: ```json\n[]\n```";
        assert_eq!(
            parse_tool_call(raw, &[search_tool()]).unwrap(),
            GenerationResult::plain("I can answer that myself.")
        );
    }

    #[test]
    fn first_of_several_actions_wins() {
        let raw = r#"Action: ```json
[
    {"tool_name": "internet_search", "parameters": {"query": "a"}},
    {"tool_name": "internet_search", "parameters": {"query": "b"}}
]
```"#;
        let result = parse_tool_call(raw, &[search_tool()]).unwrap();
        let GenerationResult::ToolCall { arguments, .. } = result else {
            panic!("expected tool call");
        };
        assert_eq!(arguments["query"], "a");
    }

    #[test]
    fn multi_id_citation_yields_one_entry_per_id() {
        let docs = vec![Document::new("a", "x"), Document::new("b", "y")];
        let result = parse_grounded("Grounded answer: <co: 1,0>Both</co: 1,0> agree.", &docs).unwrap();
        let GenerationResult::GroundedAnswer { text, citations } = result else {
            panic!("expected grounded answer");
        };
        assert_eq!(text, "Both agree.");
        let ids: Vec<_> = citations.iter().map(|c| c.document_id).collect();
        assert_eq!(ids, [1, 0]);
        assert!(citations.iter().all(|c| c.start == 0 && c.end == 4));
    }

    #[test]
    fn unclosed_citation_is_malformed() {
        let docs = vec![Document::new("a", "x")];
        assert!(matches!(
            parse_grounded("Grounded answer: <co: 0>never closed", &docs),
            Err(Error::MalformedCompletion(_))
        ));
    }

    #[test]
    fn non_numeric_citation_id_is_malformed() {
        let docs = vec![Document::new("a", "x")];
        assert!(matches!(
            parse_grounded("<co: doc>fact</co: doc>", &docs),
            Err(Error::MalformedCompletion(_))
        ));
    }

    #[test]
    fn answer_without_citations_is_still_grounded() {
        let result = parse_grounded("Penguins are birds.", &[]).unwrap();
        assert_eq!(
            result,
            GenerationResult::GroundedAnswer {
                text: "Penguins are birds.".into(),
                citations: vec![],
            }
        );
    }

    #[test]
    fn result_serializes_with_type_tag() {
        let value = serde_json::to_value(GenerationResult::plain("hi")).unwrap();
        assert_eq!(value, json!({"type": "plain_text", "text": "hi"}));
    }
}
