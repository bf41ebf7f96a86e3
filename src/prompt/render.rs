//! Serializes a [`Request`] into the single prompt string the runtime consumes.
//!
//! Rendering is a pure function of its input: no clocks, no randomness, no
//! hash-map iteration. Validation runs before any template text is produced.

use super::template::{
    ACCURATE_CITATION_INSTRUCTION, ACTION_INSTRUCTION, BOS, CHATBOT_TOKEN, DIRECTLY_ANSWER,
    DIRECTLY_ANSWER_DESCRIPTION, END_OF_TURN, FAST_CITATION_INSTRUCTION, START_OF_TURN,
    SYSTEM_PREAMBLE, SYSTEM_TOKEN, TOOLS_HEADER, USER_TOKEN,
};
use super::types::{CitationMode, Document, Request, Role, ToolSpec, Turn};
use crate::error::Result;
use std::fmt::Write;

pub fn render(request: &Request) -> Result<String> {
    request.validate()?;

    let prompt = match request {
        Request::Completion { prompt } => prompt.clone(),
        Request::Chat { conversation } => {
            let mut out = String::from(BOS);
            push_conversation(&mut out, conversation);
            push_assistant_cue(&mut out, None);
            out
        }
        Request::Tool {
            conversation,
            tools,
        } => {
            let mut out = String::from(BOS);
            push_turn(&mut out, SYSTEM_TOKEN, &tools_preamble(tools));
            push_conversation(&mut out, conversation);
            push_assistant_cue(&mut out, Some(ACTION_INSTRUCTION));
            out
        }
        Request::Rag {
            conversation,
            documents,
            citation_mode,
        } => {
            let mut out = String::from(BOS);
            push_turn(&mut out, SYSTEM_TOKEN, SYSTEM_PREAMBLE);
            push_turn(&mut out, SYSTEM_TOKEN, &documents_block(documents));
            push_conversation(&mut out, conversation);
            push_assistant_cue(&mut out, Some(citation_instruction(*citation_mode)));
            out
        }
    };

    Ok(prompt)
}

pub fn citation_instruction(mode: CitationMode) -> &'static str {
    match mode {
        CitationMode::Accurate => ACCURATE_CITATION_INSTRUCTION,
        CitationMode::Fast => FAST_CITATION_INSTRUCTION,
    }
}

fn push_turn(out: &mut String, role_token: &str, content: &str) {
    out.push_str(START_OF_TURN);
    out.push_str(role_token);
    out.push_str(content);
    out.push_str(END_OF_TURN);
}

fn push_conversation(out: &mut String, conversation: &[Turn]) {
    for turn in conversation {
        match turn.role {
            Role::User => push_turn(out, USER_TOKEN, &turn.content),
            Role::Assistant => push_turn(out, CHATBOT_TOKEN, &turn.content),
            Role::System => push_turn(out, SYSTEM_TOKEN, &turn.content),
            Role::Tool => push_turn(out, SYSTEM_TOKEN, &tool_result_block(turn)),
        }
    }
}

/// Trailing cue: an optional system instruction, then an open chatbot turn.
fn push_assistant_cue(out: &mut String, instruction: Option<&str>) {
    if let Some(instruction) = instruction {
        push_turn(out, SYSTEM_TOKEN, instruction);
    }
    out.push_str(START_OF_TURN);
    out.push_str(CHATBOT_TOKEN);
}

fn tool_result_block(turn: &Turn) -> String {
    let mut block = String::from("<results>\n");
    if let Some(id) = &turn.tool_call_id {
        let _ = writeln!(block, "tool_call_id: {id}");
    }
    block.push_str(&turn.content);
    block.push_str("\n</results>");
    block
}

fn tools_preamble(tools: &[ToolSpec]) -> String {
    let mut out = String::from(SYSTEM_PREAMBLE);
    out.push_str("\n\n");
    out.push_str(TOOLS_HEADER);
    for tool in tools {
        out.push_str("\n\n");
        out.push_str(&tool_definition(tool));
    }
    if !tools.iter().any(|t| t.name == DIRECTLY_ANSWER) {
        out.push_str("\n\n");
        out.push_str(&tool_definition(&ToolSpec::new(
            DIRECTLY_ANSWER,
            DIRECTLY_ANSWER_DESCRIPTION,
            vec![],
        )));
    }
    out
}

/// Python-style definition block for one tool, parameters in caller order.
pub(crate) fn tool_definition(tool: &ToolSpec) -> String {
    let signature = tool
        .parameters
        .iter()
        .map(|p| {
            if p.required {
                format!("{}: {}", p.name, p.kind)
            } else {
                format!("{}: Optional[{}]", p.name, p.kind)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::from("```python\n");
    let _ = writeln!(out, "def {}({signature}) -> List[Dict]:", tool.name);
    let _ = write!(out, "    \"\"\"{}", tool.description);
    if !tool.parameters.is_empty() {
        out.push_str("\n\n    Args:");
        for p in &tool.parameters {
            let kind = if p.required {
                p.kind.clone()
            } else {
                format!("Optional[{}]", p.kind)
            };
            let _ = write!(out, "\n        {} ({kind}): {}", p.name, p.description);
        }
    }
    out.push_str("\n    \"\"\"\n    pass\n```");
    out
}

fn documents_block(documents: &[Document]) -> String {
    let mut out = String::from("<results>\n");
    for (id, doc) in documents.iter().enumerate() {
        if id > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "Document: {id}\ntitle: {}\ntext: {}", doc.title, doc.text);
    }
    out.push_str("</results>");
    out
}
