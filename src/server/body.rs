//! Request bodies for the four generation routes.
//!
//! Bodies are decoded straight from bytes in one fallible step; any decoding
//! failure (bad JSON, missing key, unknown role, bad `citation_mode`) becomes
//! [`Error::MalformedInput`]. Decoding from bytes rather than from a
//! `serde_json::Value` keeps tool parameter tables in body order.

use crate::error::{Error, Result};
use crate::llm::SamplingOverrides;
use crate::prompt::{CitationMode, Document, Mode, Request, ToolSpec, Turn};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// A decoded body: the typed request plus whatever sampling fields the caller sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody {
    pub request: Request,
    pub sampling: SamplingOverrides,
}

#[derive(Deserialize)]
struct CompletionBody {
    prompt: String,
    #[serde(flatten)]
    sampling: SamplingOverrides,
}

#[derive(Deserialize)]
struct ChatBody {
    conversation: Vec<Turn>,
    #[serde(flatten)]
    sampling: SamplingOverrides,
}

#[derive(Deserialize)]
struct ToolBody {
    conversation: Vec<Turn>,
    tools: Vec<ToolSpec>,
    #[serde(flatten)]
    sampling: SamplingOverrides,
}

#[derive(Deserialize)]
struct RagBody {
    conversation: Vec<Turn>,
    documents: Vec<Document>,
    #[serde(default)]
    citation_mode: CitationMode,
    #[serde(flatten)]
    sampling: SamplingOverrides,
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::malformed(format!("request body: {e}")))
}

pub fn parse_body(mode: Mode, bytes: &[u8]) -> Result<ParsedBody> {
    let parsed = match mode {
        Mode::Completion => {
            let body: CompletionBody = decode(bytes)?;
            ParsedBody {
                request: Request::Completion {
                    prompt: body.prompt,
                },
                sampling: body.sampling,
            }
        }
        Mode::Chat => {
            let body: ChatBody = decode(bytes)?;
            ParsedBody {
                request: Request::Chat {
                    conversation: body.conversation,
                },
                sampling: body.sampling,
            }
        }
        Mode::Tool => {
            let body: ToolBody = decode(bytes)?;
            ParsedBody {
                request: Request::Tool {
                    conversation: body.conversation,
                    tools: body.tools,
                },
                sampling: body.sampling,
            }
        }
        Mode::Rag => {
            let body: RagBody = decode(bytes)?;
            ParsedBody {
                request: Request::Rag {
                    conversation: body.conversation,
                    documents: body.documents,
                    citation_mode: body.citation_mode,
                },
                sampling: body.sampling,
            }
        }
    };
    parsed.request.validate()?;
    Ok(parsed)
}
