use crate::error::{Error, Result};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(format!(
                "unrecognized role '{other}' (expected user, assistant, system or tool)"
            )),
        }
    }
}

impl From<Role> for &'static str {
    fn from(role: Role) -> Self {
        role.as_str()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One entry of a tool's parameter table. `kind` is passed through opaquely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub required: bool,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            required,
        }
    }
}

#[derive(Deserialize)]
struct ParameterFields {
    #[serde(rename = "type")]
    kind: String,
    description: String,
    required: bool,
}

/// Decodes a `{name: {type, description, required}}` object into a list,
/// keeping the key order of the request body.
fn deserialize_parameters<'de, D>(deserializer: D) -> std::result::Result<Vec<Parameter>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TableVisitor;

    impl<'de> Visitor<'de> for TableVisitor {
        type Value = Vec<Parameter>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of parameter name to {type, description, required}")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut params = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(name) = map.next_key::<String>()? {
                let fields: ParameterFields = map
                    .next_value()
                    .map_err(|e| {
                        <A::Error as de::Error>::custom(format!("parameter '{name}': {e}"))
                    })?;
                params.push(Parameter {
                    name,
                    kind: fields.kind,
                    description: fields.description,
                    required: fields.required,
                });
            }
            Ok(params)
        }
    }

    deserializer.deserialize_map(TableVisitor)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(
        rename = "parameter_definitions",
        alias = "parameters",
        deserialize_with = "deserialize_parameters"
    )]
    pub parameters: Vec<Parameter>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Grounding passage. Its id is its position in the request's document list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// How rigorously the model is asked to cite. Only changes instruction text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationMode {
    #[default]
    Accurate,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Completion,
    Chat,
    Tool,
    Rag,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Chat => "chat",
            Self::Tool => "tool",
            Self::Rag => "rag",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completion" | "generate" => Ok(Self::Completion),
            "chat" => Ok(Self::Chat),
            "tool" => Ok(Self::Tool),
            "rag" => Ok(Self::Rag),
            other => Err(Error::malformed(format!("unknown mode '{other}'"))),
        }
    }
}

/// A fully decoded request for one of the four endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Completion {
        prompt: String,
    },
    Chat {
        conversation: Vec<Turn>,
    },
    Tool {
        conversation: Vec<Turn>,
        tools: Vec<ToolSpec>,
    },
    Rag {
        conversation: Vec<Turn>,
        documents: Vec<Document>,
        citation_mode: CitationMode,
    },
}

impl Request {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Completion { .. } => Mode::Completion,
            Self::Chat { .. } => Mode::Chat,
            Self::Tool { .. } => Mode::Tool,
            Self::Rag { .. } => Mode::Rag,
        }
    }

    pub fn conversation(&self) -> &[Turn] {
        match self {
            Self::Completion { .. } => &[],
            Self::Chat { conversation }
            | Self::Tool { conversation, .. }
            | Self::Rag { conversation, .. } => conversation,
        }
    }

    /// Structural checks that decoding alone cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Completion { .. } => Ok(()),
            Self::Chat { conversation } => validate_conversation(conversation),
            Self::Tool {
                conversation,
                tools,
            } => {
                validate_conversation(conversation)?;
                validate_tools(tools)
            }
            Self::Rag { conversation, .. } => validate_conversation(conversation),
        }
    }
}

fn validate_conversation(conversation: &[Turn]) -> Result<()> {
    if conversation.is_empty() {
        return Err(Error::malformed("conversation must contain at least one turn"));
    }
    for (i, turn) in conversation.iter().enumerate() {
        if turn.tool_call_id.is_some() && turn.role != Role::Tool {
            return Err(Error::malformed(format!(
                "turn {i}: tool_call_id is only allowed on tool turns, found on a {} turn",
                turn.role
            )));
        }
    }
    Ok(())
}

fn validate_tools(tools: &[ToolSpec]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tools.len());
    for tool in tools {
        if tool.name.trim().is_empty() {
            return Err(Error::malformed("tool name must not be empty"));
        }
        if !seen.insert(tool.name.as_str()) {
            return Err(Error::malformed(format!(
                "duplicate tool name '{}'",
                tool.name
            )));
        }
        let mut params = HashSet::with_capacity(tool.parameters.len());
        for param in &tool.parameters {
            if !params.insert(param.name.as_str()) {
                return Err(Error::malformed(format!(
                    "tool '{}': duplicate parameter '{}'",
                    tool.name, param.name
                )));
            }
        }
    }
    Ok(())
}
