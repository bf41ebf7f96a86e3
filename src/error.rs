use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Structurally invalid request: missing field, unknown role, duplicate tool.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Sampling parameter outside its accepted range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Model invoked unknown tool '{name}'")]
    UnknownToolInvoked { name: String },

    #[error("Citation references document {document_id}, but only {available} documents were supplied")]
    DanglingCitation {
        document_id: usize,
        available: usize,
    },

    /// Model output with a broken structured block (unterminated fence, bad JSON, stray markup).
    #[error("Malformed completion: {0}")]
    MalformedCompletion(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({platform}): {message}")]
    Api {
        platform: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited by {platform}")]
    RateLimit {
        platform: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownToolInvoked { name: name.into() }
    }

    pub fn malformed_completion(msg: impl Into<String>) -> Self {
        Self::MalformedCompletion(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::GenerationFailure(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn api_with_status(
        platform: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures caused by the caller's request rather than the model or backend.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedInput(_) | Self::InvalidParameter(_))
    }

    /// True for structurally broken or referentially invalid model output.
    pub fn is_completion_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownToolInvoked { .. }
                | Self::DanglingCitation { .. }
                | Self::MalformedCompletion(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
