//! Prompt construction and completion interpretation for the Command-R turn format.

pub mod parse;
pub mod render;
pub mod template;
pub mod types;

pub use parse::{Citation, GenerationResult, parse, strip_stop_markers};
pub use render::render;
pub use types::{CitationMode, Document, Mode, Parameter, Request, Role, ToolSpec, Turn};
