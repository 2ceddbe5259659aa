use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolsError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),
}

pub type Result<T> = std::result::Result<T, ToolsError>;
