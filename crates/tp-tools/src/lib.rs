//! MCP tools for Target Process.
//!
//! [`TpToolSource`] turns tool calls (a name plus a JSON argument bag) into
//! [`tp_mcp_client::TpClient`] operations and renders the results as MCP content.

mod args;
pub mod catalog;
mod error;
pub mod semantics;
mod source;

pub use error::{Result, ToolsError};
pub use source::TpToolSource;
