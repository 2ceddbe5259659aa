//! MCP `ToolAnnotations` derived from what a tool does upstream.
//!
//! Upstream only speaks GET and POST; POST is used both to create records and to update existing
//! ones, so the method alone does not say whether a call overwrites data.

use reqwest::Method;
use rmcp::model::ToolAnnotations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// GET only.
    Read,
    /// POST that adds a new record.
    Create,
    /// POST that changes an existing record.
    Update,
}

impl Effect {
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::Read => Method::GET,
            Self::Create | Self::Update => Method::POST,
        }
    }
}

/// Every tool talks to an external system, so `openWorldHint` is always set.
#[must_use]
pub fn annotations_for(effect: Effect) -> ToolAnnotations {
    let open_world_hint = Some(true);

    match effect {
        Effect::Read => ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint,
        },
        Effect::Create => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
            open_world_hint,
        },
        Effect::Update => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint,
        },
    }
}
