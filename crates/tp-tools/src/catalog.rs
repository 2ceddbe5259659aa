//! Static tool catalogue: names, descriptions and JSON-schema input definitions.

use crate::semantics::Effect;
use serde_json::{Value, json};
use tp_mcp_client::EntityType;
use tp_mcp_client::query::{DEFAULT_SEARCH_TAKE, MAX_SEARCH_TAKE};

pub const SEARCH: &str = "search";
pub const GET_ENTITY: &str = "get_entity";
pub const CREATE_ENTITY: &str = "create_entity";
pub const UPDATE_ENTITY: &str = "update_entity";
pub const ADD_COMMENT: &str = "add_comment";
pub const LIST_COMMENTS: &str = "list_comments";
pub const LIST_ATTACHMENTS: &str = "list_attachments";
pub const DOWNLOAD_ATTACHMENT: &str = "download_attachment";
pub const INSPECT_OBJECT: &str = "inspect_object";

pub const DEFAULT_COMMENT_TAKE: u32 = 25;
pub const MAX_COMMENT_TAKE: u32 = 100;
pub const DEFAULT_ATTACHMENT_TAKE: u32 = 100;
pub const MAX_ATTACHMENT_TAKE: u32 = 1000;

/// Largest attachment `download_attachment` will fetch.
pub const MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

pub const DATE_FIELDS: &[&str] = &[
    "CreateDate",
    "ModifyDate",
    "StartDate",
    "EndDate",
    "PlannedStartDate",
    "PlannedEndDate",
];

pub const INSPECT_ACTIONS: &[&str] = &[
    "list_types",
    "get_properties",
    "get_property_details",
    "discover_api_structure",
];

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub effect: Effect,
    pub input_schema: Value,
}

fn entity_type_property(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "enum": EntityType::static_names(),
    })
}

fn string_array(description: &str) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": { "type": "string" },
    })
}

fn reference(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "properties": { "Id": { "type": "integer" } },
    })
}

fn id_or_name(description: &str) -> Value {
    json!({
        "type": ["string", "integer"],
        "description": description,
    })
}

#[allow(clippy::too_many_lines)]
#[must_use]
pub fn tool_defs() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: SEARCH,
            description: "Search Target Process entities by type with optional filters. Prefer the \
                structured filters (status, assignedUser, project, team, feature, priority, \
                dateFrom, dateTo) over the raw 'where' parameter. Returns paginated results with a \
                cursor.",
            effect: Effect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": entity_type_property("Entity type to search (e.g. UserStory, Bug, Task, Feature)"),
                    "status": {
                        "type": "string",
                        "description": "Entity state name (e.g. 'Open', 'In Progress'). Maps to EntityState.Name.",
                    },
                    "assignedUser": id_or_name("Assigned user: a number for user id, a string for email."),
                    "project": id_or_name("Project: a number for id, a string for name."),
                    "team": id_or_name("Team: a number for id, a string for name."),
                    "feature": id_or_name("Feature: a number for id, a string for name."),
                    "priority": {
                        "type": "string",
                        "description": "Priority name (e.g. 'High'). Maps to Priority.Name.",
                    },
                    "dateFrom": { "type": "string", "description": "Range start (YYYY-MM-DD)" },
                    "dateTo": { "type": "string", "description": "Range end (YYYY-MM-DD)" },
                    "dateField": {
                        "type": "string",
                        "description": "Date field used for dateFrom/dateTo (default: CreateDate)",
                        "enum": DATE_FIELDS,
                    },
                    "where": {
                        "type": "string",
                        "description": "Raw where clause, joined to the structured filters with 'and'. \
                            Use eq/ne/gt/lt/gte/lte and single-quoted strings, e.g. \"EntityState.Name eq 'Open'\".",
                    },
                    "include": string_array("Fields to include (e.g. [Id,Name,Description])"),
                    "take": {
                        "type": "integer",
                        "description": format!("Items per page (default {DEFAULT_SEARCH_TAKE}, max {MAX_SEARCH_TAKE})"),
                        "minimum": 1,
                        "maximum": MAX_SEARCH_TAKE,
                    },
                    "orderByField": { "type": "string", "description": "Single field to sort by" },
                    "orderByDirection": {
                        "type": "string",
                        "description": "Sort direction (default asc). Requires orderByField.",
                        "enum": ["asc", "desc"],
                    },
                    "cursor": {
                        "type": "string",
                        "description": "Cursor from a previous response. When set, every other parameter except type is ignored.",
                    },
                },
                "required": ["type"],
            }),
        },
        ToolDef {
            name: GET_ENTITY,
            description: "Get a single Target Process entity by type and id.",
            effect: Effect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": entity_type_property("Entity type"),
                    "id": { "type": "integer", "description": "Entity id" },
                    "include": string_array("Additional fields to include"),
                },
                "required": ["type", "id"],
            }),
        },
        ToolDef {
            name: CREATE_ENTITY,
            description: "Create a Target Process entity. Requires type and name.",
            effect: Effect::Create,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": entity_type_property("Entity type to create"),
                    "name": { "type": "string", "description": "Entity name" },
                    "description": { "type": "string", "description": "Entity description" },
                    "project": reference("Project reference, e.g. {\"Id\": 123}"),
                    "team": reference("Team reference, e.g. {\"Id\": 456}"),
                    "assignedUser": reference("Assigned user reference, e.g. {\"Id\": 789}"),
                    "customFields": {
                        "type": "object",
                        "description": "Extra fields merged into the entity data",
                    },
                },
                "required": ["type", "name"],
            }),
        },
        ToolDef {
            name: UPDATE_ENTITY,
            description: "Update fields of an existing Target Process entity.",
            effect: Effect::Update,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": entity_type_property("Entity type"),
                    "id": { "type": "integer", "description": "Entity id" },
                    "fields": {
                        "type": "object",
                        "description": "Fields to update, e.g. {\"Name\": \"New name\"}",
                    },
                },
                "required": ["type", "id", "fields"],
            }),
        },
        ToolDef {
            name: ADD_COMMENT,
            description: "Add a private comment to a Target Process entity. HTML is allowed.",
            effect: Effect::Create,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entityId": { "type": "integer", "description": "Entity to comment on" },
                    "description": { "type": "string", "description": "Comment text" },
                },
                "required": ["entityId", "description"],
            }),
        },
        ToolDef {
            name: LIST_COMMENTS,
            description: "List comments on a Target Process entity, newest first.",
            effect: Effect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entityId": { "type": "integer", "description": "Entity id" },
                    "take": {
                        "type": "integer",
                        "description": format!("Comments to return (default {DEFAULT_COMMENT_TAKE}, max {MAX_COMMENT_TAKE})"),
                        "minimum": 1,
                        "maximum": MAX_COMMENT_TAKE,
                    },
                    "skip": { "type": "integer", "description": "Comments to skip", "minimum": 0 },
                    "include": string_array("Fields to include (default [Description,CreateDate,Owner])"),
                },
                "required": ["entityId"],
            }),
        },
        ToolDef {
            name: LIST_ATTACHMENTS,
            description: "List attachment metadata (id, name, size, MIME type) for an entity.",
            effect: Effect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entityId": { "type": "integer", "description": "Entity id" },
                    "take": {
                        "type": "integer",
                        "description": format!("Attachments to return (default {DEFAULT_ATTACHMENT_TAKE})"),
                        "minimum": 1,
                        "maximum": MAX_ATTACHMENT_TAKE,
                    },
                    "skip": { "type": "integer", "description": "Attachments to skip", "minimum": 0 },
                },
                "required": ["entityId"],
            }),
        },
        ToolDef {
            name: DOWNLOAD_ATTACHMENT,
            description: "Download an attachment by id (max 50MB). Images are returned as image \
                content, text files as text, anything else as base64.",
            effect: Effect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "attachmentId": { "type": "integer", "description": "Attachment id" },
                },
                "required": ["attachmentId"],
            }),
        },
        ToolDef {
            name: INSPECT_OBJECT,
            description: "Inspect Target Process metadata: list entity types, the properties of \
                a type, one property in detail, or the whole API structure.",
            effect: Effect::Read,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": INSPECT_ACTIONS },
                    "entityType": {
                        "type": "string",
                        "description": "Required for get_properties and get_property_details",
                    },
                    "property": {
                        "type": "string",
                        "description": "Required for get_property_details",
                    },
                },
                "required": ["action"],
            }),
        },
    ]
}
