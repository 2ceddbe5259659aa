//! MCP tool source backed by [`TpClient`].
//!
//! Mirrors the shape of the workspace's other tool sources: `list_tools()` for discovery and
//! `call_tool()` for execution. Upstream and argument failures come back as `is_error` results so
//! the model can read them; only an unknown tool name is a hard error.

use crate::args::{
    clamped_take, entity_type_arg, id_or_name_arg, int_arg, object_arg, required_int,
    required_string, string_arg, string_list_arg,
};
use crate::catalog::{
    ADD_COMMENT, CREATE_ENTITY, DEFAULT_ATTACHMENT_TAKE, DEFAULT_COMMENT_TAKE, DOWNLOAD_ATTACHMENT,
    GET_ENTITY, INSPECT_OBJECT, LIST_ATTACHMENTS, LIST_COMMENTS, MAX_ATTACHMENT_TAKE,
    MAX_COMMENT_TAKE, MAX_DOWNLOAD_BYTES, SEARCH, ToolDef, UPDATE_ENTITY, tool_defs,
};
use crate::error::{Result, ToolsError};
use crate::semantics::annotations_for;
use base64::Engine as _;
use mime::Mime;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tp_mcp_client::query::{DEFAULT_SEARCH_TAKE, MAX_SEARCH_TAKE};
use tp_mcp_client::{
    OffsetPage, SearchFilters, SearchRequest, SortDirection, TpClient, TpError,
};
use tracing::{debug, warn};

type ToolOutcome = std::result::Result<CallToolResult, TpError>;

#[derive(Clone)]
pub struct TpToolSource {
    inner: Arc<TpToolSourceInner>,
}

struct TpToolSourceInner {
    client: Arc<TpClient>,
    tools: Vec<ToolDef>,
}

impl TpToolSource {
    #[must_use]
    pub fn new(client: Arc<TpClient>) -> Self {
        Self {
            inner: Arc::new(TpToolSourceInner {
                client,
                tools: tool_defs(),
            }),
        }
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.inner
            .tools
            .iter()
            .map(|t| {
                let schema_obj = t
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_else(JsonObject::new);
                let mut tool = Tool::new(t.name, t.description, Arc::new(schema_obj));
                tool.annotations = Some(annotations_for(t.effect));
                tool
            })
            .collect()
    }

    /// Execute a tool call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolsError::UnknownTool`] if `tool_name` is not in the catalogue. Every other
    /// failure is reported inside the returned result with `is_error` set.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult> {
        let tool = self
            .inner
            .tools
            .iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| ToolsError::UnknownTool(tool_name.to_string()))?;

        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => JsonObject::new(),
            other => {
                return Ok(error_result(&TpError::validation(
                    "arguments",
                    format!("arguments must be an object, got {other}"),
                )));
            }
        };

        debug!(tool = tool.name, method = %tool.effect.method(), "tool call");
        let outcome = self.dispatch(tool.name, &args, cancel).await;
        Ok(outcome.unwrap_or_else(|e| {
            warn!(tool = tool.name, error = %e, "tool call failed");
            error_result(&e)
        }))
    }

    async fn dispatch(&self, name: &str, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        match name {
            SEARCH => self.search(args, cancel).await,
            GET_ENTITY => self.get_entity(args, cancel).await,
            CREATE_ENTITY => self.create_entity(args, cancel).await,
            UPDATE_ENTITY => self.update_entity(args, cancel).await,
            ADD_COMMENT => self.add_comment(args, cancel).await,
            LIST_COMMENTS => self.list_comments(args, cancel).await,
            LIST_ATTACHMENTS => self.list_attachments(args, cancel).await,
            DOWNLOAD_ATTACHMENT => self.download_attachment(args, cancel).await,
            INSPECT_OBJECT => self.inspect_object(args, cancel).await,
            other => Err(TpError::validation("name", format!("unhandled tool {other}"))),
        }
    }

    fn client(&self) -> &TpClient {
        &self.inner.client
    }

    async fn search(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_type = entity_type_arg(args, "type")?;

        let req = if let Some(cursor) = string_arg(args, "cursor") {
            SearchRequest::from_cursor(entity_type, cursor)
        } else {
            let owned = |key: &str| string_arg(args, key).map(str::to_string);
            let mut req = SearchRequest::new(entity_type)
                .with_filters(SearchFilters {
                    status: owned("status"),
                    assigned_user: id_or_name_arg(args, "assignedUser"),
                    project: id_or_name_arg(args, "project"),
                    team: id_or_name_arg(args, "team"),
                    feature: id_or_name_arg(args, "feature"),
                    priority: owned("priority"),
                    date_from: owned("dateFrom"),
                    date_to: owned("dateTo"),
                    date_field: owned("dateField"),
                })
                .with_include(string_list_arg(args, "include"))
                .with_take(clamped_take(
                    args,
                    "take",
                    DEFAULT_SEARCH_TAKE,
                    1,
                    MAX_SEARCH_TAKE,
                ));
            if let Some(raw) = string_arg(args, "where") {
                req = req.with_raw_where(raw);
            }

            let direction = string_arg(args, "orderByDirection");
            match (string_arg(args, "orderByField"), direction) {
                (None, Some(_)) => {
                    return Err(TpError::validation(
                        "orderByDirection",
                        "orderByDirection requires orderByField to be set",
                    ));
                }
                (Some(field), direction) => {
                    let direction = if direction.is_some_and(|d| d.eq_ignore_ascii_case("desc")) {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    };
                    req = req.with_order_by(field, direction);
                }
                (None, None) => {}
            }
            req
        };

        let page = self.client().search_entities(cancel, &req).await?;
        json_result(&page)
    }

    async fn get_entity(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_type = entity_type_arg(args, "type")?;
        let id = required_int(args, "id")?;
        let include = string_list_arg(args, "include");
        let entity = self
            .client()
            .get_entity(cancel, entity_type, id, &include)
            .await?;
        json_result(&entity)
    }

    async fn create_entity(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_type = entity_type_arg(args, "type")?;
        let name = required_string(args, "name")?;

        let mut data = Map::new();
        data.insert("Name".to_string(), Value::String(name.to_string()));
        if let Some(description) = string_arg(args, "description") {
            data.insert(
                "Description".to_string(),
                Value::String(description.to_string()),
            );
        }
        for (arg, field) in [
            ("project", "Project"),
            ("team", "Team"),
            ("assignedUser", "AssignedUser"),
        ] {
            if let Some(v) = args.get(arg).filter(|v| !v.is_null()) {
                data.insert(field.to_string(), v.clone());
            }
        }
        if let Some(custom) = object_arg(args, "customFields") {
            for (k, v) in custom {
                data.insert(k.clone(), v.clone());
            }
        }

        let created = self
            .client()
            .create_entity(cancel, entity_type, &data)
            .await?;
        json_result(&created)
    }

    async fn update_entity(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_type = entity_type_arg(args, "type")?;
        let id = required_int(args, "id")?;
        let fields = match args.get("fields") {
            None | Some(Value::Null) => {
                return Err(TpError::validation("fields", "fields parameter is required"));
            }
            Some(Value::Object(fields)) => fields,
            Some(_) => return Err(TpError::validation("fields", "fields must be an object")),
        };

        let updated = self
            .client()
            .update_entity(cancel, entity_type, id, fields)
            .await?;
        json_result(&updated)
    }

    async fn add_comment(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_id = required_int(args, "entityId")?;
        let description = required_string(args, "description")?;
        let comment = self
            .client()
            .create_comment(cancel, entity_id, description)
            .await?;
        json_result(&comment)
    }

    async fn list_comments(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_id = required_int(args, "entityId")?;
        let page = offset_page(args, DEFAULT_COMMENT_TAKE, MAX_COMMENT_TAKE)?;
        let include = string_list_arg(args, "include");
        let comments = self
            .client()
            .list_comments(cancel, entity_id, page, &include)
            .await?;
        json_result(&comments)
    }

    async fn list_attachments(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let entity_id = required_int(args, "entityId")?;
        let page = offset_page(args, DEFAULT_ATTACHMENT_TAKE, MAX_ATTACHMENT_TAKE)?;
        let attachments = self
            .client()
            .list_attachments(cancel, entity_id, page)
            .await?;
        json_result(&attachments)
    }

    async fn download_attachment(
        &self,
        args: &JsonObject,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let attachment_id = required_int(args, "attachmentId")?;
        let client = self.client();

        let meta = client.get_attachment_metadata(cancel, attachment_id).await?;
        if meta.size > MAX_DOWNLOAD_BYTES {
            return Err(TpError::validation(
                "attachmentId",
                format!(
                    "attachment size ({} bytes) exceeds maximum allowed size (50MB)",
                    meta.size
                ),
            ));
        }

        let url = client.attachment_download_url(attachment_id)?;
        let download = client.download_attachment(cancel, url.as_str()).await?;

        let summary = format!(
            "Filename: {}\nSize: {} bytes\nMIME Type: {}",
            meta.name,
            download.bytes.len(),
            download.mime_type
        );

        let content = match media_kind(&download.mime_type) {
            MediaKind::Image => vec![
                Content::image(
                    base64::engine::general_purpose::STANDARD.encode(&download.bytes),
                    download.mime_type.clone(),
                ),
                Content::text(summary),
            ],
            MediaKind::Text => vec![Content::text(format!(
                "{summary}\n\n{}",
                String::from_utf8_lossy(&download.bytes)
            ))],
            MediaKind::Binary => vec![Content::text(format!(
                "{summary}\n\nBase64-encoded content:\n{}",
                base64::engine::general_purpose::STANDARD.encode(&download.bytes)
            ))],
        };
        Ok(CallToolResult::success(content))
    }

    async fn inspect_object(&self, args: &JsonObject, cancel: &CancellationToken) -> ToolOutcome {
        let action = required_string(args, "action")?;
        let client = self.client();

        match action {
            "list_types" => {
                let types = client.get_valid_entity_types(cancel).await;
                json_result(&types)
            }
            "get_properties" => {
                let entity_type = required_string(args, "entityType")?;
                let metadata = client.fetch_metadata(cancel).await?;
                json_result(type_metadata(&metadata, entity_type)?)
            }
            "get_property_details" => {
                let entity_type = required_string(args, "entityType")?;
                let property = required_string(args, "property")?;
                let metadata = client.fetch_metadata(cancel).await?;
                let details = type_metadata(&metadata, entity_type)?
                    .get(property)
                    .ok_or_else(|| {
                        TpError::validation(
                            "property",
                            format!("property {property} not found for entity type {entity_type}"),
                        )
                    })?;
                json_result(details)
            }
            "discover_api_structure" => {
                let metadata = client.fetch_metadata(cancel).await?;
                json_result(&metadata)
            }
            other => Err(TpError::validation(
                "action",
                format!("unknown action: {other}"),
            )),
        }
    }
}

fn offset_page(args: &JsonObject, default_take: u32, max_take: u32) -> tp_mcp_client::Result<OffsetPage> {
    let take = clamped_take(args, "take", default_take, 1, max_take);
    let skip = int_arg(args, "skip")?.unwrap_or(0).clamp(0, i64::from(u32::MAX));
    Ok(OffsetPage {
        take,
        skip: u32::try_from(skip).unwrap_or(0),
    })
}

fn type_metadata<'a>(metadata: &'a Value, entity_type: &str) -> tp_mcp_client::Result<&'a Value> {
    let types = metadata
        .as_object()
        .ok_or_else(|| TpError::Decode("unexpected metadata format".to_string()))?;
    types.get(entity_type).ok_or_else(|| {
        TpError::validation(
            "entityType",
            format!("entity type {entity_type} not found in metadata"),
        )
    })
}

enum MediaKind {
    Image,
    Text,
    Binary,
}

fn media_kind(content_type: &str) -> MediaKind {
    let Ok(m) = content_type.parse::<Mime>() else {
        return MediaKind::Binary;
    };
    if m.type_() == mime::IMAGE {
        MediaKind::Image
    } else if m.type_() == mime::TEXT {
        MediaKind::Text
    } else {
        MediaKind::Binary
    }
}

fn json_result<T: Serialize + ?Sized>(data: &T) -> ToolOutcome {
    let text = serde_json::to_string_pretty(data)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// `Error: <message>`, plus a hint for failures the model can act on.
fn error_result(err: &TpError) -> CallToolResult {
    let mut text = format!("Error: {err}");
    match err.status() {
        Some(400) => text.push_str(
            "\n\nHint: check the where clause syntax. String, date and boolean values need single \
             quotes (Name eq 'value', IsFinal eq 'false'); numbers must not be quoted (Id eq 123).",
        ),
        Some(401) => text.push_str(
            "\n\nHint: the access token was rejected. Check TP_ACCESS_TOKEN and restart the server.",
        ),
        _ => {}
    }
    CallToolResult::error(vec![Content::text(text)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tp_mcp_client::ClientOptions;

    fn source() -> TpToolSource {
        let client = TpClient::with_options(
            "https://tp.example.com/api/v1",
            "token",
            ClientOptions::default(),
        )
        .expect("client");
        TpToolSource::new(Arc::new(client))
    }

    fn result_text(result: &CallToolResult) -> String {
        let v = serde_json::to_value(result).expect("CallToolResult serializes");
        v["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn list_tools_carries_schemas_and_annotations() {
        let tools = source().list_tools();
        assert_eq!(tools.len(), 9);

        let search = tools.iter().find(|t| t.name == SEARCH).expect("search");
        assert_eq!(
            search.input_schema.get("required"),
            Some(&serde_json::json!(["type"]))
        );
        let ann = search.annotations.as_ref().expect("annotations");
        assert_eq!(ann.read_only_hint, Some(true));

        let update = tools.iter().find(|t| t.name == UPDATE_ENTITY).expect("update");
        let ann = update.annotations.as_ref().expect("annotations");
        assert_eq!(ann.destructive_hint, Some(true));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_hard_error() {
        let err = source()
            .call_tool("delete_everything", Value::Null, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolsError::UnknownTool(ref n) if n == "delete_everything"));
    }

    #[tokio::test]
    async fn direction_without_field_is_rejected_locally() {
        let result = source()
            .call_tool(
                SEARCH,
                serde_json::json!({ "type": "Bug", "orderByDirection": "desc" }),
                &CancellationToken::new(),
            )
            .await
            .expect("result");
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("orderByDirection requires orderByField"));
    }

    #[tokio::test]
    async fn non_object_arguments_are_reported() {
        let result = source()
            .call_tool(GET_ENTITY, serde_json::json!([1, 2]), &CancellationToken::new())
            .await
            .expect("result");
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).starts_with("Error: "));
    }

    #[test]
    fn error_guidance_depends_on_status() {
        let bad_request = TpError::Api {
            status: 400,
            message: "bad where".to_string(),
            context: "GET https://tp.example.com/api/v1/Bugs".to_string(),
        };
        assert!(result_text(&error_result(&bad_request)).contains("single quotes"));

        let unauthorized = TpError::Api {
            status: 401,
            message: "nope".to_string(),
            context: String::new(),
        };
        assert!(result_text(&error_result(&unauthorized)).contains("TP_ACCESS_TOKEN"));

        let other = TpError::Api {
            status: 500,
            message: "boom".to_string(),
            context: String::new(),
        };
        assert!(!result_text(&error_result(&other)).contains("Hint"));
    }

    #[test]
    fn media_kinds() {
        assert!(matches!(media_kind("image/png"), MediaKind::Image));
        assert!(matches!(media_kind("text/plain; charset=utf-8"), MediaKind::Text));
        assert!(matches!(media_kind("application/pdf"), MediaKind::Binary));
        assert!(matches!(media_kind("garbage"), MediaKind::Binary));
    }

    #[test]
    fn offset_page_clamps() {
        let args = serde_json::json!({ "take": 500, "skip": -3 })
            .as_object()
            .cloned()
            .expect("object");
        let page = offset_page(&args, DEFAULT_COMMENT_TAKE, MAX_COMMENT_TAKE).expect("page");
        assert_eq!(page, OffsetPage { take: 100, skip: 0 });
    }
}
