//! Request engine: the only part of the crate that performs network I/O.
//!
//! Every request carries the access token as a query parameter followed by `format=json`, runs
//! through the shared [`RetryPolicy`], and accepts a [`CancellationToken`]. Caller-supplied URLs
//! (search cursors, download URIs) and every download redirect target pass
//! [`validate_url`](crate::safety::validate_url) before a request is issued.

use crate::cache::{EntityTypeCache, extract_entity_types};
use crate::config::{Config, DEFAULT_REQUEST_TIMEOUT};
use crate::entity::{ApiPage, Attachment, Comment, EntityType};
use crate::error::{Result, TpError, mask_token, parse_error_body};
use crate::pagination::{OffsetPage, PaginatedResponse};
use crate::query::{SearchRequest, SortDirection, compile};
use crate::retry::RetryPolicy;
use crate::safety::{UrlRejection, validate_url};
use mime::Mime;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

pub const ACCESS_TOKEN_PARAM: &str = "access_token";
pub const FORMAT_PARAM: &str = "format";
pub const MAX_REDIRECTS: usize = 10;
pub const HTML_PREVIEW_CHARS: usize = 500;

/// Fields requested for comments when the caller does not choose any.
pub const DEFAULT_COMMENT_INCLUDE: &[&str] = &["Description", "CreateDate", "Owner"];

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub type_cache_ttl: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            type_cache_ttl: crate::cache::DEFAULT_TYPE_CACHE_TTL,
        }
    }
}

/// Downloaded attachment content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct TpClient {
    inner: Arc<TpClientInner>,
}

struct TpClientInner {
    base_url: String,
    access_token: String,
    retry: RetryPolicy,
    client: Client,
    /// Redirects are followed by hand so each hop can be validated and re-authenticated.
    download_client: Client,
    type_cache: EntityTypeCache,
}

impl TpClient {
    /// Build a client for the configured domain.
    ///
    /// # Errors
    ///
    /// Returns [`TpError::Config`] if the HTTP clients cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_options(
            &config.base_url(),
            &config.access_token,
            ClientOptions {
                retry: config.retry,
                request_timeout: config.request_timeout,
                ..ClientOptions::default()
            },
        )
    }

    /// Build a client against an explicit API base URL (e.g. `https://host/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns [`TpError::Config`] if the base URL is not an absolute URL with a host, or if the
    /// HTTP clients cannot be built.
    pub fn with_options(base_url: &str, access_token: &str, options: ClientOptions) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| TpError::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        if parsed.host_str().is_none() {
            return Err(TpError::Config(format!(
                "Invalid base URL '{base_url}': missing host"
            )));
        }

        let build = || {
            Client::builder()
                .timeout(options.request_timeout)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .map_err(|e| TpError::Config(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            inner: Arc::new(TpClientInner {
                base_url: base_url.trim_end_matches('/').to_string(),
                access_token: access_token.to_string(),
                retry: options.retry,
                client: build()?,
                download_client: build()?,
                type_cache: EntityTypeCache::new(options.type_cache_ttl),
            }),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // ------------------------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------------------------

    /// Search entities, or continue a previous search from its cursor.
    ///
    /// With a cursor, filters/sort/include/take are ignored and the validated cursor URL is
    /// requested as-is.
    ///
    /// # Errors
    ///
    /// Returns [`TpError::UrlRejected`] for a cursor on a foreign host, and any request error.
    pub async fn search_entities(
        &self,
        cancel: &CancellationToken,
        req: &SearchRequest,
    ) -> Result<PaginatedResponse> {
        let url = match req.active_cursor() {
            Some(cursor) => self.guard(cursor)?,
            None => self.search_url(req)?,
        };
        let page: ApiPage = self.get_json(cancel, url).await?;
        Ok(PaginatedResponse::from_page(page))
    }

    /// URL for the first page of a search (no credentials attached).
    ///
    /// # Errors
    ///
    /// Returns [`TpError::Config`] if the URL cannot be assembled.
    pub fn search_url(&self, req: &SearchRequest) -> Result<Url> {
        let mut url = self.endpoint(&req.entity_type.plural())?;
        let where_clause = compile(&req.filters, req.raw_where.as_deref());
        {
            let mut q = url.query_pairs_mut();
            if !where_clause.is_empty() {
                q.append_pair("where", &where_clause);
            }
            if !req.include.is_empty() {
                q.append_pair("include", &include_list(&req.include));
            }
            if let Some(take) = req.take.filter(|t| *t > 0) {
                q.append_pair("take", &take.to_string());
            }
            if let Some(order) = req.order_by.as_ref().filter(|o| !o.field.is_empty()) {
                let key = match order.direction {
                    SortDirection::Asc => "orderBy",
                    SortDirection::Desc => "orderByDesc",
                };
                q.append_pair(key, &order.field);
            }
        }
        drop_empty_query(&mut url);
        Ok(url)
    }

    // ------------------------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn get_entity(
        &self,
        cancel: &CancellationToken,
        entity_type: EntityType,
        id: i64,
        include: &[String],
    ) -> Result<Map<String, Value>> {
        let mut url = self.endpoint(&format!("{}/{id}", entity_type.plural()))?;
        if !include.is_empty() {
            url.query_pairs_mut()
                .append_pair("include", &include_list(include));
        }
        self.get_json(cancel, url).await
    }

    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn create_entity(
        &self,
        cancel: &CancellationToken,
        entity_type: EntityType,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let url = self.endpoint(&entity_type.plural())?;
        self.post_json(cancel, url, &Value::Object(data.clone())).await
    }

    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn update_entity(
        &self,
        cancel: &CancellationToken,
        entity_type: EntityType,
        id: i64,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let url = self.endpoint(&format!("{}/{id}", entity_type.plural()))?;
        self.post_json(cancel, url, &Value::Object(data.clone())).await
    }

    // ------------------------------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------------------------------

    /// Add a private comment to an entity.
    ///
    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn create_comment(
        &self,
        cancel: &CancellationToken,
        entity_id: i64,
        description: &str,
    ) -> Result<Comment> {
        let url = self.endpoint("Comments")?;
        let body = json!({
            "Description": description,
            "General": { "Id": entity_id },
            "IsPrivate": true,
        });
        self.post_json(cancel, url, &body).await
    }

    /// Newest comments first. An empty `include` requests [`DEFAULT_COMMENT_INCLUDE`].
    ///
    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn list_comments(
        &self,
        cancel: &CancellationToken,
        entity_id: i64,
        page: OffsetPage,
        include: &[String],
    ) -> Result<Vec<Comment>> {
        let include: Vec<String> = if include.is_empty() {
            DEFAULT_COMMENT_INCLUDE.iter().map(|s| (*s).to_string()).collect()
        } else {
            include.to_vec()
        };

        let mut url = self.endpoint("Comments")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("where", &format!("General.Id eq {entity_id}"));
            page.append_to(&mut q);
            q.append_pair("include", &include_list(&include));
            q.append_pair("orderBy", "CreateDate desc");
        }
        let page: ApiPage = self.get_json(cancel, url).await?;
        Ok(page.decode_items())
    }

    // ------------------------------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn list_attachments(
        &self,
        cancel: &CancellationToken,
        entity_id: i64,
        page: OffsetPage,
    ) -> Result<Vec<Attachment>> {
        let mut url = self.endpoint("Attachments")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("where", &format!("General.Id eq {entity_id}"));
            page.append_to(&mut q);
        }
        let page: ApiPage = self.get_json(cancel, url).await?;
        Ok(page.decode_items())
    }

    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn get_attachment_metadata(
        &self,
        cancel: &CancellationToken,
        attachment_id: i64,
    ) -> Result<Attachment> {
        let url = self.endpoint(&format!("Attachments/{attachment_id}"))?;
        self.get_json(cancel, url).await
    }

    /// Site-level download link for an attachment (outside the API prefix).
    ///
    /// # Errors
    ///
    /// Returns [`TpError::Config`] if the URL cannot be assembled.
    pub fn attachment_download_url(&self, attachment_id: i64) -> Result<Url> {
        let mut url = self.endpoint("")?;
        url.set_path("/Attachment.aspx");
        url.set_query(Some(&format!("AttachmentID={attachment_id}")));
        Ok(url)
    }

    /// Download attachment content from `uri`.
    ///
    /// `uri` must be an absolute URL on the configured host. Redirects are followed by hand (at
    /// most [`MAX_REDIRECTS`]); every `Location` is validated against the trusted host before the
    /// token is re-attached. An HTML response is treated as a failed (unauthenticated) download.
    ///
    /// # Errors
    ///
    /// Returns [`TpError::UrlRejected`], [`TpError::TooManyRedirects`],
    /// [`TpError::ContentMismatch`], or any request error.
    pub async fn download_attachment(
        &self,
        cancel: &CancellationToken,
        uri: &str,
    ) -> Result<Download> {
        let url = self.guard(uri)?;
        self.inner
            .retry
            .execute(cancel, move || self.download_once(url.clone()))
            .await
    }

    async fn download_once(&self, start: Url) -> Result<Download> {
        let mut current = start;
        let mut redirects = 0usize;

        loop {
            let mut authed = current.clone();
            self.authorize(&mut authed);

            let resp = self
                .inner
                .download_client
                .get(authed)
                .send()
                .await
                .map_err(|e| TpError::transport(&e))?;
            let status = resp.status();

            if status.is_redirection() {
                if redirects >= MAX_REDIRECTS {
                    return Err(TpError::TooManyRedirects {
                        limit: MAX_REDIRECTS,
                    });
                }
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| TpError::Api {
                        status: status.as_u16(),
                        message: "redirect without a Location header".to_string(),
                        context: self.context_for(&Method::GET, &current),
                    })?;
                let next = current.join(location).map_err(|_| TpError::UrlRejected {
                    url: mask_token(location, &self.inner.access_token),
                    reason: UrlRejection::Malformed,
                })?;
                current = self.guard(next.as_str())?;
                redirects += 1;
                debug!(hop = redirects, "following download redirect");
                continue;
            }

            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = resp.bytes().await.map_err(|e| TpError::transport(&e))?;

            if !status.is_success() {
                return Err(self.api_error(status, &bytes, &Method::GET, &current));
            }

            if let Some(ct) = content_type.as_deref()
                && is_html(ct)
            {
                let preview: String = String::from_utf8_lossy(&bytes)
                    .chars()
                    .take(HTML_PREVIEW_CHARS)
                    .collect();
                return Err(TpError::ContentMismatch {
                    content_type: ct.to_string(),
                    preview: mask_token(&preview, &self.inner.access_token),
                });
            }

            return Ok(Download {
                bytes: bytes.to_vec(),
                mime_type: content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            });
        }
    }

    // ------------------------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------------------------

    /// Raw metadata document (`/Index/meta`).
    ///
    /// # Errors
    ///
    /// Returns any request or decode error.
    pub async fn fetch_metadata(&self, cancel: &CancellationToken) -> Result<Value> {
        let url = self.endpoint("Index/meta")?;
        self.get_json(cancel, url).await
    }

    /// Entity type names known to upstream, cached for an hour.
    ///
    /// Never fails: when metadata is unavailable the built-in list is returned.
    pub async fn get_valid_entity_types(&self, cancel: &CancellationToken) -> Vec<String> {
        let types = self
            .inner
            .type_cache
            .get_or_refresh(|| async {
                self.fetch_metadata(cancel)
                    .await
                    .map(|meta| extract_entity_types(&meta))
            })
            .await;
        types.as_ref().clone()
    }

    /// Populate the entity-type cache in the background.
    ///
    /// Fire-and-forget: failures are logged by the cache and never reach callers.
    pub fn warm_up_type_cache(&self) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let types = client
                .get_valid_entity_types(&CancellationToken::new())
                .await;
            debug!(count = types.len(), "entity type cache warm-up finished");
        })
    }

    // ------------------------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------------------------

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| TpError::Config(format!("Invalid URL '{raw}': {e}")))
    }

    fn guard(&self, candidate: &str) -> Result<Url> {
        validate_url(candidate, &self.inner.base_url).map_err(|reason| {
            let url = mask_token(candidate, &self.inner.access_token);
            warn!(url = %url, reason = %reason, "outbound URL rejected");
            TpError::UrlRejected { url, reason }
        })
    }

    /// Set `access_token`, replacing any value already on the URL.
    fn authorize(&self, url: &mut Url) {
        set_query_param(url, ACCESS_TOKEN_PARAM, &self.inner.access_token);
    }

    fn context_for(&self, method: &Method, url: &Url) -> String {
        let mut shown = url.clone();
        remove_query_param(&mut shown, ACCESS_TOKEN_PARAM);
        mask_token(&format!("{method} {shown}"), &self.inner.access_token)
    }

    fn api_error(&self, status: StatusCode, body: &[u8], method: &Method, url: &Url) -> TpError {
        let text = String::from_utf8_lossy(body);
        TpError::Api {
            status: status.as_u16(),
            message: mask_token(&parse_error_body(&text), &self.inner.access_token),
            context: self.context_for(method, url),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, cancel: &CancellationToken, url: Url) -> Result<T> {
        let bytes = self.send(cancel, Method::GET, url, None).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &Value,
    ) -> Result<T> {
        let bytes = self.send(cancel, Method::POST, url, Some(body)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Vec<u8>> {
        let method = &method;
        let url = &url;
        self.inner
            .retry
            .execute(cancel, move || self.send_once(method.clone(), url.clone(), body))
            .await
    }

    async fn send_once(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Vec<u8>> {
        let mut authed = url.clone();
        self.authorize(&mut authed);
        set_query_param(&mut authed, FORMAT_PARAM, "json");

        let mut request = self.inner.client.request(method.clone(), authed);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| TpError::transport(&e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| TpError::transport(&e))?;

        if !status.is_success() {
            let err = self.api_error(status, &bytes, &method, &url);
            debug!(status = status.as_u16(), error = %err, "upstream request failed");
            return Err(err);
        }
        Ok(bytes.to_vec())
    }
}

/// `[a,b,c]`, the upstream list syntax for `include`.
fn include_list(fields: &[String]) -> String {
    format!("[{}]", fields.join(","))
}

fn is_html(content_type: &str) -> bool {
    match content_type.parse::<Mime>() {
        Ok(m) => m.type_() == mime::TEXT && m.subtype() == mime::HTML,
        Err(_) => content_type.to_ascii_lowercase().contains("text/html"),
    }
}

/// Replace any existing values of `key` with a single `key=value` at the end of the query.
pub(crate) fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let retained = retained_pairs(url, key);
    let mut q = url.query_pairs_mut();
    q.clear();
    for (k, v) in &retained {
        q.append_pair(k, v);
    }
    q.append_pair(key, value);
}

fn remove_query_param(url: &mut Url, key: &str) {
    let retained = retained_pairs(url, key);
    if retained.is_empty() {
        url.set_query(None);
        return;
    }
    let mut q = url.query_pairs_mut();
    q.clear();
    for (k, v) in &retained {
        q.append_pair(k, v);
    }
}

fn retained_pairs(url: &Url, key: &str) -> Vec<(String, String)> {
    url.query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn drop_empty_query(url: &mut Url) {
    if url.query() == Some("") {
        url.set_query(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{IdOrName, SearchFilters};

    fn client() -> TpClient {
        TpClient::with_options(
            "https://tp.example.com/api/v1",
            "s3cret",
            ClientOptions::default(),
        )
        .expect("client")
    }

    fn query_map(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn search_url_carries_where_include_take_and_sort() {
        let req = SearchRequest::new(EntityType::Bug)
            .with_filters(SearchFilters {
                status: Some("Open".to_string()),
                project: Some(IdOrName::Id(12)),
                ..SearchFilters::default()
            })
            .with_include(["Id", "Name"])
            .with_take(50)
            .with_order_by("CreateDate", SortDirection::Desc);

        let url = client().search_url(&req).expect("url");
        assert_eq!(url.path(), "/api/v1/Bugs");
        assert_eq!(
            query_map(&url),
            vec![
                (
                    "where".to_string(),
                    "EntityState.Name eq 'Open' and Project.Id eq 12".to_string()
                ),
                ("include".to_string(), "[Id,Name]".to_string()),
                ("take".to_string(), "50".to_string()),
                ("orderByDesc".to_string(), "CreateDate".to_string()),
            ]
        );
    }

    #[test]
    fn bare_search_has_no_query() {
        let url = client()
            .search_url(&SearchRequest::new(EntityType::UserStory))
            .expect("url");
        assert_eq!(url.as_str(), "https://tp.example.com/api/v1/UserStorys");
    }

    #[test]
    fn set_query_param_replaces_existing_values() {
        let mut url =
            Url::parse("https://tp.example.com/api/v1/Bugs?access_token=old&skip=25").expect("url");
        set_query_param(&mut url, ACCESS_TOKEN_PARAM, "new");
        set_query_param(&mut url, FORMAT_PARAM, "json");
        assert_eq!(
            query_map(&url),
            vec![
                ("skip".to_string(), "25".to_string()),
                ("access_token".to_string(), "new".to_string()),
                ("format".to_string(), "json".to_string()),
            ]
        );
    }

    #[test]
    fn context_never_contains_token() {
        let c = client();
        let url = Url::parse("https://tp.example.com/api/v1/Bugs?access_token=s3cret&take=5")
            .expect("url");
        let ctx = c.context_for(&Method::GET, &url);
        assert_eq!(ctx, "GET https://tp.example.com/api/v1/Bugs?take=5");
    }

    #[test]
    fn download_url_is_site_relative() {
        let url = client().attachment_download_url(42).expect("url");
        assert_eq!(
            url.as_str(),
            "https://tp.example.com/Attachment.aspx?AttachmentID=42"
        );
    }

    #[test]
    fn html_detection() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("TEXT/HTML"));
        assert!(!is_html("image/png"));
        assert!(!is_html("text/plain"));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = TpClient::with_options("tp.example.com", "t", ClientOptions::default())
            .err()
            .expect("error");
        assert!(matches!(err, TpError::Config(_)));
    }

    #[tokio::test]
    async fn foreign_cursor_is_rejected_before_any_request() {
        let req = SearchRequest::from_cursor(EntityType::Bug, "https://evil.com/api/v1/Bugs?skip=1");
        let err = client()
            .search_entities(&CancellationToken::new(), &req)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TpError::UrlRejected {
                reason: UrlRejection::HostnameMismatch,
                ..
            }
        ));
    }
}
