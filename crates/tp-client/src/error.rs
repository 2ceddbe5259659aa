//! Error taxonomy for `tp-mcp-client`.
//!
//! Every failure path returns a [`TpError`]. Retry decisions are derived from the variant (and,
//! for upstream failures, the status code) by [`TpError::is_retryable`]; the error value itself
//! never carries a retry flag.

use crate::retry::{Cancelled, Retryable};
use crate::safety::UrlRejection;
use thiserror::Error;
use url::Url;

/// Replacement written wherever the access token would otherwise appear.
pub const REDACTION_MARKER: &str = "***";

#[derive(Debug, Error)]
pub enum TpError {
    /// Network-level failure (connect, TLS, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-2xx status.
    #[error("API error {status}: {message} (context: {context})")]
    Api {
        status: u16,
        message: String,
        context: String,
    },

    /// Upstream answered 2xx but the body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A caller- or upstream-supplied URL failed SSRF validation.
    #[error("SSRF validation failed for URL {url}: {reason}")]
    UrlRejected { url: String, reason: UrlRejection },

    /// A download returned an HTML page instead of file content (usually a login page).
    #[error(
        "download returned {content_type} instead of file content (likely authentication failure): {preview}"
    )]
    ContentMismatch {
        content_type: String,
        preview: String,
    },

    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("validation error on field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TpError>;

impl TpError {
    /// Whether repeating the same request could plausibly succeed.
    ///
    /// Upstream 400 (malformed request) and 401 (stale credential) are final; every other
    /// upstream status is retried. Transport and decode failures are usually transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status != 400 && *status != 401,
            Self::Transport(_) | Self::Decode(_) => true,
            Self::UrlRejected { .. }
            | Self::ContentMismatch { .. }
            | Self::TooManyRedirects { .. }
            | Self::Cancelled
            | Self::InvalidEntityType(_)
            | Self::Validation { .. }
            | Self::Config(_) => false,
        }
    }

    /// Upstream status code, when the failure came from an HTTP response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn transport(e: &reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(e))
    }
}

impl Retryable for TpError {
    fn is_retryable(&self) -> bool {
        TpError::is_retryable(self)
    }
}

impl From<Cancelled> for TpError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<serde_json::Error> for TpError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Replace every occurrence of `token` in `msg` with [`REDACTION_MARKER`].
#[must_use]
pub fn mask_token(msg: &str, token: &str) -> String {
    if token.is_empty() {
        return msg.to_string();
    }
    msg.replace(token, REDACTION_MARKER)
}

/// Extract a readable message from an upstream error body.
///
/// Target Process answers errors with XML such as
/// `<Error><Status>BadRequest</Status><Message>...</Message></Error>`.
#[must_use]
pub fn parse_error_body(body: &str) -> String {
    const OPEN: &str = "<Message>";
    const CLOSE: &str = "</Message>";

    if let (Some(start), Some(end)) = (body.find(OPEN), body.find(CLOSE))
        && end > start
    {
        return body[start + OPEN.len()..end].to_string();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Drop credentials, query, and fragment from a URL before it is shown anywhere.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> TpError {
        TpError::Api {
            status,
            message: "boom".to_string(),
            context: "GET https://tp.example.com/api/v1/Bugs".to_string(),
        }
    }

    #[test]
    fn bad_request_and_unauthorized_are_final() {
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
    }

    #[test]
    fn other_statuses_are_retried() {
        for status in [403, 404, 429, 500, 502, 503] {
            assert!(api(status).is_retryable(), "status {status}");
        }
    }

    #[test]
    fn non_http_failures_follow_their_category() {
        assert!(TpError::Transport("reset".into()).is_retryable());
        assert!(TpError::Decode("eof".into()).is_retryable());
        assert!(!TpError::Cancelled.is_retryable());
        assert!(!TpError::TooManyRedirects { limit: 10 }.is_retryable());
        assert!(
            !TpError::UrlRejected {
                url: "https://evil.com".into(),
                reason: UrlRejection::HostnameMismatch,
            }
            .is_retryable()
        );
        assert!(
            !TpError::ContentMismatch {
                content_type: "text/html".into(),
                preview: "<html>".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn mask_token_replaces_every_occurrence() {
        let masked = mask_token("token=abc123 and again abc123", "abc123");
        assert_eq!(masked, "token=*** and again ***");
        assert_eq!(mask_token("nothing here", ""), "nothing here");
    }

    #[test]
    fn parse_error_body_prefers_xml_message() {
        let body = "<Error><Status>BadRequest</Status><Message>Error during parameters parsing.</Message></Error>";
        assert_eq!(parse_error_body(body), "Error during parameters parsing.");
        assert_eq!(parse_error_body("  plain failure \n"), "plain failure");
        assert_eq!(parse_error_body("   "), "empty response");
    }

    #[test]
    fn redact_url_strips_query_and_credentials() {
        let url = Url::parse("https://user:pw@tp.example.com/api/v1/Bugs?access_token=s3cret#x")
            .expect("url");
        assert_eq!(redact_url(&url), "https://tp.example.com/api/v1/Bugs");
    }
}
