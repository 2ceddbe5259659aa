//! Pagination metadata.
//!
//! Search results use cursor pagination: the upstream `Next` link is handed back verbatim as an
//! opaque cursor. Comment and attachment listings use offset pagination ([`OffsetPage`]) and
//! never issue or consume a cursor.

use crate::entity::ApiPage;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub has_more: bool,
    /// Next-page link; empty when there is no further page.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cursor: String,
    pub returned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaginatedResponse {
    pub items: Vec<Map<String, Value>>,
    pub pagination: PaginationMeta,
}

impl PaginatedResponse {
    #[must_use]
    pub fn from_page(page: ApiPage) -> Self {
        let cursor = page.next.filter(|n| !n.is_empty()).unwrap_or_default();
        let returned = page.items.len();
        Self {
            items: page.items,
            pagination: PaginationMeta {
                has_more: !cursor.is_empty(),
                cursor,
                returned,
            },
        }
    }
}

/// Offset window for list endpoints that do not support cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPage {
    pub take: u32,
    pub skip: u32,
}

impl OffsetPage {
    /// `take=<n>` plus `skip=<n>` when not on the first page.
    pub(crate) fn append_to(self, query: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>) {
        query.append_pair("take", &self.take.to_string());
        if self.skip > 0 {
            query.append_pair("skip", &self.skip.to_string());
        }
    }
}
