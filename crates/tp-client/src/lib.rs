//! Target Process REST client.
//!
//! - [`query`]: compiles structured search filters into the upstream `where` language.
//! - [`safety`]: host-pinning validation for every caller- or upstream-supplied URL.
//! - [`retry`]: bounded exponential backoff, cancellable.
//! - [`client`]: the request engine (auth injection, downloads, entity-type cache).

pub mod cache;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod pagination;
pub mod query;
pub mod retry;
pub mod safety;

pub use client::{ClientOptions, Download, TpClient};
pub use config::Config;
pub use entity::{ApiPage, Attachment, Comment, EntityRef, EntityType, User};
pub use error::{Result, TpError};
pub use pagination::{OffsetPage, PaginatedResponse, PaginationMeta};
pub use query::{IdOrName, OrderBy, SearchFilters, SearchRequest, SortDirection};
pub use retry::{Cancelled, RetryPolicy, Retryable};
pub use safety::{UrlRejection, validate_url};
