//! Outbound URL validation (SSRF protection).
//!
//! Any URL that did not originate from the trusted base (pagination cursors, download URIs,
//! redirect targets) must pass [`validate_url`] before a request carrying the access token is
//! issued. The check pins the scheme and the authority exactly as written; paths are not restricted because the
//! upstream serves content under several prefixes (`/api/v1/`, `/Upload/`, `/Attachment.aspx`).

use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlRejection {
    Empty,
    Malformed,
    RelativeNotAllowed,
    HostnameMismatch,
    SchemeMismatch,
    MalformedBase,
}

impl fmt::Display for UrlRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty URL",
            Self::Malformed => "malformed URL",
            Self::RelativeNotAllowed => "relative URLs not allowed",
            Self::HostnameMismatch => "hostname does not match configured domain",
            Self::SchemeMismatch => "scheme does not match configured domain",
            Self::MalformedBase => "malformed base URL",
        };
        f.write_str(s)
    }
}

/// Validate `candidate` against `trusted_base`.
///
/// Checks run in order and the first failure wins: empty, malformed, relative, authority
/// mismatch, scheme mismatch. The authority is compared as written, so `good.com:443` does not
/// match `good.com`; only letter case is ignored. Relative references are rejected rather than resolved against the base.
///
/// # Errors
///
/// Returns the [`UrlRejection`] describing the first failed check.
pub fn validate_url(candidate: &str, trusted_base: &str) -> Result<Url, UrlRejection> {
    if candidate.is_empty() {
        return Err(UrlRejection::Empty);
    }

    let target = match Url::parse(candidate) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Err(UrlRejection::RelativeNotAllowed);
        }
        Err(_) => return Err(UrlRejection::Malformed),
    };

    if target.cannot_be_a_base() || target.host_str().is_none_or(str::is_empty) {
        return Err(UrlRejection::RelativeNotAllowed);
    }

    let base = Url::parse(trusted_base).map_err(|_| UrlRejection::MalformedBase)?;

    match (raw_authority(candidate), raw_authority(trusted_base)) {
        (Some(target_host), Some(base_host)) if target_host.eq_ignore_ascii_case(base_host) => {}
        _ => return Err(UrlRejection::HostnameMismatch),
    }

    if target.scheme() != base.scheme() {
        return Err(UrlRejection::SchemeMismatch);
    }

    Ok(target)
}

/// `host[:port]` exactly as written between `//` and the path, without userinfo.
fn raw_authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    Some(authority.rsplit_once('@').map_or(authority, |(_, host)| host))
}
