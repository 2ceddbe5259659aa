//! Process configuration, read once from the environment at startup.
//!
//! Env:
//! - `TP_DOMAIN` (required): bare hostname of the Target Process instance, no scheme.
//! - `TP_ACCESS_TOKEN` (required): API access token.
//! - `TP_REQUEST_TIMEOUT_SECS` (optional): per-request timeout, default 30.

use crate::error::{Result, TpError};
use crate::retry::RetryPolicy;
use std::fmt;
use std::time::Duration;

pub const ENV_DOMAIN: &str = "TP_DOMAIN";
pub const ENV_ACCESS_TOKEN: &str = "TP_ACCESS_TOKEN";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "TP_REQUEST_TIMEOUT_SECS";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API path prefix under the configured domain.
pub const API_PATH: &str = "/api/v1";

#[derive(Clone)]
pub struct Config {
    pub domain: String,
    pub access_token: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("domain", &self.domain)
            .field("access_token", &"***")
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`TpError::Config`] if `TP_DOMAIN` or `TP_ACCESS_TOKEN` is missing or blank, or
    /// if the optional timeout is not a whole number of seconds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (Some(domain), Some(access_token)) =
            (required(ENV_DOMAIN), required(ENV_ACCESS_TOKEN))
        else {
            return Err(TpError::Config(format!(
                "{ENV_DOMAIN} and {ENV_ACCESS_TOKEN} environment variables are required"
            )));
        };

        if domain.contains("://") || domain.contains('/') {
            return Err(TpError::Config(format!(
                "{ENV_DOMAIN} must be a bare hostname without scheme or path, got '{domain}'"
            )));
        }

        let request_timeout = match required(ENV_REQUEST_TIMEOUT_SECS) {
            None => DEFAULT_REQUEST_TIMEOUT,
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                TpError::Config(format!(
                    "{ENV_REQUEST_TIMEOUT_SECS} must be a whole number of seconds, got '{raw}'"
                ))
            })?,
        };

        Ok(Self {
            domain,
            access_token,
            retry: RetryPolicy::default(),
            request_timeout,
        })
    }

    /// `https://<domain>/api/v1`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}{API_PATH}", self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn loads_required_values_with_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_DOMAIN, "acme.tpondemand.com"),
            (ENV_ACCESS_TOKEN, "tok"),
        ]))
        .expect("config");
        assert_eq!(cfg.base_url(), "https://acme.tpondemand.com/api/v1");
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = Config::from_lookup(lookup(&[(ENV_DOMAIN, "acme.tpondemand.com")])).unwrap_err();
        assert!(matches!(err, TpError::Config(_)));
    }

    #[test]
    fn blank_domain_is_fatal() {
        let err =
            Config::from_lookup(lookup(&[(ENV_DOMAIN, "  "), (ENV_ACCESS_TOKEN, "tok")])).unwrap_err();
        assert!(err.to_string().contains(ENV_DOMAIN));
    }

    #[test]
    fn domain_with_scheme_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            (ENV_DOMAIN, "https://acme.tpondemand.com"),
            (ENV_ACCESS_TOKEN, "tok"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("bare hostname"));
    }

    #[test]
    fn timeout_override() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_DOMAIN, "acme.tpondemand.com"),
            (ENV_ACCESS_TOKEN, "tok"),
            (ENV_REQUEST_TIMEOUT_SECS, "5"),
        ]))
        .expect("config");
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));

        let err = Config::from_lookup(lookup(&[
            (ENV_DOMAIN, "acme.tpondemand.com"),
            (ENV_ACCESS_TOKEN, "tok"),
            (ENV_REQUEST_TIMEOUT_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, TpError::Config(_)));
    }

    #[test]
    fn debug_output_hides_token() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_DOMAIN, "acme.tpondemand.com"),
            (ENV_ACCESS_TOKEN, "super-secret"),
        ]))
        .expect("config");
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
