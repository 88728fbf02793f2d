//! Common types shared across the browserfetch crates.
//!
//! This crate holds the pieces every other crate consults: the typed
//! per-request error, the static resource limit policy, the browser stealth
//! level and the tracing initialiser. It stays dependency-light so the driver,
//! HTTP and web crates can all depend on it.
//!
//! # Overview
//!
//! - [`FetchError`] and [`Result`]: the per-request failure taxonomy
//! - [`limits::ResourceLimits`]: wait, output, screenshot, cache and concurrency caps
//! - [`StealthLevel`]: how much anti-detection patching the browser applies
//! - [`SandboxMode`]: whether the browser keeps its OS sandbox
//! - [`observability`]: centralised `tracing` setup
//!
//! # Examples
//!
//! ```rust
//! use browserfetch_common::limits::ResourceLimits;
//!
//! let limits = ResourceLimits::default();
//! assert_eq!(limits.max_concurrency, 4);
//! assert_eq!(limits.effective_max_chars(0), 500_000);
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod limits;
pub mod observability;

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    #[default]
    Balanced,
    Maximum,
}

/// Whether the browser keeps its OS-level sandbox.
///
/// Only the exact literal `"1"` in `BROWSERFETCH_NO_SANDBOX` selects
/// [`SandboxMode::Disabled`]; see `browserfetch-config`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SandboxMode {
    #[default]
    Enabled,
    Disabled,
}

/// Which part of the block-list a rejected address fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressClass {
    /// RFC1918, loopback, link-local and unique-local ranges.
    Private,
    /// Unspecified, multicast, documentation, benchmarking and other reserved ranges.
    Reserved,
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressClass::Private => f.write_str("private/internal"),
            AddressClass::Reserved => f.write_str("reserved"),
        }
    }
}

/// Failures surfaced by a single fetch or screenshot request.
///
/// Every variant terminates only the request that produced it. Messages are
/// meant for the caller and never include resolved IP addresses.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Unparseable URL, missing host or a scheme outside http/https.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The host (or a redirect hop) resolves to a blocked address.
    #[error("access to {class} addresses is blocked: {host}")]
    SsrfRejected { host: String, class: AddressClass },

    /// DNS gave no usable answer; the request fails closed.
    #[error("could not resolve hostname: {host}")]
    ResolutionFailed { host: String },

    /// The precheck saw a non-HTML resource.
    #[error("URL content type is '{content_type}', not a web page: {url}")]
    UnsupportedContentType { url: String, content_type: String },

    /// The navigation did not settle inside its deadline.
    #[error("page load timed out after {}s for URL: {url}", .after.as_secs())]
    NavigationTimeout { url: String, after: Duration },

    /// The browser reported a failure.
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("content extraction failed: {0}")]
    Extraction(String),

    /// Screenshot over its byte or pixel-height cap.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl FetchError {
    /// Stable short name used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::SsrfRejected { .. } => "ssrf_rejected",
            FetchError::ResolutionFailed { .. } => "resolution_failed",
            FetchError::UnsupportedContentType { .. } => "unsupported_content_type",
            FetchError::NavigationTimeout { .. } => "navigation_timeout",
            FetchError::Navigation(_) => "navigation_error",
            FetchError::Extraction(_) => "extraction_failure",
            FetchError::ResourceLimitExceeded(_) => "resource_limit_exceeded",
        }
    }
}

/// Convenient alias for results that use [`FetchError`].
pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssrf_message_names_host_but_not_address() {
        let err = FetchError::SsrfRejected {
            host: "metadata.evil.test".into(),
            class: AddressClass::Private,
        };
        let msg = err.to_string();
        assert_eq!(
            msg,
            "access to private/internal addresses is blocked: metadata.evil.test"
        );
        assert!(!msg.contains("169.254"));
    }

    #[test]
    fn timeout_message_reports_whole_seconds() {
        let err = FetchError::NavigationTimeout {
            url: "https://slow.test/".into(),
            after: Duration::from_millis(37_400),
        };
        assert_eq!(
            err.to_string(),
            "page load timed out after 37s for URL: https://slow.test/"
        );
        assert_eq!(err.kind(), "navigation_timeout");
    }

    #[test]
    fn stealth_level_parses_lowercase() {
        let level: StealthLevel = serde_json::from_str("\"maximum\"").unwrap();
        assert_eq!(level, StealthLevel::Maximum);
        assert_eq!(StealthLevel::default(), StealthLevel::Balanced);
    }
}
