//! Content-type precheck: a `HEAD` probe that rejects non-HTML resources
//! before a browser is launched for them.

use std::time::Duration;

use async_trait::async_trait;
use browserfetch_common::{FetchError, Result};
use browserfetch_http::{HttpClient, HttpError, RequestOpts, loggable_url};
use url::Url;

use crate::guard::SsrfGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    NonHtml,
    Unknown,
}

impl ContentKind {
    /// Classify a `Content-Type` header value.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(str::trim).filter(|ct| !ct.is_empty()) {
            None => ContentKind::Unknown,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                if ["text/html", "text/plain", "application/xhtml"]
                    .iter()
                    .any(|t| ct.contains(t))
                {
                    ContentKind::Html
                } else {
                    ContentKind::NonHtml
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub proceed: bool,
    pub kind: ContentKind,
    pub content_type: Option<String>,
    /// Last URL probed, after following redirects.
    pub final_url: Url,
    /// Redirect targets in the order they were followed.
    pub hops: Vec<Url>,
}

impl ProbeOutcome {
    /// Outcome for a probe that could not learn anything.
    pub fn unknown(url: &Url, hops: Vec<Url>) -> Self {
        Self {
            proceed: true,
            kind: ContentKind::Unknown,
            content_type: None,
            final_url: hops.last().cloned().unwrap_or_else(|| url.clone()),
            hops,
        }
    }

    pub fn redirected(&self) -> bool {
        !self.hops.is_empty()
    }
}

/// Probe seam used by the orchestrator; tests substitute a fake.
#[async_trait]
pub trait Precheck: Send + Sync {
    /// Classify `url`. Errors are reserved for guard rejections on redirect
    /// hops and runaway redirect chains; network trouble yields `Unknown`.
    async fn probe(&self, url: &Url) -> Result<ProbeOutcome>;
}

/// `HEAD`-based precheck that walks redirects itself so every hop passes the
/// guard before it is requested.
#[derive(Debug, Clone)]
pub struct HttpPrecheck {
    http: HttpClient,
    guard: SsrfGuard,
    timeout: Duration,
    max_redirects: usize,
}

impl HttpPrecheck {
    pub fn new(http: HttpClient, guard: SsrfGuard, timeout: Duration, max_redirects: usize) -> Self {
        Self {
            http,
            guard,
            timeout,
            max_redirects,
        }
    }
}

#[async_trait]
impl Precheck for HttpPrecheck {
    async fn probe(&self, url: &Url) -> Result<ProbeOutcome> {
        let mut current = url.clone();
        let mut hops: Vec<Url> = Vec::new();

        loop {
            let opts = RequestOpts {
                timeout: Some(self.timeout),
                retries: Some(0),
                ..Default::default()
            };
            let response = match self.http.head(&current, opts).await {
                Ok(response) => response,
                Err(err) => {
                    let reason = match err {
                        HttpError::Timeout(_) => "timeout",
                        HttpError::Network(_) | HttpError::Build(_) => "network",
                    };
                    tracing::debug!(
                        url = %loggable_url(&current),
                        reason,
                        error = %err,
                        "precheck.result"
                    );
                    return Ok(ProbeOutcome::unknown(url, hops));
                }
            };

            if let Some(next) = response.redirect_target() {
                if hops.len() >= self.max_redirects {
                    return Err(FetchError::Navigation(format!(
                        "too many redirects (more than {}) for URL: {url}",
                        self.max_redirects
                    )));
                }
                self.guard.check(&next, true).await?;
                hops.push(next.clone());
                current = next;
                continue;
            }

            let content_type = response.content_type().map(str::to_string);
            // Error pages say nothing about what the browser will render.
            let kind = if response.status.is_success() {
                ContentKind::from_content_type(content_type.as_deref())
            } else {
                ContentKind::Unknown
            };
            tracing::debug!(
                url = %loggable_url(&current),
                status = %response.status,
                kind = ?kind,
                hops = hops.len(),
                "precheck.result"
            );
            return Ok(ProbeOutcome {
                proceed: kind != ContentKind::NonHtml,
                kind,
                content_type,
                final_url: current,
                hops,
            });
        }
    }
}
