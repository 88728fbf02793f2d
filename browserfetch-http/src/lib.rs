//! Header-only HTTP client with safe logging and bounded retries.
//!
//! - One request per call: redirects are never followed automatically, so the
//!   caller can validate every hop before it is requested
//! - Retries transport failures (not timeouts) with exponential backoff
//! - Redacts sensitive query params in every log line
//! - Optional *raw* response logging via `BROWSERFETCH_HTTP_RAW=1` (exact value)
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), browserfetch_http::HttpError> {
//! let client = browserfetch_http::HttpClient::new()?;
//! let url = reqwest::Url::parse("https://example.com/").unwrap();
//! let head = client.head(&url, browserfetch_http::RequestOpts::default()).await?;
//! println!("{:?}", head.content_type());
//! # Ok(()) }
//! ```
//!
//! Observability: `tracing` events `http.request.start`, `http.response.headers`,
//! `http.retrying.network_send` and `http.network_error.send`, plus target
//! `http.raw` when raw logging is on.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Method, StatusCode, Url};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

// ==============================
// Raw logging toggle
// ==============================

const RAW_ENV: &str = "BROWSERFETCH_HTTP_RAW";

fn raw_enabled() -> bool {
    matches!(env::var(RAW_ENV).as_deref(), Ok("1"))
}

const SECRET_QUERY_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "apikey",
    "token",
    "secret",
    "client_secret",
    "password",
    "signature",
    "sig",
];

/// Redact sensitive headers for logging.
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if key.eq_ignore_ascii_case("set-cookie")
                || key.eq_ignore_ascii_case("authorization")
            {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

/// Split a URL into `host + path` and a query list with secret values redacted.
pub fn redact_query(url: &Url) -> (String, Vec<(String, String)>) {
    let host_path = format!("{}{}", url.host_str().unwrap_or("-"), url.path());
    let redacted = url
        .query_pairs()
        .map(|(k, v)| {
            let is_secret = SECRET_QUERY_KEYS.contains(&k.to_ascii_lowercase().as_str());
            let v = if is_secret {
                "<redacted>".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    (host_path, redacted)
}

/// Render a URL for logs with secret query values replaced.
pub fn loggable_url(url: &Url) -> String {
    let (host_path, query) = redact_query(url);
    if query.is_empty() {
        return format!("{}://{}", url.scheme(), host_path);
    }
    let q = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}://{}?{}", url.scheme(), host_path, q)
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

// ==============================
// Request options & response
// ==============================

/// Per-request tuning knobs.
///
/// ```
/// use browserfetch_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(5)),
///     retries: Some(0),
///     ..Default::default()
/// };
/// assert_eq!(opts.timeout.unwrap().as_secs(), 5);
/// assert!(opts.headers.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
}

/// Status line and headers of a single, unfollowed response.
#[derive(Debug, Clone)]
pub struct HeadResponse {
    /// The URL that was requested.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl HeadResponse {
    /// Raw `Content-Type` header value, if present and non-empty.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Redirect target resolved against the requested URL, for 3xx responses.
    pub fn redirect_target(&self) -> Option<Url> {
        if !self.status.is_redirection() {
            return None;
        }
        let location = self.headers.get(LOCATION)?.to_str().ok()?;
        self.url.join(location).ok()
    }
}

// ==============================
// Client
// ==============================

#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client that never follows redirects on its own.
    ///
    /// ```no_run
    /// use browserfetch_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new()?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(5));
    /// assert_eq!(client.max_retries, 1);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new() -> Result<Self, HttpError> {
        Self::from_builder(Client::builder())
    }

    /// Finish a caller-prepared builder (e.g. with DNS overrides). Redirect
    /// following is always switched off.
    pub fn from_builder(builder: ClientBuilder) -> Result<Self, HttpError> {
        let inner = builder
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            default_timeout: Duration::from_secs(5),
            max_retries: 1,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Issue one `HEAD` request and return its status line and headers.
    pub async fn head(&self, url: &Url, opts: RequestOpts) -> Result<HeadResponse, HttpError> {
        self.request_headers(Method::HEAD, url, opts).await
    }

    async fn request_headers(
        &self,
        method: Method,
        url: &Url,
        opts: RequestOpts,
    ) -> Result<HeadResponse, HttpError> {
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let req_id = Uuid::new_v4().simple().to_string();
        let (host_path, redacted_q) = redact_query(url);
        let mut attempt = 0usize;

        loop {
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout);
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }
            if opts
                .headers
                .as_ref()
                .is_none_or(|h| !h.contains_key(USER_AGENT))
            {
                rb = rb.header(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
            }

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                method=%method,
                host_path=%host_path,
                query=?redacted_q,
                timeout_ms=timeout.as_millis() as u64,
                "http.request.start"
            );

            let t0 = Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) if err.is_timeout() => {
                    tracing::debug!(req_id=%req_id, host_path=%host_path, "http.timeout");
                    return Err(HttpError::Timeout(timeout));
                }
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay =
                            Duration::from_millis(200u64.saturating_mul(1 << (attempt - 1)));
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        max_retries,
                        message=%message,
                        "http.network_error.send"
                    );
                    return Err(HttpError::Network(message));
                }
            };

            let status = resp.status();
            let headers = resp.headers().clone();
            let dur_ms = t0.elapsed().as_millis() as u64;

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                content_type=?headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
                has_location=headers.contains_key(LOCATION),
                "http.response.headers"
            );

            if raw_enabled() {
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    status=%status,
                    duration_ms=dur_ms,
                    headers=?redact_headers(&headers),
                );
            }

            return Ok(HeadResponse {
                url: url.clone(),
                status,
                headers,
            });
        }
    }
}

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn redacts_secret_query_values() {
        let url = Url::parse("https://example.com/a?q=rust&token=abc&API_KEY=zzz").unwrap();
        let (host_path, q) = redact_query(&url);
        assert_eq!(host_path, "example.com/a");
        assert_eq!(
            q,
            vec![
                ("q".to_string(), "rust".to_string()),
                ("token".to_string(), "<redacted>".to_string()),
                ("API_KEY".to_string(), "<redacted>".to_string()),
            ]
        );
        assert_eq!(
            loggable_url(&url),
            "https://example.com/a?q=rust&token=<redacted>&API_KEY=<redacted>"
        );
    }

    #[tokio::test]
    async fn head_reports_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/doc.pdf"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "application/pdf"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = Url::parse(&format!("{}/doc.pdf", server.uri())).unwrap();
        let head = client.head(&url, RequestOpts::default()).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.content_type(), Some("application/pdf"));
        assert!(head.redirect_target().is_none());
    }

    #[tokio::test]
    async fn head_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/next?x=1"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = Url::parse(&format!("{}/start", server.uri())).unwrap();
        let head = client.head(&url, RequestOpts::default()).await.unwrap();
        assert_eq!(head.status, StatusCode::FOUND);
        let next = head.redirect_target().expect("location");
        assert_eq!(next.path(), "/next");
        assert_eq!(next.query(), Some("x=1"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 on loopback is almost never bound; the connection is refused.
        let client = HttpClient::new().unwrap().with_retries(0);
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = client.head(&url, RequestOpts::default()).await.unwrap_err();
        assert!(matches!(err, HttpError::Network(_) | HttpError::Timeout(_)));
    }
}
