//! Fetch orchestrator.
//!
//! A text fetch walks `Validating -> Prechecking -> Admitting -> Navigating ->
//! Revalidating -> Extracting -> Caching -> Done`; any state may end in
//! `Error`. The screenshot path shares the first five states and then
//! captures. Every transition is logged as a `fetch.transition` event.
//!
//! Revalidation runs inside the browser session, straight after the page
//! loads: consent handling, waiting, scrolling and capture only happen on a
//! page whose redirect chain and landing URL passed the guard.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use browserfetch_common::limits::ResourceLimits;
use browserfetch_common::{FetchError, Result};
use url::Url;
use uuid::Uuid;

use crate::browser::{Browser, Capture, DomSnapshot, Navigation, PageSession};
use crate::cache::{CacheKey, FetchCache};
use crate::extract::{ExtractMode, Extractor, truncate_chars};
use crate::guard::{SsrfGuard, parse_url};
use crate::limiter::ConcurrencyLimiter;
use crate::precheck::{ContentKind, Precheck, ProbeOutcome};
use crate::types::{FetchRequest, FetchResult, ScreenshotRequest, ScreenshotResult};

/// Pause between load and capture so late layout settles.
pub const SCREENSHOT_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Validating,
    Prechecking,
    Admitting,
    Navigating,
    Revalidating,
    Extracting,
    Capturing,
    Caching,
    Done,
    Error,
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchState::Validating => "validating",
            FetchState::Prechecking => "prechecking",
            FetchState::Admitting => "admitting",
            FetchState::Navigating => "navigating",
            FetchState::Revalidating => "revalidating",
            FetchState::Extracting => "extracting",
            FetchState::Capturing => "capturing",
            FetchState::Caching => "caching",
            FetchState::Done => "done",
            FetchState::Error => "error",
        })
    }
}

/// Collaborators injected into a [`Fetcher`]; all live as long as the process.
#[derive(Clone)]
pub struct Components {
    pub guard: SsrfGuard,
    pub precheck: Arc<dyn Precheck>,
    pub browser: Arc<dyn Browser>,
    pub extractor: Arc<dyn Extractor>,
    pub limits: ResourceLimits,
}

pub struct Fetcher {
    guard: SsrfGuard,
    precheck: Arc<dyn Precheck>,
    browser: Arc<dyn Browser>,
    extractor: Arc<dyn Extractor>,
    limits: ResourceLimits,
    limiter: ConcurrencyLimiter,
    cache: Arc<FetchCache>,
}

struct Trace<'a> {
    req_id: String,
    op: &'static str,
    url: &'a str,
}

impl Trace<'_> {
    fn to(&self, state: FetchState) {
        tracing::debug!(
            req_id = %self.req_id,
            op = self.op,
            state = %state,
            "fetch.transition"
        );
    }

    fn fail(&self, err: &FetchError) {
        tracing::warn!(
            req_id = %self.req_id,
            op = self.op,
            state = %FetchState::Error,
            kind = err.kind(),
            url = %self.url,
            error = %err,
            "fetch.transition"
        );
    }
}

impl Fetcher {
    pub fn new(components: Components) -> Self {
        let limits = components.limits;
        Self {
            guard: components.guard,
            precheck: components.precheck,
            browser: components.browser,
            extractor: components.extractor,
            limiter: ConcurrencyLimiter::new(limits.max_concurrency),
            cache: Arc::new(FetchCache::new(limits.max_cache_bytes, limits.max_cache_entries)),
            limits,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    fn trace<'a>(op: &'static str, url: &'a str) -> Trace<'a> {
        Trace {
            req_id: Uuid::new_v4().simple().to_string(),
            op,
            url,
        }
    }

    /// Fetch `req.url` and return its text. Served from cache when an
    /// identical request already succeeded.
    pub async fn fetch(&self, req: &FetchRequest) -> Result<FetchResult> {
        let trace = Self::trace("fetch", &req.url);
        let outcome = self.fetch_traced(req, &trace).await;
        if let Err(err) = &outcome {
            trace.fail(err);
        }
        outcome
    }

    async fn fetch_traced(&self, req: &FetchRequest, trace: &Trace<'_>) -> Result<FetchResult> {
        let url = parse_url(&req.url)?;
        let wait = self.limits.clamp_wait(req.wait_seconds);
        let max_chars = self.limits.effective_max_chars(req.max_chars);
        let key = CacheKey::for_request(&url, wait, req.scroll, max_chars, req.readability);

        if let Some(hit) = self.cache.get(&key) {
            trace.to(FetchState::Done);
            return Ok(hit);
        }

        let probe = self.admit_checks(&url, trace).await?;

        trace.to(FetchState::Admitting);
        let slot = self.limiter.acquire().await?;
        let outcome = self
            .fetch_admitted(&url, &probe, wait, req, max_chars, trace)
            .await;
        self.limiter.release(slot);
        let result = outcome?;

        trace.to(FetchState::Caching);
        self.cache.put(key, result.clone());
        trace.to(FetchState::Done);
        Ok(result)
    }

    /// Validating and Prechecking, shared by both paths.
    async fn admit_checks(&self, url: &Url, trace: &Trace<'_>) -> Result<ProbeOutcome> {
        trace.to(FetchState::Validating);
        self.guard.check(url, false).await?;

        trace.to(FetchState::Prechecking);
        let probe = self.precheck.probe(url).await?;
        if probe.kind == ContentKind::NonHtml {
            return Err(FetchError::UnsupportedContentType {
                url: url.to_string(),
                content_type: probe.content_type.clone().unwrap_or_default(),
            });
        }
        if probe.redirected() {
            self.guard.check(&probe.final_url, true).await?;
        }
        Ok(probe)
    }

    async fn fetch_admitted(
        &self,
        url: &Url,
        probe: &ProbeOutcome,
        wait: Duration,
        req: &FetchRequest,
        max_chars: usize,
        trace: &Trace<'_>,
    ) -> Result<FetchResult> {
        trace.to(FetchState::Navigating);
        let deadline = self.limits.navigation_deadline(wait, req.scroll);
        let run = async {
            let mut session = self.browser.open_session().await?;
            let outcome = self
                .load_page(session.as_mut(), url, probe, wait, req.scroll, trace)
                .await;
            close_quietly(session).await;
            outcome
        };
        let (navigation, snapshot) = within_deadline(url, deadline, run).await?;

        trace.to(FetchState::Extracting);
        let DomSnapshot { url: page_url, html, title } = snapshot;
        let extractor = self.extractor.clone();
        let mode = ExtractMode::from_readability(req.readability);
        let base = page_url.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&html, &base, mode))
            .await
            .map_err(|e| FetchError::Extraction(format!("extraction task failed: {e}")))??;

        let rendered = render_output(title.as_deref(), url, &page_url, navigation.status, &text);
        let (text, truncated) = truncate_chars(&rendered, max_chars);
        Ok(FetchResult {
            text,
            truncated,
            source_url: url.to_string(),
            final_url: page_url.to_string(),
            title,
        })
    }

    async fn load_page(
        &self,
        session: &mut dyn PageSession,
        url: &Url,
        probe: &ProbeOutcome,
        wait: Duration,
        scroll: bool,
        trace: &Trace<'_>,
    ) -> Result<(Navigation, DomSnapshot)> {
        let navigation = session.open(url, self.limits.navigation_timeout()).await?;
        trace.to(FetchState::Revalidating);
        self.revalidate(probe, &navigation).await?;

        session.prepare().await?;
        if !wait.is_zero() {
            session.wait(wait).await?;
        }
        if scroll {
            session.scroll_to_bottom().await?;
        }
        let snapshot = session.snapshot().await?;
        // Scripts may have moved the page since it was checked.
        if snapshot.url != navigation.final_url {
            self.guard.check(&snapshot.url, true).await?;
        }
        Ok((navigation, snapshot))
    }

    /// Capture a PNG of `req.url`, enforcing the byte and height caps.
    pub async fn screenshot(&self, req: &ScreenshotRequest) -> Result<ScreenshotResult> {
        let trace = Self::trace("screenshot", &req.url);
        let outcome = self.screenshot_traced(req, &trace).await;
        if let Err(err) = &outcome {
            trace.fail(err);
        }
        outcome
    }

    async fn screenshot_traced(
        &self,
        req: &ScreenshotRequest,
        trace: &Trace<'_>,
    ) -> Result<ScreenshotResult> {
        let url = parse_url(&req.url)?;
        let probe = self.admit_checks(&url, trace).await?;

        trace.to(FetchState::Admitting);
        let slot = self.limiter.acquire().await?;
        let outcome = self.screenshot_admitted(&url, &probe, req.full_page, trace).await;
        self.limiter.release(slot);
        let result = outcome?;
        trace.to(FetchState::Done);
        Ok(result)
    }

    async fn screenshot_admitted(
        &self,
        url: &Url,
        probe: &ProbeOutcome,
        full_page: bool,
        trace: &Trace<'_>,
    ) -> Result<ScreenshotResult> {
        trace.to(FetchState::Navigating);
        let deadline = self.limits.navigation_deadline(SCREENSHOT_SETTLE, false);
        let max_height = self.limits.max_screenshot_height;
        let run = async {
            let mut session = self.browser.open_session().await?;
            let outcome = self
                .capture_page(session.as_mut(), url, probe, full_page, trace)
                .await;
            close_quietly(session).await;
            outcome
        };
        let capture = within_deadline(url, deadline, run).await?;

        let max_bytes = self.limits.max_screenshot_bytes;
        if capture.png.len() > max_bytes {
            return Err(FetchError::ResourceLimitExceeded(format!(
                "screenshot is {} bytes, limit is {max_bytes} bytes",
                capture.png.len()
            )));
        }
        let (width, height) = png_dimensions(&capture.png)?;
        if height > max_height {
            return Err(FetchError::ResourceLimitExceeded(format!(
                "screenshot is {height}px tall, limit is {max_height}px"
            )));
        }
        Ok(ScreenshotResult {
            png_bytes: capture.png,
            width,
            height,
            truncated_height: capture.truncated_height,
        })
    }

    async fn capture_page(
        &self,
        session: &mut dyn PageSession,
        url: &Url,
        probe: &ProbeOutcome,
        full_page: bool,
        trace: &Trace<'_>,
    ) -> Result<Capture> {
        let navigation = session.open(url, self.limits.navigation_timeout()).await?;
        trace.to(FetchState::Revalidating);
        self.revalidate(probe, &navigation).await?;
        session.prepare().await?;
        session.wait(SCREENSHOT_SETTLE).await?;
        trace.to(FetchState::Capturing);
        session
            .capture_screenshot(full_page, self.limits.max_screenshot_height)
            .await
    }

    /// Guard every URL the request touched after the first check: precheck
    /// hops, the browser's redirect chain and the settled URL.
    async fn revalidate(&self, probe: &ProbeOutcome, navigation: &Navigation) -> Result<()> {
        let mut seen: Vec<&Url> = Vec::new();
        let candidates = probe
            .hops
            .iter()
            .chain(navigation.redirect_chain.iter())
            .chain(std::iter::once(&navigation.final_url));
        for hop in candidates {
            if seen.contains(&hop) {
                continue;
            }
            seen.push(hop);
            self.guard.check(hop, true).await?;
        }
        Ok(())
    }
}

/// Run a session future under the navigation deadline. On expiry the future
/// is dropped mid-flight; the WebDriver client ends its session once its last
/// handle is gone.
async fn within_deadline<T>(
    url: &Url,
    deadline: Duration,
    run: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, run).await {
        Ok(outcome) => outcome,
        Err(_) => Err(FetchError::NavigationTimeout {
            url: url.to_string(),
            after: deadline,
        }),
    }
}

async fn close_quietly(session: Box<dyn PageSession>) {
    if let Err(err) = session.close().await {
        tracing::debug!(error = %err, "browser.session.close_failed");
    }
}

/// Prefix the extracted text with the title, redirect and error-status lines
/// that apply.
pub fn render_output(
    title: Option<&str>,
    requested: &Url,
    final_url: &Url,
    status: Option<u16>,
    text: &str,
) -> String {
    let mut header = Vec::new();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        header.push(format!("Title: {title}"));
    }
    if final_url != requested {
        header.push(format!("Redirected to: {final_url}"));
    }
    if let Some(status) = status.filter(|s| *s >= 400) {
        header.push(format!("HTTP {status}"));
    }
    if header.is_empty() {
        text.to_string()
    } else {
        format!("{}\n\n{text}", header.join("\n"))
    }
}

fn png_dimensions(png: &[u8]) -> Result<(u32, u32)> {
    image::ImageReader::with_format(Cursor::new(png), image::ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| FetchError::Extraction(format!("screenshot is not a readable PNG: {e}")))
}
