#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use browserfetch_common::limits::ResourceLimits;
use browserfetch_common::observability::{LogConfig, LogFormat};
use browserfetch_common::Result;
use browserfetch_web::browser::{Browser, Capture, DomSnapshot, Navigation, PageSession};
use browserfetch_web::extract::HtmlExtractor;
use browserfetch_web::guard::{SsrfGuard, StaticResolver};
use browserfetch_web::precheck::{ContentKind, Precheck, ProbeOutcome};
use browserfetch_web::{Components, Fetcher};
use url::Url;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "browserfetch-tests",
            emit_stderr: true,
            format: if std::env::var("BROWSERFETCH_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
            ..LogConfig::default()
        };

        browserfetch_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// Hosts used across tests. `*.public.test` resolve to documentation-free
/// public addresses; the rest point at blocked ranges.
pub fn resolver() -> StaticResolver {
    StaticResolver::new()
        .with("www.example.com", &["93.184.216.34"])
        .with("news.public.test", &["151.101.1.69"])
        .with("docs.public.test", &["151.101.65.69"])
        .with("landing.public.test", &["151.101.129.69", "2a04:4e42::81"])
        .with("metadata.evil.test", &["169.254.169.254"])
        .with("internal.test", &["10.0.0.5"])
        .with("v6-local.test", &["fd12:3456::1"])
}

pub fn guard() -> SsrfGuard {
    SsrfGuard::new(Arc::new(resolver()))
}

pub const ARTICLE_HTML: &str = r#"<html><head><title>Ignored</title></head><body>
<nav>Home | About</nav>
<article>
  <h1>Guarded fetching</h1>
  <p>Fetching arbitrary URLs on behalf of a user means every hop, every redirect, and every resolved address has to be checked before content is trusted.</p>
  <p>The browser renders the page, the extractor turns it into text, and the cache remembers it for the next identical request.</p>
</article>
<footer>Copyright</footer>
</body></html>"#;

/// What a fake page does when opened.
#[derive(Debug, Clone)]
pub struct PagePlan {
    pub html: String,
    pub title: Option<String>,
    /// Where the navigation settles; `None` means the requested URL.
    pub final_url: Option<Url>,
    /// Redirect hops the browser reports; empty means just the final URL
    /// when it differs from the request.
    pub redirect_chain: Vec<Url>,
    pub status: Option<u16>,
    pub open_delay: Duration,
    pub png: Vec<u8>,
    pub truncated_height: bool,
}

impl Default for PagePlan {
    fn default() -> Self {
        Self {
            html: ARTICLE_HTML.to_string(),
            title: Some("Guarded fetching".to_string()),
            final_url: None,
            redirect_chain: Vec::new(),
            status: Some(200),
            open_delay: Duration::ZERO,
            png: png_of(16, 16),
            truncated_height: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct BrowserStats {
    pub sessions: AtomicUsize,
    pub closed: AtomicUsize,
    pub opens: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub prepares: AtomicUsize,
    pub live: AtomicUsize,
    pub peak_live: AtomicUsize,
    pub waits: Mutex<Vec<Duration>>,
}

/// In-memory browser driven by a [`PagePlan`].
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    pub plan: PagePlan,
    pub stats: Arc<BrowserStats>,
}

impl FakeBrowser {
    pub fn new(plan: PagePlan) -> Self {
        Self {
            plan,
            stats: Arc::new(BrowserStats::default()),
        }
    }

    pub fn opens(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.stats.sessions.load(Ordering::SeqCst)
    }

    pub fn scrolls(&self) -> usize {
        self.stats.scrolls.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> usize {
        self.stats.prepares.load(Ordering::SeqCst)
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.stats.waits.lock().unwrap().clone()
    }

    pub fn peak_live(&self) -> usize {
        self.stats.peak_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        self.stats.sessions.fetch_add(1, Ordering::SeqCst);
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            plan: self.plan.clone(),
            stats: self.stats.clone(),
            current: None,
            _live: LiveGuard(self.stats.clone()),
        }))
    }
}

/// Decrements the live-session count however the session ends.
struct LiveGuard(Arc<BrowserStats>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeSession {
    plan: PagePlan,
    stats: Arc<BrowserStats>,
    current: Option<Url>,
    _live: LiveGuard,
}

#[async_trait]
impl PageSession for FakeSession {
    async fn open(&mut self, url: &Url, _timeout: Duration) -> Result<Navigation> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if !self.plan.open_delay.is_zero() {
            tokio::time::sleep(self.plan.open_delay).await;
        }
        let final_url = self.plan.final_url.clone().unwrap_or_else(|| url.clone());
        self.current = Some(final_url.clone());
        let redirect_chain = if !self.plan.redirect_chain.is_empty() {
            self.plan.redirect_chain.clone()
        } else if &final_url != url {
            vec![final_url.clone()]
        } else {
            Vec::new()
        };
        Ok(Navigation {
            final_url,
            redirect_chain,
            status: self.plan.status,
        })
    }

    async fn prepare(&mut self) -> Result<()> {
        self.stats.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self, duration: Duration) -> Result<()> {
        self.stats.waits.lock().unwrap().push(duration);
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.stats.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<DomSnapshot> {
        let url = self
            .current
            .clone()
            .unwrap_or_else(|| Url::parse("about:blank").unwrap());
        Ok(DomSnapshot {
            url,
            html: self.plan.html.clone(),
            title: self.plan.title.clone(),
        })
    }

    async fn capture_screenshot(&mut self, _full_page: bool, _max_height: u32) -> Result<Capture> {
        Ok(Capture {
            png: self.plan.png.clone(),
            truncated_height: self.plan.truncated_height,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Precheck that answers from a fixed table and counts calls.
#[derive(Debug, Clone)]
pub struct FixedPrecheck {
    pub kind: ContentKind,
    pub content_type: Option<String>,
    pub calls: Arc<AtomicUsize>,
}

impl FixedPrecheck {
    pub fn html() -> Self {
        Self::with(ContentKind::Html, Some("text/html; charset=utf-8"))
    }

    pub fn with(kind: ContentKind, content_type: Option<&str>) -> Self {
        Self {
            kind,
            content_type: content_type.map(str::to_string),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Precheck for FixedPrecheck {
    async fn probe(&self, url: &Url) -> Result<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeOutcome {
            proceed: self.kind != ContentKind::NonHtml,
            kind: self.kind,
            content_type: self.content_type.clone(),
            final_url: url.clone(),
            hops: Vec::new(),
        })
    }
}

pub fn fetcher_with(
    browser: FakeBrowser,
    precheck: Arc<dyn Precheck>,
    limits: ResourceLimits,
) -> Fetcher {
    Fetcher::new(Components {
        guard: guard(),
        precheck,
        browser: Arc::new(browser),
        extractor: Arc::new(HtmlExtractor),
        limits,
    })
}

pub fn fetcher(browser: FakeBrowser) -> Fetcher {
    fetcher_with(
        browser,
        Arc::new(FixedPrecheck::html()),
        ResourceLimits::default(),
    )
}

/// Solid-colour PNG of the given size.
pub fn png_of(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 210, 220]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
