use crate::chrome::{
    behavioral::BehavioralEngine,
    consent::{ACCEPT_LABELS, ACCEPT_SELECTORS, BANNER_CONTAINERS, CLICK_ACCEPT_SCRIPT, REMOVE_BANNERS_SCRIPT},
    fingerprint::UserAgentProfile,
    stealth::StealthScripts,
};
use anyhow::{anyhow, Context, Result};
use browserfetch_common::StealthLevel;
use fantoccini::wd::WebDriverCompatibleCommand;
use fantoccini::Client;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

/// Page handle providing navigation, scrolling and capture on one session.
pub struct ChromePage {
    pub(crate) client: Client,
    pub(crate) stealth: StealthLevel,
    pub(crate) profile: UserAgentProfile,
    pub(crate) behavioral_engine: BehavioralEngine,
}

const SCROLL_STEP_SCRIPT: &str = r#"
    window.scrollBy(0, window.innerHeight);
    return Math.max(document.body ? document.body.scrollHeight : 0,
                    document.documentElement.scrollHeight);
"#;

const PAGE_HEIGHT_SCRIPT: &str = r#"
    return Math.max(document.body ? document.body.scrollHeight : 0,
                    document.documentElement.scrollHeight);
"#;

const NAVIGATION_TIMING_SCRIPT: &str = r#"
    const nav = performance.getEntriesByType('navigation')[0];
    if (!nav) return { redirectCount: 0, responseStatus: 0 };
    return { redirectCount: nav.redirectCount || 0, responseStatus: nav.responseStatus || 0 };
"#;

/// What the browser recorded about the last document navigation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationTiming {
    /// HTTP redirects followed before the document loaded.
    pub redirect_count: u64,
    /// Status of the document response, when the browser exposes it.
    pub response_status: Option<u16>,
}

impl ChromePage {
    /// Construct a page wrapper around an existing WebDriver client.
    pub fn new(
        client: Client,
        stealth: StealthLevel,
        profile: UserAgentProfile,
        behavioral_engine: BehavioralEngine,
    ) -> Self {
        Self {
            client,
            stealth,
            profile,
            behavioral_engine,
        }
    }

    /// Navigate to `url`. Nothing runs on the page until the caller asks.
    pub async fn goto(&mut self, url: &str) -> Result<()> {
        self.client.goto(url).await.map_err(anyhow::Error::from)
    }

    /// Apply the stealth scripts for this session to the loaded document.
    pub async fn apply_stealth(&mut self) -> Result<()> {
        for script in StealthScripts::for_level(self.stealth) {
            self.client.execute(script, vec![]).await?;
        }
        if self.stealth == StealthLevel::Maximum {
            self.client
                .execute(
                    "const p = arguments[0]; Object.defineProperty(navigator, 'platform', { get: () => p });",
                    vec![json!(self.profile.platform)],
                )
                .await?;
        }
        Ok(())
    }

    /// Accept a cookie banner if one is showing, then strip banner containers.
    /// Returns whether an accept control was clicked.
    pub async fn dismiss_consent(&self) -> Result<bool> {
        let clicked = self
            .client
            .execute(
                CLICK_ACCEPT_SCRIPT,
                vec![json!(ACCEPT_SELECTORS), json!(ACCEPT_LABELS)],
            )
            .await?
            .as_bool()
            .unwrap_or(false);

        if clicked {
            self.behavioral_engine.random_delay(300, 600).await;
            self.client
                .execute(REMOVE_BANNERS_SCRIPT, vec![json!(BANNER_CONTAINERS)])
                .await?;
            info!(target: "browser.consent", "browser.consent.accepted");
        }
        Ok(clicked)
    }

    /// Scroll down one viewport at a time, at most `max_steps` times, stopping
    /// once the page stops growing. Ends back at the top of the page.
    pub async fn auto_scroll(&self, max_steps: usize) -> Result<usize> {
        let mut last_height = self.scroll_height().await?;
        let mut steps = 0;
        while steps < max_steps {
            let height = as_u64(self.client.execute(SCROLL_STEP_SCRIPT, vec![]).await?);
            steps += 1;
            self.behavioral_engine.scroll_pause().await;
            if height <= last_height {
                break;
            }
            last_height = height;
        }
        self.client.execute("window.scrollTo(0, 0);", vec![]).await?;
        debug!(target: "browser.scroll", steps, height = last_height, "browser.scroll.done");
        Ok(steps)
    }

    /// Full page HTML source.
    pub async fn content(&self) -> Result<String> {
        self.client.source().await.map_err(anyhow::Error::msg)
    }

    /// Page title.
    pub async fn title(&self) -> Result<String> {
        self.client.title().await.map_err(anyhow::Error::msg)
    }

    /// URL the browser settled on.
    pub async fn current_url(&self) -> Result<Url> {
        self.client.current_url().await.map_err(anyhow::Error::msg)
    }

    /// Read and clear the browser's performance log.
    pub async fn drain_performance_log(&self) -> Result<Vec<Value>> {
        let value = self
            .client
            .issue_cmd(GetLog("performance"))
            .await
            .context("failed to read performance log")?;
        match value {
            Value::Array(entries) => Ok(entries),
            other => Err(anyhow!("unexpected performance log payload: {other}")),
        }
    }

    /// Redirect targets the last top-level navigation went through, ending
    /// with the final document URL when it was reached by redirect.
    pub async fn redirect_hops(&self) -> Result<Vec<Url>> {
        let entries = self.drain_performance_log().await?;
        let hops = document_redirects(&entries);
        debug!(target: "browser.navigation", hops = hops.len(), "browser.navigation.redirects");
        Ok(hops)
    }

    /// Redirect count and response status of the last navigation.
    pub async fn navigation_timing(&self) -> Result<NavigationTiming> {
        let value = self.client.execute(NAVIGATION_TIMING_SCRIPT, vec![]).await?;
        let status = as_u64(value["responseStatus"].clone());
        Ok(NavigationTiming {
            redirect_count: as_u64(value["redirectCount"].clone()),
            response_status: u16::try_from(status).ok().filter(|s| *s > 0),
        })
    }

    /// Document scroll height in CSS pixels.
    pub async fn scroll_height(&self) -> Result<u64> {
        Ok(as_u64(self.client.execute(PAGE_HEIGHT_SCRIPT, vec![]).await?))
    }

    /// PNG of the current viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client.screenshot().await.map_err(anyhow::Error::msg)
    }

    /// PNG of the whole page, with the window grown to at most `max_height`.
    /// The flag is `true` when the page was taller than `max_height`.
    pub async fn full_page_screenshot(&self, max_height: u32) -> Result<(Vec<u8>, bool)> {
        if max_height == 0 {
            return Err(anyhow!("screenshot height cap must be positive"));
        }
        let page_height = self.scroll_height().await?;
        let truncated = page_height > u64::from(max_height);
        let target = page_height.clamp(u64::from(self.profile.viewport.1), u64::from(max_height));
        let width = self.profile.viewport.0;

        self.client
            .set_window_size(width, target as u32)
            .await
            .map_err(anyhow::Error::msg)?;
        let shot = self.client.screenshot().await.map_err(anyhow::Error::msg);
        self.client
            .set_window_size(width, self.profile.viewport.1)
            .await
            .map_err(anyhow::Error::msg)?;

        Ok((shot?, truncated))
    }
}

/// `POST /session/{id}/se/log`, Chromedriver's log endpoint.
#[derive(Debug)]
struct GetLog(&'static str);

impl WebDriverCompatibleCommand for GetLog {
    fn endpoint(
        &self,
        base_url: &Url,
        session_id: Option<&str>,
    ) -> std::result::Result<Url, url::ParseError> {
        let session = session_id.ok_or(url::ParseError::EmptyHost)?;
        base_url.join(&format!("session/{session}/se/log"))
    }

    fn method_and_body(&self, _request_url: &Url) -> (http::Method, Option<String>) {
        (http::Method::POST, Some(json!({ "type": self.0 }).to_string()))
    }
}

/// Pull the top-level document's redirect targets out of performance-log
/// entries. The first document request seen names the main frame; every later
/// request for that frame carrying a `redirectResponse` is one hop.
pub fn document_redirects(entries: &[Value]) -> Vec<Url> {
    let mut main_frame: Option<String> = None;
    let mut hops = Vec::new();
    for entry in entries {
        let Some(raw) = entry.get("message").and_then(Value::as_str) else {
            continue;
        };
        let Ok(event) = serde_json::from_str::<Value>(raw) else {
            continue;
        };
        let event = &event["message"];
        if event["method"] != "Network.requestWillBeSent" {
            continue;
        }
        let params = &event["params"];
        if params["type"] != "Document" {
            continue;
        }
        let frame = params["frameId"].as_str().unwrap_or_default();
        match &main_frame {
            None => main_frame = Some(frame.to_string()),
            Some(main) if main != frame => continue,
            Some(_) => {}
        }
        if params["redirectResponse"].is_null() {
            continue;
        }
        if let Some(url) = params["request"]["url"]
            .as_str()
            .and_then(|u| Url::parse(u).ok())
        {
            hops.push(url);
        }
    }
    hops
}

fn as_u64(value: Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
        .unwrap_or(0)
}
