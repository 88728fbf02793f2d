use std::time::Duration;

use async_trait::async_trait;
use browserfetch_common::{FetchError, Result};
use browserfetch_drivers::chrome::driver::{ChromeDriver, DriverOptions};
use browserfetch_drivers::chrome::page::ChromePage;
use url::Url;

/// Auto-scroll step cap.
pub const MAX_SCROLL_STEPS: usize = 10;

/// Where a navigation ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub final_url: Url,
    /// Every redirect target the browser followed, in order, ending with the
    /// final URL when it differs from the request.
    pub redirect_chain: Vec<Url>,
    /// Document response status, when known.
    pub status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomSnapshot {
    pub url: Url,
    pub html: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub png: Vec<u8>,
    pub truncated_height: bool,
}

/// Source of isolated page sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn PageSession>>;
}

/// One navigable page. Sessions are used by a single request and closed after.
///
/// `open` only navigates. Nothing else touches the page until the caller has
/// checked the navigation and calls [`PageSession::prepare`].
#[async_trait]
pub trait PageSession: Send {
    async fn open(&mut self, url: &Url, timeout: Duration) -> Result<Navigation>;
    /// Stealth evasions and cookie-consent dismissal on the loaded page.
    async fn prepare(&mut self) -> Result<()>;
    async fn wait(&mut self, duration: Duration) -> Result<()>;
    async fn scroll_to_bottom(&mut self) -> Result<()>;
    async fn snapshot(&mut self) -> Result<DomSnapshot>;
    async fn capture_screenshot(&mut self, full_page: bool, max_height: u32) -> Result<Capture>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Turn a driver failure into a typed error with a readable message.
pub fn map_navigation_error(url: &Url, timeout: Duration, err: &anyhow::Error) -> FetchError {
    let message = format!("{err:#}");
    if message.contains("ERR_NAME_NOT_RESOLVED") {
        FetchError::Navigation(format!("could not resolve domain for URL: {url}"))
    } else if message.contains("ERR_CONNECTION_REFUSED") {
        FetchError::Navigation(format!("connection refused for URL: {url}"))
    } else if message.contains("ERR_EMPTY_RESPONSE") {
        FetchError::Navigation(format!("server returned an empty response for URL: {url}"))
    } else if message.contains("Download is starting") || message.contains("ERR_ABORTED") {
        FetchError::Navigation(format!(
            "URL points to a downloadable file, not a web page: {url}"
        ))
    } else if message.to_ascii_lowercase().contains("timeout")
        || message.contains("ERR_TIMED_OUT")
    {
        FetchError::NavigationTimeout {
            url: url.to_string(),
            after: timeout,
        }
    } else {
        FetchError::Navigation(format!("failed to load URL: {url} ({message})"))
    }
}

fn driver_error(context: &str, err: anyhow::Error) -> FetchError {
    FetchError::Navigation(format!("{context}: {err:#}"))
}

/// [`Browser`] backed by a WebDriver endpoint; every session is a fresh
/// browser profile.
#[derive(Debug, Clone)]
pub struct FantocciniBrowser {
    options: DriverOptions,
}

impl FantocciniBrowser {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Browser for FantocciniBrowser {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        let driver = ChromeDriver::connect(&self.options)
            .await
            .map_err(|e| driver_error("could not start browser", e))?;
        let page = driver.page();
        Ok(Box::new(FantocciniSession { driver, page }))
    }
}

struct FantocciniSession {
    driver: ChromeDriver,
    page: ChromePage,
}

#[async_trait]
impl PageSession for FantocciniSession {
    async fn open(&mut self, url: &Url, timeout: Duration) -> Result<Navigation> {
        // Clear entries left over from session setup.
        self.page
            .drain_performance_log()
            .await
            .map_err(|e| driver_error("could not read navigation log", e))?;

        match tokio::time::timeout(timeout, self.page.goto(url.as_str())).await {
            Err(_) => {
                return Err(FetchError::NavigationTimeout {
                    url: url.to_string(),
                    after: timeout,
                });
            }
            Ok(Err(err)) => return Err(map_navigation_error(url, timeout, &err)),
            Ok(Ok(())) => {}
        }

        // Without the hop list the redirect chain cannot be audited.
        let mut redirect_chain = self
            .page
            .redirect_hops()
            .await
            .map_err(|e| driver_error("could not read navigation log", e))?;
        let final_url = self
            .page
            .current_url()
            .await
            .map_err(|e| driver_error("could not read page URL", e))?;
        let timing = self.page.navigation_timing().await.unwrap_or_default();
        tracing::debug!(
            redirects = timing.redirect_count,
            hops = redirect_chain.len(),
            status = ?timing.response_status,
            "browser.navigation.settled"
        );

        if &final_url != url && redirect_chain.last() != Some(&final_url) {
            redirect_chain.push(final_url.clone());
        }
        Ok(Navigation {
            final_url,
            redirect_chain,
            status: timing.response_status,
        })
    }

    async fn prepare(&mut self) -> Result<()> {
        self.page
            .apply_stealth()
            .await
            .map_err(|e| driver_error("could not apply stealth scripts", e))?;
        if let Err(err) = self.page.dismiss_consent().await {
            tracing::debug!(error = %err, "browser.consent.failed");
        }
        Ok(())
    }

    async fn wait(&mut self, duration: Duration) -> Result<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.page
            .auto_scroll(MAX_SCROLL_STEPS)
            .await
            .map(|_| ())
            .map_err(|e| driver_error("auto-scroll failed", e))
    }

    async fn snapshot(&mut self) -> Result<DomSnapshot> {
        let html = self
            .page
            .content()
            .await
            .map_err(|e| driver_error("could not read page source", e))?;
        let title = self
            .page
            .title()
            .await
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let url = self
            .page
            .current_url()
            .await
            .map_err(|e| driver_error("could not read page URL", e))?;
        Ok(DomSnapshot { url, html, title })
    }

    async fn capture_screenshot(&mut self, full_page: bool, max_height: u32) -> Result<Capture> {
        let (png, truncated_height) = if full_page {
            self.page.full_page_screenshot(max_height).await
        } else {
            self.page.screenshot().await.map(|png| (png, false))
        }
        .map_err(|e| driver_error("screenshot failed", e))?;
        Ok(Capture {
            png,
            truncated_height,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.driver
            .close()
            .await
            .map_err(|e| driver_error("could not close browser", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn url() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn chromium_errors_get_friendly_messages() {
        let t = Duration::from_secs(30);
        let cases = [
            ("unknown error: net::ERR_NAME_NOT_RESOLVED", "could not resolve domain"),
            ("unknown error: net::ERR_CONNECTION_REFUSED", "connection refused"),
            ("unknown error: net::ERR_EMPTY_RESPONSE", "empty response"),
            ("unknown error: net::ERR_ABORTED", "downloadable file"),
        ];
        for (raw, expected) in cases {
            let err = map_navigation_error(&url(), t, &anyhow!(raw));
            assert_eq!(err.kind(), "navigation_error");
            assert!(err.to_string().contains(expected), "{raw}");
        }
    }

    #[test]
    fn timeouts_map_to_navigation_timeout() {
        let err = map_navigation_error(
            &url(),
            Duration::from_secs(30),
            &anyhow!("timeout: Timed out receiving message from renderer"),
        );
        assert_eq!(
            err,
            FetchError::NavigationTimeout {
                url: "https://example.com/".into(),
                after: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn other_errors_keep_the_detail() {
        let err = map_navigation_error(&url(), Duration::from_secs(1), &anyhow!("ssl handshake"));
        assert!(err.to_string().contains("ssl handshake"));
    }
}
