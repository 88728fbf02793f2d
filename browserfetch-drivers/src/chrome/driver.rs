use crate::chrome::{
    behavioral::BehavioralEngine,
    fingerprint::{UserAgentManager, UserAgentProfile},
    page::ChromePage,
    stealth::{build_stealth_arguments, download_prefs},
};
use anyhow::{Context, Result};
use browserfetch_common::{SandboxMode, StealthLevel};
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::time::Duration;
use webdriver::capabilities::Capabilities;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to open one browser session.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// WebDriver endpoint, e.g. `http://localhost:9515` for Chromedriver.
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    pub sandbox: SandboxMode,
    /// Applied as the WebDriver page-load timeout.
    pub page_load_timeout: Duration,
}

/// Thin wrapper around a `fantoccini` WebDriver client with stealth and
/// behavioral helpers. One driver is one isolated browser session.
pub struct ChromeDriver {
    client: Client,
    behavioral_engine: BehavioralEngine,
    profile: UserAgentProfile,
    stealth: StealthLevel,
}

/// Build the `goog:chromeOptions` capability set for a session.
pub fn chrome_capabilities(
    opts: &DriverOptions,
    profile: &UserAgentProfile,
) -> Capabilities {
    let mut args = build_stealth_arguments(opts.stealth, profile, opts.sandbox);
    if opts.headless {
        args.push("--headless=new".to_string());
        args.push("--hide-scrollbars".to_string());
    }

    let mut caps = Capabilities::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "prefs": download_prefs(),
            "perfLoggingPrefs": { "enableNetwork": true, "enablePage": false },
        }),
    );
    // Network events feed the redirect-hop audit after each navigation.
    caps.insert(
        "goog:loggingPrefs".to_string(),
        json!({ "performance": "ALL" }),
    );
    caps
}

impl ChromeDriver {
    /// Open a new session on the configured WebDriver endpoint.
    pub async fn connect(opts: &DriverOptions) -> Result<Self> {
        let mut user_agent_manager = UserAgentManager::new();
        let profile = user_agent_manager.session_profile().clone();
        let caps = chrome_capabilities(opts, &profile);

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&opts.webdriver_url)
            .await
            .with_context(|| format!("failed to start browser session at {}", opts.webdriver_url))?;

        client
            .update_timeouts(TimeoutConfiguration::new(
                Some(SCRIPT_TIMEOUT),
                Some(opts.page_load_timeout),
                Some(Duration::ZERO),
            ))
            .await
            .context("failed to set browser timeouts")?;

        tracing::debug!(
            target: "browser.session",
            stealth = ?opts.stealth,
            headless = opts.headless,
            sandbox = ?opts.sandbox,
            "browser.session.opened"
        );

        Ok(Self {
            client,
            behavioral_engine: BehavioralEngine::new(),
            profile,
            stealth: opts.stealth,
        })
    }

    /// Page handle bound to this session.
    pub fn page(&self) -> ChromePage {
        ChromePage::new(
            self.client.clone(),
            self.stealth,
            self.profile.clone(),
            self.behavioral_engine.clone(),
        )
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(headless: bool, sandbox: SandboxMode) -> DriverOptions {
        DriverOptions {
            webdriver_url: "http://localhost:9515".into(),
            headless,
            stealth: StealthLevel::Balanced,
            sandbox,
            page_load_timeout: Duration::from_secs(30),
        }
    }

    fn args_of(caps: &Capabilities) -> Vec<String> {
        caps["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn headless_sessions_get_headless_flag() {
        let profile = UserAgentManager::new().session_profile().clone();
        let caps = chrome_capabilities(&options(true, SandboxMode::Enabled), &profile);
        let args = args_of(&caps);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(!args.contains(&"--no-sandbox".to_string()));
        assert_eq!(caps["goog:chromeOptions"]["prefs"]["download_restrictions"], 3);
    }

    #[test]
    fn sandbox_disabled_adds_flag() {
        let profile = UserAgentManager::new().session_profile().clone();
        let caps = chrome_capabilities(&options(false, SandboxMode::Disabled), &profile);
        let args = args_of(&caps);
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(!args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn performance_logging_is_requested() {
        let profile = UserAgentManager::new().session_profile().clone();
        let caps = chrome_capabilities(&options(true, SandboxMode::Enabled), &profile);
        assert_eq!(caps["goog:loggingPrefs"]["performance"], "ALL");
        assert_eq!(
            caps["goog:chromeOptions"]["perfLoggingPrefs"]["enableNetwork"],
            true
        );
    }
}
