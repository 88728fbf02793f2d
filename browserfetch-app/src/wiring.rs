use anyhow::{Context, Result};
use browserfetch_common::observability::LogConfig;
use browserfetch_config::BrowserfetchConfig;
use browserfetch_drivers::chrome::driver::DriverOptions;
use browserfetch_http::HttpClient;
use browserfetch_web::browser::FantocciniBrowser;
use browserfetch_web::extract::HtmlExtractor;
use browserfetch_web::guard::SsrfGuard;
use browserfetch_web::precheck::HttpPrecheck;
use browserfetch_web::{Components, Fetcher};
use std::sync::Arc;

pub fn log_config(cfg: &BrowserfetchConfig) -> LogConfig {
    LogConfig {
        app_name: "browserfetch",
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.emit_stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    }
}

pub fn driver_options(cfg: &BrowserfetchConfig) -> DriverOptions {
    DriverOptions {
        webdriver_url: cfg.webdriver_url.clone(),
        headless: cfg.headless,
        stealth: cfg.stealth,
        sandbox: cfg.sandbox,
        page_load_timeout: cfg.limits.navigation_timeout(),
    }
}

/// Build the process-wide fetcher. The guard is shared by the precheck and
/// the orchestrator so both see the same resolver.
pub fn build_fetcher(cfg: &BrowserfetchConfig) -> Result<Fetcher> {
    let guard = SsrfGuard::system();
    let http = HttpClient::new()
        .context("building precheck HTTP client")?
        .with_timeout(cfg.limits.precheck_timeout())
        .with_retries(0);
    let precheck = HttpPrecheck::new(
        http,
        guard.clone(),
        cfg.limits.precheck_timeout(),
        cfg.limits.max_redirects,
    );

    tracing::info!(
        webdriver_url = %cfg.webdriver_url,
        headless = cfg.headless,
        stealth = ?cfg.stealth,
        sandbox = ?cfg.sandbox,
        max_concurrency = cfg.limits.max_concurrency,
        "app.wired"
    );

    Ok(Fetcher::new(Components {
        guard,
        precheck: Arc::new(precheck),
        browser: Arc::new(FantocciniBrowser::new(driver_options(cfg))),
        extractor: Arc::new(HtmlExtractor),
        limits: cfg.limits.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use browserfetch_common::SandboxMode;
    use browserfetch_config::BrowserfetchConfigLoader;
    use std::time::Duration;

    #[test]
    fn driver_options_follow_config() {
        let cfg = temp_env::with_var("BROWSERFETCH_NO_SANDBOX", Some("1"), || {
            BrowserfetchConfigLoader::new()
                .with_yaml_str(
                    r#"
webdriver_url: http://chrome:4444
headless: false
limits:
  navigation_timeout_secs: 12
"#,
                )
                .load()
                .unwrap()
        });
        let opts = driver_options(&cfg);
        assert_eq!(opts.webdriver_url, "http://chrome:4444");
        assert!(!opts.headless);
        assert_eq!(opts.sandbox, SandboxMode::Disabled);
        assert_eq!(opts.page_load_timeout, Duration::from_secs(12));
    }

    #[test]
    fn fetcher_takes_configured_limits() {
        let cfg = BrowserfetchConfigLoader::new()
            .with_yaml_str("limits:\n  max_concurrency: 2\n")
            .load()
            .unwrap();
        let fetcher = build_fetcher(&cfg).unwrap();
        assert_eq!(fetcher.limiter().ceiling(), 2);
        assert!(fetcher.cache().is_empty());
        assert_eq!(log_config(&cfg).default_filter, "info");
    }
}
