use anyhow::{Context, Result};
use browserfetch_common::observability::init_logging;
use browserfetch_config::{BrowserfetchConfig, BrowserfetchConfigLoader};
use browserfetch_web::types::{DEFAULT_MAX_CHARS, DEFAULT_WAIT_SECS};
use browserfetch_web::{FetchRequest, Fetcher, ScreenshotRequest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use wiring::build_fetcher;
mod wiring;

const DEFAULT_CONFIG: &str = "browserfetch.yaml";

/// Fetch remote pages through a guarded headless browser.
#[derive(Parser, Debug)]
#[command(name = "browserfetch", version, about, long_about = None)]
struct Cli {
    /// YAML config file; `browserfetch.yaml` is used when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a page and print its text
    Fetch {
        url: String,

        /// Seconds to wait after load for dynamic content
        #[arg(long, default_value_t = DEFAULT_WAIT_SECS)]
        wait: f64,

        /// Skip auto-scrolling
        #[arg(long)]
        no_scroll: bool,

        /// Output cap in characters; 0 means the configured maximum
        #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
        max_chars: usize,

        /// Extract the whole page instead of the main content
        #[arg(long)]
        full: bool,
    },

    /// Capture a PNG screenshot of a page
    Screenshot {
        url: String,

        /// Capture the full scroll height instead of the viewport
        #[arg(long)]
        full_page: bool,

        /// Where to write the PNG
        #[arg(long)]
        out: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<BrowserfetchConfig> {
    let loader = match path {
        Some(path) => BrowserfetchConfigLoader::new().with_file(path),
        None => BrowserfetchConfigLoader::new().with_optional_file(DEFAULT_CONFIG),
    };
    loader.load().context("loading configuration")
}

async fn run(cli: Cli) -> Result<()> {
    // 1) Load config (env wins)
    let cfg = load_config(cli.config.as_ref())?;
    init_logging(wiring::log_config(&cfg))?;

    let fetcher = build_fetcher(&cfg)?;
    match cli.command {
        Command::Fetch {
            url,
            wait,
            no_scroll,
            max_chars,
            full,
        } => {
            let req = FetchRequest::new(url)
                .wait_seconds(wait)
                .scroll(!no_scroll)
                .max_chars(max_chars)
                .readability(!full);
            fetch(&fetcher, &req).await
        }
        Command::Screenshot {
            url,
            full_page,
            out,
        } => {
            let req = ScreenshotRequest::new(url).full_page(full_page);
            screenshot(&fetcher, &req, &out).await
        }
    }
}

async fn fetch(fetcher: &Fetcher, req: &FetchRequest) -> Result<()> {
    let result = fetcher.fetch(req).await?;
    println!("{}", result.text);
    if result.truncated {
        eprintln!(
            "[output truncated to {} characters]",
            fetcher.limits().effective_max_chars(req.max_chars)
        );
    }
    Ok(())
}

async fn screenshot(fetcher: &Fetcher, req: &ScreenshotRequest, out: &PathBuf) -> Result<()> {
    let shot = fetcher.screenshot(req).await?;
    tokio::fs::write(out, &shot.png_bytes)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    eprintln!(
        "wrote {} ({}x{}{})",
        out.display(),
        shot.width,
        shot.height,
        if shot.truncated_height {
            ", height capped"
        } else {
            ""
        }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "app.failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn fetch_flags_map_onto_the_request() {
        let cli = Cli::try_parse_from([
            "browserfetch",
            "fetch",
            "https://example.com/",
            "--wait",
            "0",
            "--no-scroll",
            "--max-chars",
            "0",
            "--full",
        ])
        .unwrap();
        match cli.command {
            Command::Fetch {
                wait,
                no_scroll,
                max_chars,
                full,
                ..
            } => {
                assert_eq!(wait, 0.0);
                assert!(no_scroll);
                assert_eq!(max_chars, 0);
                assert!(full);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn screenshot_requires_out() {
        assert!(Cli::try_parse_from(["browserfetch", "screenshot", "https://example.com/"]).is_err());
        let cli = Cli::try_parse_from([
            "browserfetch",
            "--config",
            "custom.yaml",
            "screenshot",
            "https://example.com/",
            "--full-page",
            "--out",
            "shot.png",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert!(matches!(cli.command, Command::Screenshot { full_page: true, .. }));
    }
}
