//! Guarded remote-content fetching.
//!
//! - SSRF guard with injectable DNS resolution (`guard`)
//! - `HEAD` content-type precheck with guarded redirect walking (`precheck`)
//! - Concurrency limiter and bounded LRU result cache (`limiter`, `cache`)
//! - Browser and page-session traits plus the WebDriver implementation (`browser`)
//! - HTML-to-text extraction with a readability mode (`extract`)
//! - The orchestrator tying them together (`fetcher`)

pub mod browser;
pub mod cache;
pub mod extract;
pub mod fetcher;
pub mod guard;
pub mod limiter;
pub mod precheck;
pub mod types;

pub use fetcher::{Components, Fetcher};
pub use types::{FetchRequest, FetchResult, ScreenshotRequest, ScreenshotResult};
