use serde::{Deserialize, Serialize};

/// Default wait after load, in seconds.
pub const DEFAULT_WAIT_SECS: f64 = 2.0;
/// Default output cap for `fetch`.
pub const DEFAULT_MAX_CHARS: usize = 40_000;

/// One text fetch. Values are clamped into the configured limits before any
/// network action; `max_chars == 0` means "the configured maximum".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub wait_seconds: f64,
    pub scroll: bool,
    pub max_chars: usize,
    pub readability: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_seconds: DEFAULT_WAIT_SECS,
            scroll: true,
            max_chars: DEFAULT_MAX_CHARS,
            readability: true,
        }
    }

    pub fn wait_seconds(mut self, secs: f64) -> Self {
        self.wait_seconds = secs;
        self
    }

    pub fn scroll(mut self, scroll: bool) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn readability(mut self, readability: bool) -> Self {
        self.readability = readability;
        self
    }
}

/// One screenshot capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRequest {
    pub url: String,
    pub full_page: bool,
}

impl ScreenshotRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            full_page: false,
        }
    }

    pub fn full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }
}

/// Extracted page text. `truncated` is set only when the rendered output was
/// longer than the effective `max_chars` and got cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub text: String,
    pub truncated: bool,
    pub source_url: String,
    pub final_url: String,
    pub title: Option<String>,
}

/// PNG capture with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotResult {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub truncated_height: bool,
}
