//! Rendered HTML to bounded, LLM-friendly text.
//!
//! Full mode converts the whole document to markdown with `htmd`, minus page
//! chrome (scripts, navigation, headers and footers). Readability mode asks
//! `readabilityrs` for the main article first and falls back to full mode
//! when it finds nothing substantial. Link and image targets are made
//! absolute against the page URL. `html2text` is the last resort when the
//! markdown conversion fails.

use browserfetch_common::{FetchError, Result};
use htmd::HtmlToMarkdown;
use htmd::options::{CodeBlockStyle, HeadingStyle, LinkStyle, Options};
use readabilityrs::Readability;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    Readability,
    Full,
}

impl ExtractMode {
    pub fn from_readability(readability: bool) -> Self {
        if readability {
            ExtractMode::Readability
        } else {
            ExtractMode::Full
        }
    }
}

/// HTML-to-text seam. Runs on the blocking pool.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, base_url: &Url, mode: ExtractMode) -> Result<String>;
}

/// Default [`Extractor`]: `readabilityrs` for article detection, `htmd` for
/// markdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extract(&self, html: &str, base_url: &Url, mode: ExtractMode) -> Result<String> {
        if mode == ExtractMode::Readability {
            if let Some(article) = readable_article(html, base_url) {
                return Ok(article);
            }
            tracing::debug!(url = %base_url, "extract.readability_fallback");
        }
        full_text(html, base_url)
    }
}

/// Cut `text` to at most `max_chars` characters. The flag reports a cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

const SKIPPED: &[&str] = &[
    "script", "style", "nav", "footer", "header", "noscript", "svg", "head", "template", "iframe",
];

/// Shorter articles are treated as a failed detection.
const MIN_ARTICLE_CHARS: usize = 200;

const PLAIN_TEXT_WIDTH: usize = 100;

fn readable_article(html: &str, base_url: &Url) -> Option<String> {
    let readability = Readability::new(html, Some(base_url.as_str()), None).ok()?;
    let article = readability.parse()?;
    let content = article.content.filter(|c| !c.trim().is_empty())?;
    let markdown = to_markdown(&content, base_url).ok()?;
    (markdown.chars().count() >= MIN_ARTICLE_CHARS).then_some(markdown)
}

fn full_text(html: &str, base_url: &Url) -> Result<String> {
    match to_markdown(html, base_url) {
        Ok(markdown) => Ok(markdown),
        Err(err) => {
            tracing::warn!(url = %base_url, error = %err, "extract.markdown_failed");
            plain_text(html)
        }
    }
}

fn to_markdown(html: &str, base_url: &Url) -> anyhow::Result<String> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(SKIPPED.to_vec())
        .options(Options {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            link_style: LinkStyle::Inlined,
            ..Default::default()
        })
        .build();
    let markdown = converter.convert(html)?;
    Ok(clean_lines(&absolutize_targets(&markdown, base_url)))
}

fn plain_text(html: &str) -> Result<String> {
    let text = html2text::from_read(html.as_bytes(), PLAIN_TEXT_WIDTH)
        .map_err(|e| FetchError::Extraction(e.to_string()))?;
    Ok(clean_lines(&text))
}

/// Rewrite every inline `](target)` so the target is absolute.
fn absolutize_targets(markdown: &str, base_url: &Url) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut rest = markdown;
    while let Some(pos) = rest.find("](") {
        let (head, tail) = rest.split_at(pos + 2);
        out.push_str(head);
        let end = tail
            .find(|c: char| c == ')' || c.is_whitespace())
            .unwrap_or(tail.len());
        let target = &tail[..end];
        match base_url.join(target) {
            Ok(joined) if !target.is_empty() => out.push_str(joined.as_str()),
            _ => out.push_str(target),
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

/// Drop trailing spaces and keep at most two blank lines in a row.
fn clean_lines(text: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                cleaned.push("");
            }
        } else {
            blank_run = 0;
            cleaned.push(line);
        }
    }
    cleaned.join("\n").trim().to_string()
}
