//! Driver layer for browser automation.
//!
//! This crate wraps a WebDriver (Chromedriver) session with the stealth and
//! pacing behaviour the fetcher relies on. It knows nothing about SSRF or
//! limits; callers own those decisions.
//!
//! - [`chrome::driver::ChromeDriver`]: session setup, launch arguments, timeouts
//! - [`chrome::page::ChromePage`]: navigation, consent dismissal, scrolling, capture
//! - [`chrome::behavioral::BehavioralEngine`]: human-like pauses
//! - [`chrome::stealth`]: launch arguments and JS evasions per stealth level
pub mod chrome;
