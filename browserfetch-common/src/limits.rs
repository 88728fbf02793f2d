//! Static resource limit policy.
//!
//! One [`ResourceLimits`] value is built at startup and handed to every
//! component. The hard caps below cannot be raised by configuration.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest post-load wait a request may ask for.
pub const HARD_MAX_WAIT_SECS: f64 = 30.0;
/// Largest text output a request may ask for. `max_chars = 0` maps here.
pub const HARD_MAX_CHARS: usize = 500_000;
/// Tallest screenshot ever produced, in pixels.
pub const HARD_MAX_SCREENSHOT_HEIGHT: u32 = 16_384;
/// Longest precheck or navigation timeout configuration may set.
pub const HARD_MAX_TIMEOUT_SECS: f64 = 300.0;

/// Time granted to auto-scrolling on top of the navigation budget.
const SCROLL_ALLOWANCE: Duration = Duration::from_secs(8);
/// Time granted to stealth scripts, consent dismissal and the DOM snapshot.
const SETTLE_ALLOWANCE: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid resource limit: {0}")]
pub struct InvalidLimit(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Upper bound on the per-request post-load wait, in seconds.
    pub max_wait_secs: f64,
    /// Upper bound on returned text, in characters.
    pub max_chars: usize,
    pub max_screenshot_bytes: usize,
    pub max_screenshot_height: u32,
    /// Byte cap across all cache entries.
    pub max_cache_bytes: usize,
    pub max_cache_entries: usize,
    /// Simultaneous in-flight fetch/screenshot navigations.
    pub max_concurrency: usize,
    pub precheck_timeout_secs: f64,
    /// Budget for the initial page load, before any wait or scroll.
    pub navigation_timeout_secs: f64,
    pub max_redirects: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_wait_secs: HARD_MAX_WAIT_SECS,
            max_chars: HARD_MAX_CHARS,
            max_screenshot_bytes: 20 * 1024 * 1024,
            max_screenshot_height: HARD_MAX_SCREENSHOT_HEIGHT,
            max_cache_bytes: 50 * 1024 * 1024,
            max_cache_entries: 20,
            max_concurrency: 4,
            precheck_timeout_secs: 5.0,
            navigation_timeout_secs: 30.0,
            max_redirects: 10,
        }
    }
}

impl ResourceLimits {
    /// Reject values that would disable a limit or exceed a hard cap.
    pub fn validate(&self) -> Result<(), InvalidLimit> {
        if self.max_concurrency == 0 {
            return Err(InvalidLimit("max_concurrency must be at least 1".into()));
        }
        if self.max_chars == 0 || self.max_chars > HARD_MAX_CHARS {
            return Err(InvalidLimit(format!(
                "max_chars must be in 1..={HARD_MAX_CHARS}"
            )));
        }
        if !(self.max_wait_secs.is_finite()
            && (0.0..=HARD_MAX_WAIT_SECS).contains(&self.max_wait_secs))
        {
            return Err(InvalidLimit(format!(
                "max_wait_secs must be in 0..={HARD_MAX_WAIT_SECS}"
            )));
        }
        if self.max_screenshot_height == 0
            || self.max_screenshot_height > HARD_MAX_SCREENSHOT_HEIGHT
        {
            return Err(InvalidLimit(format!(
                "max_screenshot_height must be in 1..={HARD_MAX_SCREENSHOT_HEIGHT}"
            )));
        }
        if self.max_screenshot_bytes == 0 {
            return Err(InvalidLimit("max_screenshot_bytes must be positive".into()));
        }
        if self.max_cache_bytes == 0 || self.max_cache_entries == 0 {
            return Err(InvalidLimit("cache caps must be positive".into()));
        }
        for (name, secs) in [
            ("precheck_timeout_secs", self.precheck_timeout_secs),
            ("navigation_timeout_secs", self.navigation_timeout_secs),
        ] {
            if !(secs.is_finite() && secs > 0.0 && secs <= HARD_MAX_TIMEOUT_SECS) {
                return Err(InvalidLimit(format!(
                    "{name} must be in (0, {HARD_MAX_TIMEOUT_SECS}]"
                )));
            }
        }
        Ok(())
    }

    /// Clamp a requested wait into `[0, max_wait_secs]`. NaN counts as no wait.
    pub fn clamp_wait(&self, requested_secs: f64) -> Duration {
        if requested_secs.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(requested_secs.clamp(0.0, self.max_wait_secs))
    }

    /// Resolve the `max_chars` sentinel: `0` and anything over the cap mean the cap.
    pub fn effective_max_chars(&self, requested: usize) -> usize {
        if requested == 0 || requested > self.max_chars {
            self.max_chars
        } else {
            requested
        }
    }

    pub fn precheck_timeout(&self) -> Duration {
        bounded_timeout(self.precheck_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        bounded_timeout(self.navigation_timeout_secs)
    }

    /// Hard deadline around the whole navigation state for one request.
    pub fn navigation_deadline(&self, wait: Duration, scroll: bool) -> Duration {
        let mut deadline = self.navigation_timeout() + wait + SETTLE_ALLOWANCE;
        if scroll {
            deadline += SCROLL_ALLOWANCE;
        }
        deadline
    }
}

/// Seconds to a timeout that never exceeds the hard cap. Values `validate`
/// would refuse still map to something finite instead of panicking.
fn bounded_timeout(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(HARD_MAX_TIMEOUT_SECS)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ResourceLimits::default().validate().is_ok());
    }

    #[test]
    fn zero_max_chars_means_the_cap() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.effective_max_chars(0), HARD_MAX_CHARS);
        assert_eq!(limits.effective_max_chars(1_000), 1_000);
        assert_eq!(limits.effective_max_chars(9_000_000), HARD_MAX_CHARS);
    }

    #[test]
    fn wait_is_clamped() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.clamp_wait(-3.0), Duration::ZERO);
        assert_eq!(limits.clamp_wait(2.5), Duration::from_millis(2_500));
        assert_eq!(limits.clamp_wait(120.0), Duration::from_secs(30));
        assert_eq!(limits.clamp_wait(f64::INFINITY), Duration::from_secs(30));
        assert_eq!(limits.clamp_wait(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn validate_rejects_disabled_limits() {
        let limits = ResourceLimits {
            max_concurrency: 0,
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());

        let limits = ResourceLimits {
            max_chars: HARD_MAX_CHARS + 1,
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());

        let limits = ResourceLimits {
            max_wait_secs: 45.0,
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());

        let limits = ResourceLimits {
            precheck_timeout_secs: 0.0,
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn huge_timeouts_are_refused_without_panicking() {
        let limits = ResourceLimits {
            navigation_timeout_secs: 1e30,
            precheck_timeout_secs: f64::INFINITY,
            ..ResourceLimits::default()
        };
        let err = limits.validate().unwrap_err();
        assert!(err.0.contains("precheck_timeout_secs"), "{err}");

        let limits = ResourceLimits {
            navigation_timeout_secs: 301.0,
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());
        let limits = ResourceLimits {
            navigation_timeout_secs: HARD_MAX_TIMEOUT_SECS,
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_ok());

        let unchecked = ResourceLimits {
            navigation_timeout_secs: 1e30,
            precheck_timeout_secs: -1.0,
            ..ResourceLimits::default()
        };
        assert_eq!(unchecked.navigation_timeout(), Duration::from_secs(300));
        assert_eq!(unchecked.precheck_timeout(), Duration::ZERO);
        let deadline = unchecked.navigation_deadline(Duration::from_secs(30), true);
        assert!(deadline <= Duration::from_secs(400));
    }

    #[test]
    fn deadline_covers_wait_and_scroll() {
        let limits = ResourceLimits::default();
        let base = limits.navigation_deadline(Duration::ZERO, false);
        assert!(base > limits.navigation_timeout());
        let scrolled = limits.navigation_deadline(Duration::from_secs(2), true);
        assert!(scrolled >= base + Duration::from_secs(2));
    }
}
