use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};

/// Default viewport for every session.
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Snapshot of user agent, viewport, and locale characteristics.
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
}

fn desktop(user_agent: &str, platform: &str) -> UserAgentProfile {
    UserAgentProfile {
        user_agent: user_agent.to_string(),
        viewport: DEFAULT_VIEWPORT,
        platform: platform.to_string(),
        languages: vec!["en-US".to_string(), "en".to_string()],
    }
}

#[derive(Debug, Clone)]
/// Small pool of plausible desktop Chrome profiles; one is picked per session.
pub struct UserAgentManager {
    desktop_profiles: Vec<UserAgentProfile>,
    current_session_profile: Option<UserAgentProfile>,
}

impl Default for UserAgentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentManager {
    pub fn new() -> Self {
        Self {
            desktop_profiles: vec![
                desktop("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36", "Win32"),
                desktop("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36", "MacIntel"),
                desktop("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36", "Linux x86_64"),
                desktop("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36", "Win32"),
                desktop("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36", "MacIntel"),
            ],
            current_session_profile: None,
        }
    }

    /// Get (or lazily select) the profile for this session.
    pub fn session_profile(&mut self) -> &UserAgentProfile {
        let pool = &self.desktop_profiles;
        self.current_session_profile.get_or_insert_with(|| {
            pool.choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| desktop("Mozilla/5.0", "Win32"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_stable_within_a_session() {
        let mut manager = UserAgentManager::new();
        let first = manager.session_profile().clone();
        for _ in 0..10 {
            assert_eq!(manager.session_profile(), &first);
        }
        assert_eq!(first.viewport, DEFAULT_VIEWPORT);
        assert!(first.user_agent.contains("Chrome/13"));
    }
}
