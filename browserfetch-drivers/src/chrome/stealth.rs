use browserfetch_common::{SandboxMode, StealthLevel};

use super::fingerprint::UserAgentProfile;

/// Construct Chrome command-line arguments for a stealth level and fingerprint.
///
/// `--no-sandbox` is only ever added for [`SandboxMode::Disabled`].
pub fn build_stealth_arguments(
    level: StealthLevel,
    user_profile: &UserAgentProfile,
    sandbox: SandboxMode,
) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-extensions".to_string(),
        "--disable-plugins-discovery".to_string(),
        format!("--user-agent={}", user_profile.user_agent),
        format!(
            "--window-size={},{}",
            user_profile.viewport.0, user_profile.viewport.1
        ),
        format!("--lang={}", user_profile.languages.join(",")),
    ];
    if sandbox == SandboxMode::Disabled {
        args.push("--no-sandbox".to_string());
    }
    if level == StealthLevel::Maximum {
        args.push("--disable-gpu".to_string());
    }
    args
}

/// Chrome preferences that stop the browser from saving downloads.
pub fn download_prefs() -> serde_json::Value {
    serde_json::json!({
        "download_restrictions": 3,
        "download.prompt_for_download": false,
    })
}

/// JavaScript evasions applied after page load to reduce automation signals.
pub struct StealthScripts;

impl StealthScripts {
    pub fn get_core_evasions() -> &'static str {
        r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'plugins', { get: () => [1,2,3] });
            Object.defineProperty(navigator, 'languages', {
                get: () => ['en-US', 'en']
            });
            if (!window.chrome) window.chrome = { runtime: {} };
        "#
    }
    pub fn get_webgl_evasions() -> &'static str {
        r#"
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function(parameter) {
                if (parameter === 37445) return 'Intel Inc.';
                if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                return getParameter.call(this, parameter);
            };
        "#
    }
    pub fn get_canvas_evasions() -> &'static str {
        r#"
            const getContext = HTMLCanvasElement.prototype.getContext;
            HTMLCanvasElement.prototype.getContext = function(type,...args){
                const ctx = getContext.call(this,type,...args);
                if(type==='2d' && ctx) {
                    const origToDataURL=this.toDataURL;
                    this.toDataURL=function(...a){
                        const imgdata=ctx.getImageData(0,0,this.width,this.height);
                        for(let i=0;i<imgdata.data.length;i+=4){
                            if(Math.random()<0.001)imgdata.data[i]+=Math.random()<0.5?-1:1;
                        }
                        ctx.putImageData(imgdata,0,0);
                        return origToDataURL.call(this,...a);
                    };
                }
                return ctx;
            };
        "#
    }

    /// Scripts to run for a level, in order.
    pub fn for_level(level: StealthLevel) -> Vec<&'static str> {
        match level {
            StealthLevel::Lightweight => vec![Self::get_core_evasions()],
            StealthLevel::Balanced => vec![Self::get_core_evasions(), Self::get_canvas_evasions()],
            StealthLevel::Maximum => vec![
                Self::get_core_evasions(),
                Self::get_canvas_evasions(),
                Self::get_webgl_evasions(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chrome::fingerprint::UserAgentManager;

    #[test]
    fn sandbox_flag_only_when_disabled() {
        let mut ua = UserAgentManager::new();
        let profile = ua.session_profile().clone();

        let args = build_stealth_arguments(StealthLevel::Balanced, &profile, SandboxMode::Enabled);
        assert!(!args.iter().any(|a| a == "--no-sandbox"));
        assert!(!args.iter().any(|a| a == "--disable-web-security"));

        let args = build_stealth_arguments(StealthLevel::Balanced, &profile, SandboxMode::Disabled);
        assert!(args.iter().any(|a| a == "--no-sandbox"));
    }

    #[test]
    fn window_size_matches_profile() {
        let mut ua = UserAgentManager::new();
        let profile = ua.session_profile().clone();
        let args = build_stealth_arguments(StealthLevel::Maximum, &profile, SandboxMode::Enabled);
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
    }

    #[test]
    fn scripts_grow_with_level() {
        assert_eq!(StealthScripts::for_level(StealthLevel::Lightweight).len(), 1);
        assert_eq!(StealthScripts::for_level(StealthLevel::Balanced).len(), 2);
        assert_eq!(StealthScripts::for_level(StealthLevel::Maximum).len(), 3);
    }
}
