//! Cookie-consent banner handling.
//!
//! Banners cover content in screenshots and leak boilerplate into extracted
//! text, so after load the page clicks the first visible "accept" control it
//! recognises and then strips known banner containers from the DOM.

/// Consent-manager buttons matched by id, class or test attribute.
pub const ACCEPT_SELECTORS: &[&str] = &[
    // OneTrust
    "#onetrust-accept-btn-handler",
    // Cookiebot
    "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll",
    // Quantcast
    ".qc-cmp2-summary-buttons button[mode='primary']",
    "[data-testid='cookie-policy-dialog-accept-button']",
    "[id*='cookie'] button[id*='accept']",
    "[class*='cookie'] button[class*='accept']",
    "[id*='consent'] button[id*='accept']",
    "[class*='consent'] button[class*='accept']",
];

/// Button labels accepted when no known selector matched, compared lowercase.
pub const ACCEPT_LABELS: &[&str] = &[
    "accept all",
    "accept cookies",
    "allow all",
    "i agree",
    "got it",
    "accept",
    "ok",
];

/// Containers removed once a banner was accepted.
pub const BANNER_CONTAINERS: &[&str] = &[
    "#onetrust-banner-sdk",
    "#onetrust-consent-sdk",
    "#CybotCookiebotDialog",
    "#cookiebanner",
    ".qc-cmp2-container",
    "[class*='cookie-banner']",
    "[class*='cookie-consent']",
    "[class*='cookieBanner']",
    "[class*='cookieConsent']",
    "[id*='cookie-banner']",
    "[id*='cookie-consent']",
    "[id*='cookieBanner']",
    "[id*='cookieConsent']",
    "[aria-label*='cookie' i]",
];

/// Script that clicks the first visible accept control. Arguments: selectors, labels.
/// Returns `true` when something was clicked.
pub const CLICK_ACCEPT_SCRIPT: &str = r#"
    const [selectors, labels] = arguments;
    const visible = (el) => !!el && el.offsetParent !== null;
    for (const sel of selectors) {
        let el = null;
        try { el = document.querySelector(sel); } catch (_) { continue; }
        if (visible(el)) { el.click(); return true; }
    }
    const candidates = document.querySelectorAll("button, [role='button']");
    for (const el of candidates) {
        const text = (el.innerText || '').trim().toLowerCase();
        if (labels.includes(text) && visible(el)) { el.click(); return true; }
    }
    return false;
"#;

/// Script that removes banner containers. Argument: selectors.
pub const REMOVE_BANNERS_SCRIPT: &str = r#"
    const [selectors] = arguments;
    for (const sel of selectors) {
        try { document.querySelectorAll(sel).forEach((el) => el.remove()); } catch (_) {}
    }
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_lowercase() {
        assert!(ACCEPT_LABELS.iter().all(|l| l.to_lowercase() == *l));
    }

    #[test]
    fn scripts_read_their_arguments() {
        assert!(CLICK_ACCEPT_SCRIPT.contains("arguments"));
        assert!(REMOVE_BANNERS_SCRIPT.contains("arguments"));
    }
}
