//! Evasion scripts installed before any page script runs.

/// Scripts registered with `Page.addScriptToEvaluateOnNewDocument`.
pub const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver is the first thing challenge pages read
    r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
    "#,
    r#"
    window.chrome = window.chrome || { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }
        ],
        configurable: true
    });
    "#,
    r#"
    if (window.navigator.permissions && window.navigator.permissions.query) {
        const query = window.navigator.permissions.query.bind(window.navigator.permissions);
        window.navigator.permissions.query = (p) => (
            p && p.name === 'notifications' ? Promise.resolve({ state: Notification.permission }) : query(p)
        );
    }
    "#,
    r#"
    if (window.WebGLRenderingContext) {
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function(parameter) {
            if (parameter === 37445) return 'Intel Inc.';
            if (parameter === 37446) return 'Intel Iris OpenGL Engine';
            return getParameter.call(this, parameter);
        };
    }
    "#,
];

/// Sub-resource URL patterns dropped while rendering.
pub const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.css", "*.woff", "*.woff2",
    "*.ttf", "*.otf", "*.mp4", "*.webm",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_patterns_cover_heavy_assets() {
        for needle in ["*.png", "*.css", "*.woff2"] {
            assert!(BLOCKED_RESOURCE_PATTERNS.contains(&needle));
        }
        assert!(!BLOCKED_RESOURCE_PATTERNS.iter().any(|p| p.ends_with(".js")));
    }
}
