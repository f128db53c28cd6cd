//! Ephemeral network identities.
//!
//! Every paced request presents a fresh identity: a header set and a browser
//! fingerprint drawn from the same template, so the user agent, platform, and
//! language hints stay coherent with each other.

use http::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};
use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserType {
    Chrome,
    Firefox,
    Safari,
    Edge,
}

impl BrowserType {
    pub const ALL: [BrowserType; 4] = [
        BrowserType::Chrome,
        BrowserType::Firefox,
        BrowserType::Safari,
        BrowserType::Edge,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrowserFingerprint {
    pub user_agent: String,
    pub platform: String,
    pub language: String,
    pub screen_resolution: (u16, u16),
    pub color_depth: u8,
    pub timezone: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub touch_support: bool,
    pub fonts: Vec<String>,
    pub plugins: Vec<String>,
}

/// Headers plus fingerprint presented by one request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub headers: HeaderMap,
    pub fingerprint: BrowserFingerprint,
}

/// Source of per-request identities.
pub trait IdentityProvider: Send + Sync {
    /// A coherent header set and fingerprint pair.
    fn identity(&self) -> Identity;

    fn headers(&self) -> HeaderMap {
        self.identity().headers
    }

    fn fingerprint(&self) -> BrowserFingerprint {
        self.identity().fingerprint
    }
}

const SCREEN_RESOLUTIONS: &[(u16, u16)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1280, 720),
    (2560, 1440),
    (3840, 2160),
];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

struct FingerprintTemplate {
    user_agent: &'static str,
    platform: &'static str,
    ch_platform: &'static str,
    accept_languages: &'static [&'static str],
    timezones: &'static [&'static str],
    webgl: &'static [(&'static str, &'static str)],
    fonts: &'static [&'static str],
    plugins: &'static [&'static str],
}

const WINDOWS_FONTS: &[&str] = &["Arial", "Calibri", "Cambria", "Consolas", "Segoe UI", "Tahoma", "Verdana"];
const MAC_FONTS: &[&str] = &["Helvetica Neue", "Menlo", "Avenir", "Geneva", "Monaco", "San Francisco"];
const CHROMIUM_PLUGINS: &[&str] = &["PDF Viewer", "Chrome PDF Viewer", "Chromium PDF Viewer"];

static TEMPLATES: &[(BrowserType, FingerprintTemplate)] = &[
    (
        BrowserType::Chrome,
        FingerprintTemplate {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            platform: "Win32",
            ch_platform: "\"Windows\"",
            accept_languages: &["en-US,en;q=0.9", "en-IN,en;q=0.9,hi;q=0.8", "en-GB,en;q=0.8"],
            timezones: &["Asia/Kolkata", "America/New_York", "Europe/London"],
            webgl: &[
                ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0)"),
                ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0)"),
            ],
            fonts: WINDOWS_FONTS,
            plugins: CHROMIUM_PLUGINS,
        },
    ),
    (
        BrowserType::Edge,
        FingerprintTemplate {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
            platform: "Win32",
            ch_platform: "\"Windows\"",
            accept_languages: &["en-US,en;q=0.9", "en-IN,en;q=0.8"],
            timezones: &["Asia/Kolkata", "Europe/Berlin"],
            webgl: &[("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 6700 XT Direct3D11 vs_5_0 ps_5_0)")],
            fonts: WINDOWS_FONTS,
            plugins: CHROMIUM_PLUGINS,
        },
    ),
    (
        BrowserType::Firefox,
        FingerprintTemplate {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
            platform: "Linux x86_64",
            ch_platform: "\"Linux\"",
            accept_languages: &["en-US,en;q=0.5", "en-GB,en;q=0.5"],
            timezones: &["Europe/London", "America/Los_Angeles"],
            webgl: &[("Mozilla", "Mozilla -- Mesa Intel(R) UHD Graphics 620")],
            fonts: &["DejaVu Sans", "Liberation Sans", "Noto Sans", "Ubuntu"],
            plugins: &["PDF Viewer"],
        },
    ),
    (
        BrowserType::Safari,
        FingerprintTemplate {
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
            platform: "MacIntel",
            ch_platform: "\"macOS\"",
            accept_languages: &["en-US,en;q=0.9", "en-AU,en;q=0.9"],
            timezones: &["America/Los_Angeles", "Australia/Sydney"],
            webgl: &[("Apple Inc.", "Apple GPU")],
            fonts: MAC_FONTS,
            plugins: &["WebKit built-in PDF"],
        },
    ),
];

fn template_for(browser: BrowserType) -> &'static FingerprintTemplate {
    TEMPLATES
        .iter()
        .find(|(kind, _)| *kind == browser)
        .map(|(_, template)| template)
        .unwrap_or(&TEMPLATES[0].1)
}

/// Draws a new random identity on every call.
#[derive(Debug, Clone)]
pub struct RotatingIdentityProvider {
    browsers: Vec<BrowserType>,
}

impl RotatingIdentityProvider {
    pub fn new() -> Self {
        Self {
            browsers: BrowserType::ALL.to_vec(),
        }
    }

    /// Restrict rotation to the given browsers. An empty list keeps all.
    pub fn with_browsers(mut self, browsers: impl IntoIterator<Item = BrowserType>) -> Self {
        let browsers: Vec<_> = browsers.into_iter().collect();
        if !browsers.is_empty() {
            self.browsers = browsers;
        }
        self
    }

    pub fn generate_for(browser: BrowserType) -> Identity {
        let template = template_for(browser);
        let mut rng = rand::thread_rng();

        let language = template
            .accept_languages
            .choose(&mut rng)
            .copied()
            .unwrap_or("en-US,en;q=0.9");
        let (webgl_vendor, webgl_renderer) = template
            .webgl
            .choose(&mut rng)
            .copied()
            .unwrap_or(("Google Inc.", "ANGLE"));

        let mut fonts: Vec<String> = template.fonts.iter().map(|f| f.to_string()).collect();
        fonts.shuffle(&mut rng);
        fonts.truncate(rng.gen_range(3..=fonts.len().max(3)));

        let fingerprint = BrowserFingerprint {
            user_agent: template.user_agent.to_string(),
            platform: template.platform.to_string(),
            language: language.to_string(),
            screen_resolution: SCREEN_RESOLUTIONS
                .choose(&mut rng)
                .copied()
                .unwrap_or((1920, 1080)),
            color_depth: if rng.gen_bool(0.5) { 24 } else { 32 },
            timezone: template
                .timezones
                .choose(&mut rng)
                .copied()
                .unwrap_or("UTC")
                .to_string(),
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
            touch_support: false,
            fonts,
            plugins: template.plugins.iter().map(|p| p.to_string()).collect(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(template.user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        if matches!(browser, BrowserType::Chrome | BrowserType::Edge) {
            headers.insert(
                HeaderName::from_static("sec-ch-ua-platform"),
                HeaderValue::from_static(template.ch_platform),
            );
            headers.insert(
                HeaderName::from_static("sec-ch-ua-mobile"),
                HeaderValue::from_static("?0"),
            );
        }

        Identity {
            headers,
            fingerprint,
        }
    }
}

impl Default for RotatingIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for RotatingIdentityProvider {
    fn identity(&self) -> Identity {
        let browser = self
            .browsers
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(BrowserType::Chrome);
        Self::generate_for(browser)
    }
}

/// Always presents the same identity.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: Identity,
}

impl StaticIdentityProvider {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn for_browser(browser: BrowserType) -> Self {
        Self::new(RotatingIdentityProvider::generate_for(browser))
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_fingerprint() {
        for browser in BrowserType::ALL {
            let identity = RotatingIdentityProvider::generate_for(browser);
            let ua = identity.headers.get(USER_AGENT).unwrap().to_str().unwrap();
            assert_eq!(ua, identity.fingerprint.user_agent);
            let lang = identity.headers.get(ACCEPT_LANGUAGE).unwrap().to_str().unwrap();
            assert_eq!(lang, identity.fingerprint.language);
            assert!(identity.fingerprint.fonts.len() >= 3);
        }
    }

    #[test]
    fn client_hints_only_for_chromium() {
        let firefox = RotatingIdentityProvider::generate_for(BrowserType::Firefox);
        assert!(firefox.headers.get("sec-ch-ua-platform").is_none());
        let edge = RotatingIdentityProvider::generate_for(BrowserType::Edge);
        assert_eq!(edge.headers.get("sec-ch-ua-platform").unwrap(), "\"Windows\"");
    }

    #[test]
    fn restricted_rotation_sticks_to_selection() {
        let provider = RotatingIdentityProvider::new().with_browsers([BrowserType::Safari]);
        for _ in 0..10 {
            assert_eq!(provider.fingerprint().platform, "MacIntel");
        }
    }

    #[test]
    fn resolutions_come_from_known_set() {
        let provider = RotatingIdentityProvider::default();
        for _ in 0..20 {
            let fp = provider.fingerprint();
            assert!(SCREEN_RESOLUTIONS.contains(&fp.screen_resolution));
        }
    }
}
