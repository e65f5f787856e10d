//! Spider and platform configuration.
//!
//! Everything empirically observed about a target platform (cookie names,
//! endpoint shapes, selector tiers, block-page markers) lives in
//! [`PlatformSpec`] data so that drift on the live sites is a config edit,
//! not a code edit.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The two target platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// RedNote (xiaohongshu.com): post engagement signals.
    RedNote,
    /// Goofish (goofish.com): second-hand listing counts.
    Goofish,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::RedNote => "rednote",
            Platform::Goofish => "goofish",
        }
    }
}

/// One tier of DOM selectors, tried in priority order by the scraper.
#[derive(Debug, Clone, Serialize)]
pub struct SelectorTier {
    pub name: &'static str,
    pub selector: &'static str,
}

/// Static description of one platform: URLs, cookies, selectors, markers.
#[derive(Debug, Clone)]
pub struct PlatformSpec {
    pub platform: Platform,
    pub origin: &'static str,
    pub home_url: &'static str,
    /// Search URL template; `{}` is replaced with the URL-encoded key.
    pub search_url: &'static str,
    /// In-page fetch target for the direct API strategy.
    pub api_url: &'static str,
    /// Substrings that identify the platform's internal search API in
    /// sniffed responses (host fragment, path fragment).
    pub api_host_hint: &'static str,
    pub api_path_hint: &'static str,
    /// Cookie names that a logged-in session carries.
    pub required_cookies: &'static [&'static str],
    /// How many of the required cookies must be valid for `cookies_ok`.
    pub min_valid_cookies: usize,
    /// Selector tiers for the weighted DOM scraper, highest priority first.
    pub selector_tiers: &'static [SelectorTier],
    /// Text fragments that indicate a block/CAPTCHA interstitial.
    pub blocked_markers: &'static [&'static str],
    /// Selectors that indicate an authenticated identity (avatar etc.).
    pub identity_markers: &'static [&'static str],
    /// Selectors for a login affordance (present only when logged out).
    pub login_markers: &'static [&'static str],
    /// Cap on items returned per key by every real strategy.
    pub top_n: usize,
}

const REDNOTE_TIERS: &[SelectorTier] = &[
    SelectorTier {
        name: "structural",
        selector: "section[data-v-2acb2abe], section.note-item",
    },
    SelectorTier {
        name: "class",
        selector: "[class*=\"note\"], [class*=\"feed\"], [class*=\"card\"]",
    },
    SelectorTier {
        name: "generic",
        selector: "article, div",
    },
];

const GOOFISH_TIERS: &[SelectorTier] = &[
    SelectorTier {
        name: "structural",
        selector: "div[data-item], a[data-sku]",
    },
    SelectorTier {
        name: "class",
        selector: ".item-card, .item, .list-item, [class*=\"goods\"]",
    },
    SelectorTier {
        name: "generic",
        selector: "article, div",
    },
];

// Observed 2025; expected to drift with the target sites.
const BLOCKED_MARKERS: &[&str] = &[
    "请稍后再试",
    "访问受限",
    "被系统拦截",
    "人机验证",
    "异常登录",
    "请勿频繁操作",
    "verify",
    "captcha",
];

impl PlatformSpec {
    pub fn rednote() -> Self {
        Self {
            platform: Platform::RedNote,
            origin: "https://www.xiaohongshu.com",
            home_url: "https://www.xiaohongshu.com/",
            search_url: "https://www.xiaohongshu.com/search_notes?keyword={}&note_type=0",
            api_url: "https://edith.xiaohongshu.com/api/sns/v10/search/notes?keyword={}&page=1&page_size=30&sort=general&note_type=0",
            api_host_hint: "edith.xiaohongshu.com",
            api_path_hint: "/search/notes",
            required_cookies: &["a1", "webId", "web_session", "xsecappid"],
            min_valid_cookies: 1,
            selector_tiers: REDNOTE_TIERS,
            blocked_markers: BLOCKED_MARKERS,
            identity_markers: &[
                "div.avatar",
                "div.user-avatar",
                "img.avatar-img",
                "div.user-info",
                "span.user-nick",
                "[class*=\"avatar\"]",
            ],
            login_markers: &["button.login", "a.login-btn", "div.login-container"],
            top_n: 10,
        }
    }

    pub fn goofish() -> Self {
        Self {
            platform: Platform::Goofish,
            origin: "https://www.goofish.com",
            home_url: "https://www.goofish.com/",
            search_url: "https://www.goofish.com/search?q={}",
            api_url: "https://www.goofish.com/h5/mtopsearch?q={}",
            api_host_hint: "goofish.com",
            api_path_hint: "mtopsearch",
            required_cookies: &["_m_h5_tk", "_m_h5_tk_enc", "cookie2", "sgcookie"],
            min_valid_cookies: 1,
            selector_tiers: GOOFISH_TIERS,
            blocked_markers: BLOCKED_MARKERS,
            identity_markers: &[
                "div.avatar",
                "div.user-avatar",
                "[class*=\"avatar\"]",
                "div.user-info",
            ],
            login_markers: &["button.login", "a.login-btn", "div.login"],
            top_n: 10,
        }
    }

    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::RedNote => Self::rednote(),
            Platform::Goofish => Self::goofish(),
        }
    }

    /// Build the search page URL for a key.
    pub fn search_url_for(&self, key: &str) -> String {
        self.search_url.replace("{}", &url_encode(key))
    }

    /// Build the direct API URL for a key.
    pub fn api_url_for(&self, key: &str) -> String {
        self.api_url.replace("{}", &url_encode(key))
    }
}

/// Minimal percent-encoding for query values (non-alphanumeric bytes).
fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Runtime configuration for one spider instance.
#[derive(Debug, Clone)]
pub struct SpiderConfig {
    /// Persistent browser profile directory (populated by the external
    /// login flow; read-only to the core).
    pub profile_dir: PathBuf,
    pub headless: bool,
    /// Skip image/media/font requests to speed up navigation.
    pub lightweight: bool,
    pub nav_timeout: Duration,
    /// Window for the network sniffer's response race.
    pub sniff_timeout: Duration,
    /// Minimum on-disk profile size considered a populated session.
    pub min_profile_bytes: u64,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            profile_dir: resolve_profile_dir(None),
            headless: true,
            lightweight: true,
            nav_timeout: Duration::from_secs(30),
            sniff_timeout: Duration::from_secs(10),
            min_profile_bytes: 5 * 1024 * 1024,
        }
    }
}

impl SpiderConfig {
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = dir.into();
        self
    }
}

/// Resolve the session profile directory: explicit path, then the
/// `NICHEWATCH_PROFILE` environment variable, then a home-relative default.
pub fn resolve_profile_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("NICHEWATCH_PROFILE") {
        return PathBuf::from(env_path);
    }

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(format!("{home}/.nichewatch/browser_profile"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_profile_dir_wins() {
        let dir = resolve_profile_dir(Some("/tmp/profile"));
        assert_eq!(dir, PathBuf::from("/tmp/profile"));
    }

    #[test]
    fn search_url_encodes_key() {
        let spec = PlatformSpec::rednote();
        let url = spec.search_url_for("vintage camera");
        assert!(url.contains("keyword=vintage%20camera"));
        assert!(!url.contains(' '));
    }

    #[test]
    fn platform_specs_are_internally_consistent() {
        for spec in [PlatformSpec::rednote(), PlatformSpec::goofish()] {
            assert!(spec.home_url.starts_with(spec.origin));
            assert!(!spec.required_cookies.is_empty());
            assert!(spec.min_valid_cookies <= spec.required_cookies.len());
            assert_eq!(spec.selector_tiers.len(), 3);
            assert!(spec.top_n > 0);
        }
    }
}
