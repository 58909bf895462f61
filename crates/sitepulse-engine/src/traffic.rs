//! Referrer-host → traffic-source classification.

use url::Url;

/// Fixed table of well-known social networks and search engines. Matching is
/// by host-substring so regional domains (google.co.uk, ...) resolve too.
const SOURCE_TABLE: &[(&str, &str)] = &[
    ("google.", "Google"),
    ("bing.", "Bing"),
    ("duckduckgo.", "DuckDuckGo"),
    ("yahoo.", "Yahoo"),
    ("baidu.", "Baidu"),
    ("yandex.", "Yandex"),
    ("facebook.", "Facebook"),
    ("instagram.", "Instagram"),
    ("twitter.", "X"),
    ("x.com", "X"),
    ("t.co", "X"),
    ("linkedin.", "LinkedIn"),
    ("reddit.", "Reddit"),
    ("youtube.", "YouTube"),
    ("pinterest.", "Pinterest"),
    ("tiktok.", "TikTok"),
];

/// Classify a referrer URL into a source label.
///
/// No referrer (or an unparsable one) is `direct`; a known social/search
/// host maps through the fixed table; anything else falls back to the bare
/// hostname with a leading `www.` stripped.
pub fn classify_source(referrer: Option<&str>) -> String {
    let Some(raw) = referrer.map(str::trim).filter(|r| !r.is_empty()) else {
        return "direct".to_string();
    };
    let Some(host) = Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return "direct".to_string();
    };
    for (needle, label) in SOURCE_TABLE {
        if host.contains(needle) {
            return (*label).to_string();
        }
    }
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}
