//! User-agent classification into browser and OS families.

use regex::Regex;
use std::sync::OnceLock;

/// Browser and OS family for one user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UaFamilies {
    pub browser_family: String,
    pub os_family: String,
}

/// User-agent knowledge base. Implementations must be usable from parser worker threads.
pub trait UaClassifier: Send + Sync {
    fn classify(&self, ua: &str) -> UaFamilies;
}

const OTHER: &str = "Other";

// First match wins, so more specific tokens come before the engines they embed.
const BROWSER_RULES: &[(&str, &str)] = &[
    (r"(?i)googlebot", "Googlebot"),
    (r"(?i)bingbot", "bingbot"),
    (r"Edg(e|A|iOS)?/", "Edge"),
    (r"OPR/|Opera", "Opera"),
    (r"SamsungBrowser/", "Samsung Internet"),
    (r"CriOS/", "Chrome Mobile iOS"),
    (r"FxiOS/", "Firefox iOS"),
    (r"Firefox/", "Firefox"),
    (r"Chrome/[\d.]+ Mobile", "Chrome Mobile"),
    (r"Chrome/", "Chrome"),
    (r"Version/[\d.]+ .*Mobile.*Safari/", "Mobile Safari"),
    (r"Safari/", "Safari"),
    (r"MSIE |Trident/", "IE"),
    (r"^curl/", "curl"),
    (r"^Wget/", "Wget"),
    (r"(?i)python-requests", "Python Requests"),
    (r"(?i)python-urllib", "Python-urllib"),
    (r"Go-http-client", "Go-http-client"),
    (r"(?i)okhttp", "okhttp"),
];

const OS_RULES: &[(&str, &str)] = &[
    (r"Windows", "Windows"),
    (r"iPhone|iPad|iPod", "iOS"),
    (r"Android", "Android"),
    (r"CrOS", "Chrome OS"),
    (r"Mac OS X|Macintosh", "Mac OS X"),
    (r"Linux", "Linux"),
];

fn compile(rules: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    rules
        .iter()
        .filter_map(|(pat, family)| Regex::new(pat).ok().map(|re| (re, *family)))
        .collect()
}

fn browser_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| compile(BROWSER_RULES))
}

fn os_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| compile(OS_RULES))
}

fn first_match(rules: &[(Regex, &'static str)], ua: &str) -> &'static str {
    rules
        .iter()
        .find(|(re, _)| re.is_match(ua))
        .map(|(_, family)| *family)
        .unwrap_or(OTHER)
}

/// Ordered regex rule table; families fall back to `Other`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleClassifier;

impl UaClassifier for RuleClassifier {
    fn classify(&self, ua: &str) -> UaFamilies {
        UaFamilies {
            browser_family: first_match(browser_rules(), ua).to_string(),
            os_family: first_match(os_rules(), ua).to_string(),
        }
    }
}
