/// Domain extraction and URL classification
///
/// Algorithm:
/// 1. Parse URL to extract hostname (lower-cased by the parser)
/// 2. IP literals pass through unchanged
/// 3. Split hostname by "."
/// 4. If the last two labels form a known two-part public suffix
///    (e.g. "co.uk"): keep the last 3 labels ("news.bbc.co.uk" → "bbc.co.uk")
/// 5. Else: keep the last 2 labels ("mail.google.com" → "google.com")
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Two-part public suffixes that count as one unit when stripping
const TWO_PART_TLDS: [&str; 10] = [
    "co.uk", "com.au", "co.nz", "co.jp", "com.br", "co.kr", "co.in", "org.uk", "net.au", "com.mx",
];

static RE_IPV4: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap());
// Simplified IPv6 check, covers the common textual forms
static RE_IPV6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{0,4}:){2,7}[0-9a-fA-F]{0,4}$").unwrap());

/// Check if a hostname is an IPv4 or IPv6 literal
pub fn is_ip_address(hostname: &str) -> bool {
    // The URL parser brackets IPv6 hosts ("[::1]")
    let bare = hostname.trim_start_matches('[').trim_end_matches(']');
    RE_IPV4.is_match(bare) || RE_IPV6.is_match(bare)
}

/// Extract the full hostname from a URL (e.g. https://mail.google.com/x → mail.google.com)
pub fn hostname_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Extract the registrable domain from a URL (e.g. mail.google.com → google.com).
/// Returns `None` for unparseable URLs; IP literals pass through unchanged.
pub fn extract_domain(url: &str) -> Option<String> {
    let hostname = hostname_of(url)?;

    if is_ip_address(&hostname) {
        return Some(hostname);
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    if parts.len() <= 2 {
        return Some(hostname);
    }

    let last_two = parts[parts.len() - 2..].join(".");
    let keep = if TWO_PART_TLDS.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    Some(parts[parts.len() - keep..].join("."))
}

/// Short display name for a domain, one label shallower than the
/// registrable domain: "google.com" → "google", "bbc.co.uk" → "bbc"
pub fn short_name(domain: &str) -> String {
    if is_ip_address(domain) {
        return domain.to_string();
    }

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return domain.to_string();
    }

    let last_two = parts[parts.len() - 2..].join(".");
    if TWO_PART_TLDS.contains(&last_two.as_str()) && parts.len() >= 3 {
        parts[..parts.len() - 2].join(".")
    } else {
        parts[..parts.len() - 1].join(".")
    }
}

/// Check if a URL should be skipped entirely (internal/blank pages)
pub fn should_ignore(url: &str) -> bool {
    url.is_empty()
        || url == "chrome://newtab/"
        || url == "about:blank"
        || url.starts_with("chrome://")
        || url.starts_with("chrome-extension://")
}
