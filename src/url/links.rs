use crate::url::{raw_authority, strip_trailing_slash};
use scraper::{Html, Selector};
use std::collections::BTreeSet;

/// Collects anchor `href` values from a parsed document
pub fn anchor_hrefs(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// Turns raw link targets found on `origin` into same-domain absolute URLs
///
/// # Rules
///
/// - `http://` / `https://` links are kept verbatim when their authority is
///   textually identical to the origin's, dropped otherwise (a different
///   case, an explicit default port or userinfo all count as different)
/// - fragment (`#...`) and `mailto:` links are dropped
/// - anything else is path-relative: one leading `/` is stripped and the link
///   is rebuilt as `https://{origin-authority}/{path}`
///
/// Every kept link loses a single trailing `/`. The result is deduplicated
/// and sorted. An origin without an authority yields no links.
pub fn normalize_links<S: AsRef<str>>(origin: &str, hrefs: &[S]) -> Vec<String> {
    let Some(authority) = raw_authority(origin) else {
        return Vec::new();
    };

    hrefs
        .iter()
        .filter_map(|href| normalize_link(authority, href.as_ref().trim()))
        .map(|link| strip_trailing_slash(&link).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn normalize_link(authority: &str, href: &str) -> Option<String> {
    if is_absolute_http(href) {
        return (raw_authority(href) == Some(authority)).then(|| href.to_string());
    }

    if href.starts_with('#') || href.starts_with("mailto:") {
        return None;
    }

    let path = href.strip_prefix('/').unwrap_or(href);
    Some(format!("https://{}/{}", authority, path))
}

fn is_absolute_http(href: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| href.len() > scheme.len() && href.starts_with(scheme))
}
