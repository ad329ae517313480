/// Returns the authority of an absolute URL exactly as written
///
/// The authority is everything between `://` and the first `/`, `?` or `#`.
/// No normalization happens: case, ports and userinfo are kept, so two URLs
/// belong to the same crawl domain only when this text is identical.
///
/// # Examples
///
/// ```
/// use sla_crawler::url::raw_authority;
///
/// assert_eq!(raw_authority("https://example.com/path"), Some("example.com"));
/// assert_eq!(raw_authority("http://127.0.0.1:8080/"), Some("127.0.0.1:8080"));
/// assert_eq!(raw_authority("/relative"), None);
/// ```
pub fn raw_authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let authority = &rest[..end];
    (!authority.is_empty()).then_some(authority)
}

/// Removes a single trailing `/`
pub fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}
