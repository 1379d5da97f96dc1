//! Request-to-logical-key normalization.

use url::Url;

use crate::manifest::ROOT_KEY;

/// Cache-busting query prefix stripped from logical keys.
const VERSION_SUFFIX: &str = "?v=";

/// Derive the logical cache key for a URL relative to an origin.
///
/// Returns `None` for URLs outside the origin. The key is the path (plus any
/// query) with the leading slash removed; a `?v=...` cache-busting suffix is
/// dropped. The bare origin, an in-page fragment navigation and an empty key
/// all normalize to [`ROOT_KEY`].
pub fn logical_key(origin: &Url, url: &Url) -> Option<String> {
    if url.origin() != origin.origin() {
        return None;
    }

    let path = url.path();
    let mut key = path.strip_prefix('/').unwrap_or(path).to_string();
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    if let Some(idx) = key.find(VERSION_SUFFIX) {
        key.truncate(idx);
    }

    if key.is_empty() {
        return Some(ROOT_KEY.to_string());
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://app.example").unwrap()
    }

    fn key(url: &str) -> Option<String> {
        logical_key(&origin(), &Url::parse(url).unwrap())
    }

    #[test]
    fn test_plain_asset_path() {
        assert_eq!(key("https://app.example/main.js"), Some("main.js".into()));
        assert_eq!(
            key("https://app.example/assets/images/x.png"),
            Some("assets/images/x.png".into())
        );
    }

    #[test]
    fn test_root_forms_normalize_to_sentinel() {
        assert_eq!(key("https://app.example"), Some(ROOT_KEY.into()));
        assert_eq!(key("https://app.example/"), Some(ROOT_KEY.into()));
        assert_eq!(key("https://app.example/#menu"), Some(ROOT_KEY.into()));
        assert_eq!(key("https://app.example/?v=123"), Some(ROOT_KEY.into()));
    }

    #[test]
    fn test_version_suffix_is_stripped() {
        assert_eq!(
            key("https://app.example/boot.js?v=83d881c1"),
            Some("boot.js".into())
        );
    }

    #[test]
    fn test_other_queries_stay_in_the_key() {
        assert_eq!(
            key("https://app.example/api/data?page=2"),
            Some("api/data?page=2".into())
        );
    }

    #[test]
    fn test_fragment_is_ignored_on_assets() {
        assert_eq!(
            key("https://app.example/docs/page.html#top"),
            Some("docs/page.html".into())
        );
    }

    #[test]
    fn test_foreign_origin_is_not_ours() {
        assert_eq!(key("https://cdn.example/main.js"), None);
        assert_eq!(key("http://app.example/main.js"), None);
    }
}
