// src/utils/mod.rs

//! Small shared helpers.

/// Collapse all whitespace runs into single spaces and trim.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Like [`normalize_ws`] but returns `None` for empty results.
pub fn normalize_ws_opt(text: &str) -> Option<String> {
    let cleaned = normalize_ws(text);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Reduce an identifier to a filesystem-safe slug.
///
/// DOIs contain `/` and PIIs contain parentheses; both are replaced by `_`.
pub fn sanitize_slug(value: &str) -> String {
    let slug: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches(|c| c == '.' || c == '_');
    slug.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws("  a \n b\t c  "), "a b c");
        assert_eq!(normalize_ws(""), "");
    }

    #[test]
    fn test_normalize_ws_opt_empty() {
        assert_eq!(normalize_ws_opt("  \n "), None);
        assert_eq!(normalize_ws_opt(" x "), Some("x".to_string()));
    }

    #[test]
    fn test_sanitize_slug() {
        assert_eq!(sanitize_slug("10.1016/j.neuroimage.2020.1"), "10.1016_j.neuroimage.2020.1");
        assert_eq!(sanitize_slug("S0896-6273(20)30123-4"), "S0896-6273_20_30123-4");
    }
}
