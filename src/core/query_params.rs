use std::collections::HashMap;

use crate::config::{MAX_POSTS_PER_PAGE, POSTS_PER_PAGE};

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use devlink::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/posts?page=2&limit=10");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// assert_eq!(params.get("limit"), Some(&"10".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&').filter(|p| !p.is_empty()) {
            if let Some(eq_idx) = param.find('=') {
                let key = &param[..eq_idx];
                let encoded_value = &param[eq_idx + 1..];
                let decoded = urlencoding::decode(encoded_value)
                    .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                    .to_string();
                params.insert(key.to_string(), decoded);
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

/// Get an integer parameter with validation and default
pub fn get_int(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub limit: usize,
}

impl Page {
    /// `None` unless the caller asked for a page.
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        if !params.contains_key("page") {
            return None;
        }
        Some(Self {
            number: get_int(params, "page", 1),
            limit: get_int(params, "limit", POSTS_PER_PAGE).min(MAX_POSTS_PER_PAGE),
        })
    }

    pub fn offset(&self) -> usize {
        self.number.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values_and_flags() {
        let params = parse_query_params("/x?name=Ada%20Lovelace&all");
        assert_eq!(params["name"], "Ada Lovelace");
        assert_eq!(params["all"], "");
        assert!(parse_query_params("/x").is_empty());
    }

    #[test]
    fn page_only_when_requested() {
        assert_eq!(Page::from_params(&parse_query_params("/posts")), None);

        let page = Page::from_params(&parse_query_params("/posts?page=3")).unwrap();
        assert_eq!(page, Page { number: 3, limit: POSTS_PER_PAGE });
        assert_eq!(page.offset(), 2 * POSTS_PER_PAGE);
    }

    #[test]
    fn page_values_are_clamped() {
        let page = Page::from_params(&parse_query_params("/posts?page=0&limit=100000")).unwrap();
        assert_eq!(page.number, 1);
        assert_eq!(page.limit, MAX_POSTS_PER_PAGE);

        let page = Page::from_params(&parse_query_params("/posts?page=abc&limit=-4")).unwrap();
        assert_eq!(page, Page { number: 1, limit: POSTS_PER_PAGE });
    }
}
