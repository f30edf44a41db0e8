//! Request DTOs for the CDN API
//!
//! Defines path parameters, query strings and JSON bodies.

use serde::Deserialize;

/// Default page size for listings
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page size the backend accepts
pub const MAX_PAGE_SIZE: u32 = 1000;

/// `:fileId` path parameter. Extra segments such as `:filename` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct FileIdPath {
    #[serde(rename = "fileId")]
    pub file_id: String,
}

/// Query string of GET /api/files
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

impl ListQuery {
    /// Returns the page size to request, or an error message when out of range.
    pub fn validated_page_size(&self) -> Result<u32, String> {
        match self.page_size {
            None => Ok(DEFAULT_PAGE_SIZE),
            Some(size) if (1..=MAX_PAGE_SIZE).contains(&size) => Ok(size),
            Some(_) => Err(format!("pageSize must be between 1 and {}", MAX_PAGE_SIZE)),
        }
    }

    /// Page token, with an empty value treated as absent.
    pub fn page_token(&self) -> Option<&str> {
        self.page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Query string of GET /api/files/search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

impl SearchQuery {
    /// The trimmed search term, if one was given.
    pub fn term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Body of POST /api/cache/clear
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ClearCacheRequest {
    /// The pattern to match, with an empty string meaning "everything".
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref().filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query = ListQuery::default();
        assert_eq!(query.validated_page_size(), Ok(DEFAULT_PAGE_SIZE));
        assert!(query.page_token().is_none());
    }

    #[test]
    fn test_list_query_bounds() {
        let query = ListQuery {
            page_size: Some(0),
            page_token: Some(String::new()),
        };
        assert!(query.validated_page_size().is_err());
        assert!(query.page_token().is_none());

        let query = ListQuery {
            page_size: Some(MAX_PAGE_SIZE),
            page_token: None,
        };
        assert_eq!(query.validated_page_size(), Ok(MAX_PAGE_SIZE));
    }

    #[test]
    fn test_list_query_deserialize() {
        let query: ListQuery = serde_json::from_str(r#"{"pageSize": 10, "pageToken": "t"}"#).unwrap();
        assert_eq!(query.page_size, Some(10));
        assert_eq!(query.page_token(), Some("t"));
    }

    #[test]
    fn test_search_term() {
        assert_eq!(SearchQuery { q: Some("  cat ".into()) }.term(), Some("cat"));
        assert_eq!(SearchQuery { q: Some("   ".into()) }.term(), None);
        assert_eq!(SearchQuery::default().term(), None);
    }

    #[test]
    fn test_clear_cache_pattern() {
        let req: ClearCacheRequest = serde_json::from_str(r#"{"pattern": "abc"}"#).unwrap();
        assert_eq!(req.pattern(), Some("abc"));

        let req: ClearCacheRequest = serde_json::from_str(r#"{"pattern": ""}"#).unwrap();
        assert_eq!(req.pattern(), None);

        let req: ClearCacheRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.pattern(), None);
    }
}
