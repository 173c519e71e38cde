//! List query state and its two serializations: URL query parameters for
//! `GET /notes` and the cache key used by the store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default page size for list queries.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// How a list view lays out its notes. Presentational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

/// Query state owned by a list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteQuery {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    /// Free-text search. Blank means no search.
    pub search: String,
    pub favorites_only: bool,
    /// Tag id filter.
    pub tag: Option<String>,
    pub view_mode: ViewMode,
}

impl Default for NoteQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: String::new(),
            favorites_only: false,
            tag: None,
            view_mode: ViewMode::List,
        }
    }
}

impl NoteQuery {
    /// Trimmed search text, or `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        let term = self.search.trim();
        (!term.is_empty()).then_some(term)
    }

    /// Query parameters for `GET /notes`. Absent filters are omitted.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.max(1).to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        if let Some(term) = self.search_term() {
            params.push(("search", term.to_string()));
        }
        if self.favorites_only {
            params.push(("favorite", "true".to_string()));
        }
        if let Some(tag) = self.tag.as_deref().filter(|t| !t.is_empty()) {
            params.push(("tag", tag.to_string()));
        }
        params
    }

    /// Serialized cache key for this query.
    ///
    /// Built from the same parameters sent to the server, so two queries
    /// share a cache entry exactly when they would return the same page.
    pub fn cache_key(&self) -> ListKey {
        let key = self
            .to_params()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        ListKey(key)
    }
}

/// Cache key of a list entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListKey(String);

impl ListKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_sends_only_paging() {
        let params = NoteQuery::default().to_params();
        assert_eq!(
            params,
            vec![("page", "1".to_string()), ("pageSize", "20".to_string())]
        );
    }

    #[test]
    fn filters_are_serialized_when_present() {
        let query = NoteQuery {
            page: 3,
            page_size: 10,
            search: "  groceries ".into(),
            favorites_only: true,
            tag: Some("t-9".into()),
            view_mode: ViewMode::Grid,
        };
        let params = query.to_params();
        assert!(params.contains(&("search", "groceries".to_string())));
        assert!(params.contains(&("favorite", "true".to_string())));
        assert!(params.contains(&("tag", "t-9".to_string())));
        assert!(params.contains(&("page", "3".to_string())));
    }

    #[test]
    fn blank_search_is_omitted() {
        let query = NoteQuery {
            search: "   ".into(),
            ..Default::default()
        };
        assert!(query.to_params().iter().all(|(k, _)| *k != "search"));
    }

    #[test]
    fn view_mode_does_not_split_cache() {
        let list = NoteQuery::default();
        let grid = NoteQuery {
            view_mode: ViewMode::Grid,
            ..Default::default()
        };
        assert_eq!(list.cache_key(), grid.cache_key());
    }

    #[test]
    fn different_pages_have_different_keys() {
        let first = NoteQuery::default();
        let second = NoteQuery {
            page: 2,
            ..Default::default()
        };
        assert_ne!(first.cache_key(), second.cache_key());
        assert_eq!(first.cache_key().as_str(), "page=1&pageSize=20");
    }
}
