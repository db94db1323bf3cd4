use serde::{Deserialize, Serialize};

/// A page request: how many items, and where to resume from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Requested page size. The store never returns more than this many items.
    pub first: u32,
    /// Opaque cursor produced by a previous call. `None` starts from the top.
    pub cursor: Option<String>,
}

impl Pagination {
    /// Creates a page request for the first page.
    pub fn first(first: u32) -> Self {
        Self {
            first,
            cursor: None,
        }
    }

    /// Creates a page request resuming from the given cursor.
    pub fn after(first: u32, cursor: impl Into<String>) -> Self {
        Self {
            first,
            cursor: Some(cursor.into()),
        }
    }
}

/// Filters for thread listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadFilter {
    /// Scope the listing to one user's threads.
    pub user_id: Option<String>,
    /// Substring match on the thread name, applied server-side within the
    /// already-limited key range. May shrink the page below the requested size.
    pub search: Option<String>,
}

/// Cursor bookkeeping for a returned page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// A page of results plus the cursor state needed to fetch the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub page_info: PageInfo,
    pub data: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    /// Creates an empty response with no further pages.
    pub fn empty() -> Self {
        Self {
            page_info: PageInfo::default(),
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_first() {
        let page = Pagination::first(5);
        assert_eq!(page.first, 5);
        assert!(page.cursor.is_none());
    }

    #[test]
    fn test_pagination_after() {
        let page = Pagination::after(10, "abc");
        assert_eq!(page.first, 10);
        assert_eq!(page.cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_empty_response() {
        let response: PaginatedResponse<String> = PaginatedResponse::empty();
        assert!(response.data.is_empty());
        assert!(!response.page_info.has_next_page);
        assert!(response.page_info.end_cursor.is_none());
    }
}
