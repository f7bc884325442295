//! Page arithmetic shared by search results.

use serde::Serialize;

pub const PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Clamps `requested_page` into `[1, total_pages]` and computes its offset.
///
/// ```
/// use lyricslib_api::pagination::calculate_pagination;
///
/// let p = calculate_pagination(45, 99);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64) -> Pagination {
    let total_pages = (total_results + PAGE_SIZE - 1) / PAGE_SIZE;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * PAGE_SIZE;

    Pagination {
        page,
        total_pages,
        offset,
    }
}

/// One page of results with its position in the full set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_pages: i64,
    pub total_results: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total_results: i64) -> Self {
        Page {
            items,
            page: pagination.page,
            total_pages: pagination.total_pages,
            total_results,
            page_size: PAGE_SIZE,
        }
    }

    pub fn empty() -> Self {
        Page::new(Vec::new(), calculate_pagination(0, 1), 0)
    }
}
