//! Fixed-size page envelope for plain list endpoints

use serde::{Deserialize, Serialize};

/// Page size constant for all list endpoints
pub const PAGE_SIZE: i64 = 100;

/// `?page=` query parameter
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { page: 1 }
    }
}

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// The page is clamped into `[1, total_pages]`.
///
/// # Examples
/// ```
/// use bb_server::pagination::calculate_pagination;
///
/// // 250 total results = 3 pages (100 + 100 + 50)
/// let p = calculate_pagination(250, 2);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 100);
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

/// One page of a list response
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: i64, pagination: Pagination, results: Vec<T>) -> Self {
        Self {
            count,
            page: pagination.page,
            page_size: PAGE_SIZE,
            total_pages: pagination.total_pages,
            results,
        }
    }
}
