//! Pagination utilities
//!
//! List endpoints return pages of at most [`MAX_PAGE_SIZE`] rows.

use serde::Serialize;

/// Default page size when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Upper bound on requested page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Page size is clamped to `[1, MAX_PAGE_SIZE]` and the page to
/// `[1, total_pages]`.
///
/// # Examples
/// ```
/// use tpm_common::pagination::calculate_pagination;
///
/// // 250 total results at 100 per page = 3 pages
/// let p = calculate_pagination(250, 2, Some(100));
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 100);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(250, 99, Some(100));
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 200);
/// ```
pub fn calculate_pagination(
    total_results: i64,
    requested_page: i64,
    requested_page_size: Option<i64>,
) -> Pagination {
    let page_size = requested_page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}

/// One page of results plus its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, p: Pagination) -> Self {
        Self {
            items,
            total,
            page: p.page,
            page_size: p.page_size,
            total_pages: p.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2, Some(100));
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_default_page_size() {
        let p = calculate_pagination(120, 1, None);
        assert_eq!(p.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn test_pagination_page_size_clamped() {
        let p = calculate_pagination(1000, 1, Some(5000));
        assert_eq!(p.page_size, MAX_PAGE_SIZE);

        let p = calculate_pagination(10, 1, Some(0));
        assert_eq!(p.page_size, 1);
        assert_eq!(p.total_pages, 10);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(150, 99, Some(100));
        assert_eq!(p.page, 2); // Clamped to last page
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, 0, Some(100));
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1, None);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }
}
