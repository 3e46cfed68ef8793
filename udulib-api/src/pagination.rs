//! Pagination utilities
//!
//! Every list endpoint accepts `page` (1-indexed) and `per_page` and returns
//! a [`Page`] envelope.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Rows per page when `per_page` is not given
pub const DEFAULT_PER_PAGE: i64 = 20;

/// Largest accepted `per_page`
pub const MAX_PER_PAGE: i64 = 100;

/// Raw `page` / `per_page` query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Validated pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub per_page: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

impl PageParams {
    /// Reject out-of-range values instead of clamping them
    pub fn validate(self) -> Result<Pagination, ApiError> {
        if self.page < 1 {
            return Err(ApiError::BadRequest("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(ApiError::BadRequest(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(Pagination {
            page: self.page,
            per_page: self.per_page,
            offset: (self.page - 1) * self.per_page,
        })
    }
}

/// Number of pages needed for `total` rows
pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if per_page <= 0 {
        return 0;
    }
    (total + per_page - 1) / per_page
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages: total_pages(total, pagination.per_page),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = PageParams { page: 2, per_page: 20 }.validate().unwrap();
        assert_eq!(p.offset, 20);
        assert_eq!(total_pages(45, 20), 3);
    }

    #[test]
    fn test_pagination_first_page() {
        let p = PageParams::default().validate().unwrap();
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, DEFAULT_PER_PAGE);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty_results() {
        assert_eq!(total_pages(0, 20), 0);
        let page: Page<i64> = Page::new(vec![], 0, PageParams::default().validate().unwrap());
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_pagination_exact_multiple() {
        assert_eq!(total_pages(100, 20), 5);
        assert_eq!(total_pages(101, 20), 6);
    }

    #[test]
    fn test_pagination_rejects_out_of_range() {
        assert!(PageParams { page: 0, per_page: 20 }.validate().is_err());
        assert!(PageParams { page: 1, per_page: 0 }.validate().is_err());
        assert!(PageParams { page: 1, per_page: 101 }.validate().is_err());
        assert!(PageParams { page: 1, per_page: 100 }.validate().is_ok());
    }
}
