//! Offset pagination shared by the server and the REST client.

use serde::{Deserialize, Serialize};

/// One page of results plus the numbers a client needs to render pagers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: i64,
    /// Requested page size.
    pub per_page: i64,
    /// Total matching items across all pages.
    pub total: i64,
    /// Number of pages (zero when there are no items).
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// Builds a page from a slice of results and the total count.
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + request.per_page - 1) / request.per_page
        };
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages,
        }
    }
}

/// Normalised page number and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: i64,
    /// Items per page.
    pub per_page: i64,
}

impl PageRequest {
    /// Clamps client input: pages start at 1, sizes fall in `1..=max`.
    pub fn resolve(page: Option<i64>, per_page: Option<i64>, default: i64, max: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default).clamp(1, max.max(1)),
        }
    }

    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}
