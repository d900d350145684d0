//! One page of a pattern query

use serde::{Deserialize, Serialize};

use crate::app_errors::AppErrors;
use crate::error::{Result, StoreError};

/// One page of results plus the total match count across all pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingResult<T> {
    pub results: Vec<T>,
    /// 1-indexed page number
    pub page: usize,
    pub page_size: usize,
    /// Total number of matches, not just this page
    pub count: usize,
}

impl<T> PagingResult<T> {
    pub fn new(results: Vec<T>, page: usize, page_size: usize, count: usize) -> Self {
        Self {
            results,
            page,
            page_size,
            count,
        }
    }

    pub fn page_count(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.count.div_ceil(self.page_size)
        }
    }

    pub fn map<U, F>(self, f: F) -> PagingResult<U>
    where
        F: FnMut(T) -> U,
    {
        PagingResult {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            count: self.count,
        }
    }

    /// Window `[offset, offset + page_size)` of an ordered match list
    pub fn from_matches(matches: Vec<T>, page: usize, page_size: usize) -> Result<Self> {
        let skip = offset(page, page_size)?;
        let count = matches.len();
        let results = matches.into_iter().skip(skip).take(page_size).collect();
        Ok(Self::new(results, page, page_size, count))
    }
}

/// Number of matches before `page`. Pages and page sizes start at 1.
pub fn offset(page: usize, page_size: usize) -> Result<usize> {
    if page == 0 || page_size == 0 {
        return Err(StoreError::Validation(AppErrors::error_with_args(
            "error.paging.invalid",
            vec![page.to_string(), page_size.to_string()],
        )));
    }
    Ok((page - 1).saturating_mul(page_size))
}
