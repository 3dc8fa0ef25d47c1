//! Pagination and sorting
//!
//! Sort fields are closed enums: a store only ever orders by a column name
//! taken from `SortKey::column`, never by caller-supplied text.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::LedgerError;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A whitelisted, sortable field of one entity
pub trait SortKey: Copy + Default + Send + Sync + FromStr<Err = LedgerError> {
    fn column(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown sort order: {}",
                other
            ))),
        }
    }
}

/// Page request, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<K> {
    pub page: u32,
    pub limit: u32,
    pub sort: K,
    pub order: SortOrder,
}

impl<K: SortKey> Default for PageRequest<K> {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort: K::default(),
            order: SortOrder::default(),
        }
    }
}

impl<K: SortKey> PageRequest<K> {
    /// Build from loosely-typed query parameters.
    ///
    /// Missing or zero page/limit fall back to defaults, limit is capped, an
    /// unknown sort field or order is rejected.
    pub fn parse(
        page: Option<u32>,
        limit: Option<u32>,
        sort: Option<&str>,
        order: Option<&str>,
    ) -> Result<Self, LedgerError> {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);
        let sort = match sort.filter(|s| !s.is_empty()) {
            Some(s) => s.parse()?,
            None => K::default(),
        };
        let order = match order.filter(|o| !o.is_empty()) {
            Some(o) => o.parse()?,
            None => SortOrder::default(),
        };
        Ok(Self {
            page,
            limit,
            sort,
            order,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One page of records plus the unpaginated total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Slice an already filtered and sorted set
    pub fn from_sorted<K: SortKey>(all: Vec<T>, request: &PageRequest<K>) -> Self {
        let total = all.len() as u64;
        let records = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.limit as usize)
            .collect();
        Self {
            records,
            total,
            page: request.page,
            limit: request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionSort;

    #[test]
    fn test_defaults() {
        let request = PageRequest::<TransactionSort>::parse(None, Some(0), None, None).unwrap();
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(request.sort, TransactionSort::CreatedAt);
        assert_eq!(request.order, SortOrder::Desc);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_limit_capped_and_offset() {
        let request =
            PageRequest::<TransactionSort>::parse(Some(3), Some(500), None, Some("asc")).unwrap();
        assert_eq!(request.limit, MAX_PAGE_LIMIT);
        assert_eq!(request.offset(), 200);
        assert_eq!(request.order, SortOrder::Asc);
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let result = PageRequest::<TransactionSort>::parse(
            None,
            None,
            Some("amount; DROP TABLE wallets"),
            None,
        );
        assert!(matches!(result, Err(LedgerError::InvalidRequest(_))));
    }

    #[test]
    fn test_page_from_sorted() {
        let request = PageRequest::<TransactionSort>::parse(Some(2), Some(2), None, None).unwrap();
        let page = Page::from_sorted(vec![1, 2, 3, 4, 5], &request);
        assert_eq!(page.records, vec![3, 4]);
        assert_eq!(page.total, 5);
    }
}
