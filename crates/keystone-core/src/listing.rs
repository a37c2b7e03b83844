//! Client-side list handling: the whole collection is fetched once, then
//! searched, counted per status and sliced into pages here.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::pager::{PageRange, PaginationRequest, compute};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Status filter value that selects every row.
pub const ALL_STATUSES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("page size must be at least 1")]
    InvalidPageSize,
}

/// A row that list pages can search and group by status.
pub trait Listable {
    fn status_key(&self) -> String;

    /// Fields searched by free-text queries.
    fn search_fields(&self) -> Vec<&str>;

    fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSlice<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> PageSlice<T> {
    pub fn pager(&self, sibling_count: usize) -> PageRange {
        compute(&PaginationRequest {
            total_pages: self.total_pages,
            current_page: i64::try_from(self.page).unwrap_or(i64::MAX),
            sibling_count,
        })
    }

    /// 1-based inclusive positions of the rows on this page.
    pub fn shown_range(&self) -> Option<(usize, usize)> {
        if self.items.is_empty() {
            return None;
        }
        let start = (self.page - 1) * self.page_size + 1;
        Some((start, start + self.items.len() - 1))
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub all: usize,
    pub by_status: BTreeMap<String, usize>,
}

impl StatusCounts {
    pub fn get(&self, status: &str) -> usize {
        if status.eq_ignore_ascii_case(ALL_STATUSES) {
            return self.all;
        }
        self.by_status
            .get(&status.to_ascii_lowercase())
            .copied()
            .unwrap_or(0)
    }
}

pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

pub fn filter_items<T, F>(items: &[T], predicate: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    items.iter().filter(|item| predicate(*item)).cloned().collect()
}

pub fn status_counts<T, F>(items: &[T], status_of: F) -> StatusCounts
where
    F: Fn(&T) -> String,
{
    let mut counts = StatusCounts {
        all: items.len(),
        by_status: BTreeMap::new(),
    };
    for item in items {
        *counts
            .by_status
            .entry(status_of(item).to_ascii_lowercase())
            .or_insert(0) += 1;
    }
    counts
}

/// Slices out one page, clamping `page` into `[1, max(total_pages, 1)]`.
#[tracing::instrument(level = "debug", skip(items), fields(total_items = items.len()))]
pub fn paginate<T: Clone>(
    items: &[T],
    page: i64,
    page_size: usize,
) -> Result<PageSlice<T>, ListingError> {
    if page_size == 0 {
        return Err(ListingError::InvalidPageSize);
    }

    let total_items = items.len();
    let total_pages = total_pages(total_items, page_size);
    let last_page = total_pages.max(1);
    let page = usize::try_from(page.max(1))
        .unwrap_or(usize::MAX)
        .min(last_page);

    let start = (page - 1).saturating_mul(page_size).min(total_items);
    let end = start.saturating_add(page_size).min(total_items);

    debug!(page, total_pages, start, end, "sliced page");

    Ok(PageSlice {
        items: items[start..end].to_vec(),
        page,
        page_size,
        total_items,
        total_pages,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: i64,
    pub page_size: usize,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            status: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView<T> {
    /// Counts over the searched rows, before the status filter.
    pub counts: StatusCounts,
    pub page: PageSlice<T>,
}

impl ListQuery {
    #[tracing::instrument(skip(self, items), fields(page = self.page, status = ?self.status))]
    pub fn apply<T>(&self, items: &[T]) -> Result<ListView<T>, ListingError>
    where
        T: Listable + Clone,
    {
        let searched = match self.search.as_deref() {
            Some(needle) => filter_items(items, |item| item.matches_search(needle)),
            None => items.to_vec(),
        };
        let counts = status_counts(&searched, |item: &T| item.status_key());

        let selected = match self.status.as_deref() {
            Some(status) if !status.eq_ignore_ascii_case(ALL_STATUSES) => {
                filter_items(&searched, |item| item.status_key().eq_ignore_ascii_case(status))
            }
            _ => searched,
        };

        debug!(
            fetched = items.len(),
            selected = selected.len(),
            "applied list query"
        );

        Ok(ListView {
            counts,
            page: paginate(&selected, self.page, self.page_size)?,
        })
    }
}
