//! Page-label sequences for pager controls.
//!
//! Pages are 1-indexed everywhere in this module. A range is a list of
//! [`PageItem`]s where [`PageItem::Ellipsis`] marks a run of hidden pages.

use std::fmt;

use thiserror::Error;
use tracing::trace;

pub const DEFAULT_SIBLING_COUNT: usize = 1;

/// First page, last page, current page and the two ellipsis slots.
const FIXED_SLOTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PagerError {
    #[error("invalid argument {name}: {value}")]
    InvalidArgument { name: &'static str, value: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationRequest {
    pub total_pages: usize,
    pub current_page: i64,
    pub sibling_count: usize,
}

impl PaginationRequest {
    /// Validates raw caller input.
    ///
    /// Negative (or absurdly large) page totals and sibling counts are caller
    /// bugs and are rejected. A `current_page` below 1 is accepted and yields
    /// an empty range from [`compute`].
    pub fn new(
        total_pages: i64,
        current_page: i64,
        sibling_count: i64,
    ) -> Result<Self, PagerError> {
        Ok(Self {
            total_pages: checked_count("total_pages", total_pages)?,
            current_page,
            sibling_count: checked_count("sibling_count", sibling_count)?,
        })
    }
}

fn checked_count(name: &'static str, value: i64) -> Result<usize, PagerError> {
    u32::try_from(value)
        .ok()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or(PagerError::InvalidArgument { name, value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageItem {
    Page(usize),
    Ellipsis,
}

impl fmt::Display for PageItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageItem::Page(n) => write!(f, "{n}"),
            PageItem::Ellipsis => f.write_str("…"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRange(Vec<PageItem>);

impl PageRange {
    fn full(total_pages: usize) -> Self {
        Self((1..=total_pages).map(PageItem::Page).collect())
    }

    pub fn items(&self) -> &[PageItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A single page (or nothing) needs no pager.
    pub fn is_renderable(&self) -> bool {
        self.0.len() >= 2
    }

    pub fn is_truncated(&self) -> bool {
        self.0.contains(&PageItem::Ellipsis)
    }

    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().filter_map(|item| match item {
            PageItem::Page(n) => Some(*n),
            PageItem::Ellipsis => None,
        })
    }
}

impl IntoIterator for PageRange {
    type Item = PageItem;
    type IntoIter = std::vec::IntoIter<PageItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

/// Convenience wrapper around [`PaginationRequest::new`] and [`compute`].
pub fn page_range(
    total_pages: i64,
    current_page: i64,
    sibling_count: i64,
) -> Result<PageRange, PagerError> {
    let req = PaginationRequest::new(total_pages, current_page, sibling_count)?;
    Ok(compute(&req))
}

#[tracing::instrument(level = "trace")]
pub fn compute(req: &PaginationRequest) -> PageRange {
    let total = req.total_pages;
    let siblings = req.sibling_count;

    if total == 0 || req.current_page < 1 {
        return PageRange::default();
    }

    if siblings.saturating_add(FIXED_SLOTS) >= total {
        return PageRange::full(total);
    }

    let current = usize::try_from(req.current_page).unwrap_or(usize::MAX);
    let left = current.saturating_sub(siblings).max(1);
    let right = current.saturating_add(siblings).min(total);

    let show_left_dots = left > 2;
    let show_right_dots = right < total - 1;

    // Pages shown at an edge when only one side is truncated.
    let edge_window = siblings.saturating_mul(2).saturating_add(3);

    trace!(
        left,
        right,
        show_left_dots,
        show_right_dots,
        edge_window,
        "computed sibling window"
    );

    let items = match (show_left_dots, show_right_dots) {
        (false, false) => return PageRange::full(total),
        (false, true) => {
            if edge_window >= total - 1 {
                return PageRange::full(total);
            }
            let mut items: Vec<PageItem> = (1..=edge_window).map(PageItem::Page).collect();
            items.push(PageItem::Ellipsis);
            items.push(PageItem::Page(total));
            items
        }
        (true, false) => {
            if edge_window >= total - 1 {
                return PageRange::full(total);
            }
            let mut items = vec![PageItem::Page(1), PageItem::Ellipsis];
            items.extend((total - edge_window + 1..=total).map(PageItem::Page));
            items
        }
        (true, true) => {
            let mut items = vec![PageItem::Page(1), PageItem::Ellipsis];
            items.extend((left..=right).map(PageItem::Page));
            items.push(PageItem::Ellipsis);
            items.push(PageItem::Page(total));
            items
        }
    };

    PageRange(items)
}
