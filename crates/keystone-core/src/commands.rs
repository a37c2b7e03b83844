use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::config::Config;
use crate::contracts::{ContractSummary, ReviewPolicy, load_contracts, review_all};
use crate::datetime::{parse_today_expr, remaining_days};
use crate::listing::{DEFAULT_PAGE_SIZE, ListQuery};
use crate::pager::{DEFAULT_SIBLING_COUNT, page_range};
use crate::render::Renderer;

#[instrument(skip(cfg, renderer, command))]
pub fn dispatch(
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Pages {
            total,
            current,
            siblings,
        } => cmd_pages(cfg, renderer, total, current, siblings),
        Command::Remaining { date, today } => cmd_remaining(cfg, renderer, &date, &today, now),
        Command::List {
            file,
            page,
            page_size,
            status,
            search,
        } => {
            let query = ListQuery {
                page,
                page_size: match page_size {
                    Some(size) => size,
                    None => cfg
                        .get_parsed("list.page_size")?
                        .unwrap_or(DEFAULT_PAGE_SIZE),
                },
                status,
                search,
            };
            cmd_list(cfg, renderer, &file, &query)
        }
        Command::Contracts { file, today } => cmd_contracts(cfg, renderer, &file, &today, now),
        Command::Config => renderer.print_config(cfg),
    }
}

#[instrument(skip(cfg, renderer))]
fn cmd_pages(
    cfg: &Config,
    renderer: &mut Renderer,
    total: i64,
    current: i64,
    siblings: Option<i64>,
) -> anyhow::Result<()> {
    let siblings = match siblings {
        Some(value) => value,
        None => cfg
            .get_parsed("pager.siblings")?
            .unwrap_or(DEFAULT_SIBLING_COUNT as i64),
    };

    let range = page_range(total, current, siblings).context("invalid pager request")?;
    info!(items = range.len(), truncated = range.is_truncated(), "computed page range");

    renderer.print_pager(&range, highlighted_page(total, current))
}

/// Page to bracket in the pager line; a current page past the end marks the last page.
fn highlighted_page(total: i64, current: i64) -> usize {
    usize::try_from(current.min(total)).unwrap_or(0)
}

#[instrument(skip(cfg, renderer, now))]
fn cmd_remaining(
    cfg: &Config,
    renderer: &mut Renderer,
    date: &str,
    today_expr: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let zone = cfg.timezone();
    let today = parse_today_expr(today_expr, now, &zone)?;
    let remaining = remaining_days(date, today, &zone);
    debug!(%today, ?remaining, "computed remaining days");
    renderer.print_remaining(date, remaining)
}

#[instrument(skip(cfg, renderer))]
fn cmd_list(
    cfg: &Config,
    renderer: &mut Renderer,
    file: &Path,
    query: &ListQuery,
) -> anyhow::Result<()> {
    let contracts = load_contracts(file)?;
    let view = query.apply(&contracts).context("invalid list query")?;

    let siblings = cfg
        .get_parsed::<usize>("pager.siblings")?
        .unwrap_or(DEFAULT_SIBLING_COUNT);
    let pager = view.page.pager(siblings);

    renderer.print_contract_list(&view, &pager)
}

#[instrument(skip(cfg, renderer, now))]
fn cmd_contracts(
    cfg: &Config,
    renderer: &mut Renderer,
    file: &Path,
    today_expr: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let zone = cfg.timezone();
    let today = parse_today_expr(today_expr, now, &zone)?;
    let policy = ReviewPolicy::from_config(cfg)?;

    let contracts = load_contracts(file)?;
    let reviews = review_all(&contracts, today, &zone, &policy);
    let summary = ContractSummary::from_reviews(&reviews);
    info!(?summary, %today, "reviewed contracts");

    renderer.print_contract_review(&summary, &contracts, &reviews)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::pager_line;

    #[test]
    fn current_past_the_end_highlights_last_page() {
        let range = page_range(10, 25, 1).unwrap();
        assert_eq!(highlighted_page(10, 25), 10);
        assert_eq!(pager_line(&range, highlighted_page(10, 25)), "1 … 6 7 8 9 [10]");
    }

    #[test]
    fn non_positive_current_highlights_nothing() {
        assert_eq!(highlighted_page(10, 4), 4);
        assert_eq!(highlighted_page(10, 0), 0);
        assert_eq!(highlighted_page(10, -3), 0);
    }
}
