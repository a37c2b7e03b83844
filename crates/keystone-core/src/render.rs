use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::contracts::{Contract, ContractReview, ContractSummary};
use crate::datetime::Remaining;
use crate::listing::ListView;
use crate::pager::{PageItem, PageRange};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, range))]
    pub fn print_pager(&mut self, range: &PageRange, current: usize) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if !range.is_renderable() {
            writeln!(out, "(no pager)")?;
            return Ok(());
        }
        let line = pager_line(range, current);
        writeln!(out, "{}", self.paint_current(&line, current))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn print_remaining(
        &mut self,
        input: &str,
        remaining: Option<Remaining>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match remaining {
            Some(r) => {
                let days = describe_days(r.days);
                let days = if r.is_past() { self.paint(&days, "31") } else { days };
                writeln!(out, "{input}: {days} ({})", r.kind)?;
            }
            None => writeln!(out, "{input}: unknown")?,
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_contract_list(
        &mut self,
        view: &ListView<Contract>,
        pager: &PageRange,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let mut counts = vec![format!("all {}", view.counts.all)];
        counts.extend(
            view.counts
                .by_status
                .iter()
                .map(|(status, count)| format!("{status} {count}")),
        );
        writeln!(out, "{}", counts.join(" | "))?;

        let headers = vec![
            "ID".to_string(),
            "Unit".to_string(),
            "Tenant".to_string(),
            "Status".to_string(),
            "Ends".to_string(),
        ];
        let rows = view
            .page
            .items
            .iter()
            .map(|contract| {
                vec![
                    self.paint(&contract.id, "33"),
                    contract.unit.clone().unwrap_or_default(),
                    contract.tenant.clone().unwrap_or_default(),
                    contract.status.to_string(),
                    contract.end_date.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;

        match view.page.shown_range() {
            Some((start, end)) => writeln!(
                out,
                "Showing {start}-{end} of {} (page {} of {})",
                view.page.total_items, view.page.page, view.page.total_pages
            )?,
            None => writeln!(out, "No contracts found.")?,
        }

        if pager.is_renderable() {
            let line = pager_line(pager, view.page.page);
            writeln!(out, "{}", self.paint_current(&line, view.page.page))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_contract_review(
        &mut self,
        summary: &ContractSummary,
        contracts: &[Contract],
        reviews: &[ContractReview],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "total              {}", summary.total)?;
        writeln!(out, "active             {}", summary.active)?;
        writeln!(out, "expiring soon      {}", summary.expiring_soon)?;
        writeln!(out, "needing inspection {}", summary.needing_inspection)?;
        writeln!(out, "expired            {}", summary.expired)?;
        writeln!(out, "unknown expiry     {}", summary.unknown_expiry)?;
        if summary.fallback_parsed > 0 {
            writeln!(out, "loosely parsed     {}", summary.fallback_parsed)?;
        }

        let flagged: Vec<_> = contracts
            .iter()
            .zip(reviews)
            .filter(|(_, review)| review.flags.any_attention())
            .collect();
        if flagged.is_empty() {
            return Ok(());
        }

        writeln!(out)?;
        let headers = vec![
            "ID".to_string(),
            "Unit".to_string(),
            "Ends in".to_string(),
            "Inspection in".to_string(),
            "Attention".to_string(),
        ];
        let rows = flagged
            .into_iter()
            .map(|(contract, review)| {
                let mut attention = Vec::new();
                if review.flags.expired {
                    attention.push(self.paint("expired", "31"));
                }
                if review.flags.expiring_soon {
                    attention.push(self.paint("expiring", "33"));
                }
                if review.flags.needs_inspection {
                    attention.push("inspection".to_string());
                }
                vec![
                    self.paint(&contract.id, "33"),
                    contract.unit.clone().unwrap_or_default(),
                    review.end.map(|r| describe_days(r.days)).unwrap_or_default(),
                    review
                        .inspection
                        .map(|r| describe_days(r.days))
                        .unwrap_or_default(),
                    attention.join(" "),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_config(&mut self, cfg: &Config) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let mut entries: Vec<_> = cfg.iter().collect();
        entries.sort();
        let rows = entries
            .into_iter()
            .map(|(k, v)| vec![k.clone(), v.clone()])
            .collect();
        write_table(&mut out, vec!["Key".to_string(), "Value".to_string()], rows)?;
        for file in &cfg.loaded_files {
            writeln!(out, "loaded {}", file.display())?;
        }
        writeln!(out, "timezone {}", cfg.timezone().name())?;
        Ok(())
    }

    fn paint_current(&self, line: &str, current: usize) -> String {
        let marker = format!("[{current}]");
        line.replacen(&marker, &self.paint(&marker, "33"), 1)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Pager labels with the current page bracketed, e.g. `1 … 4 [5] 6 … 10`.
pub fn pager_line(range: &PageRange, current: usize) -> String {
    range
        .items()
        .iter()
        .map(|item| match item {
            PageItem::Page(n) if *n == current => format!("[{n}]"),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_days(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "in 1 day".to_string(),
        -1 => "1 day ago".to_string(),
        d if d > 0 => format!("in {d} days"),
        d => format!("{} days ago", d.unsigned_abs()),
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::page_range;

    #[test]
    fn pager_line_brackets_current_page() {
        let range = page_range(10, 5, 1).unwrap();
        assert_eq!(pager_line(&range, 5), "1 … 4 [5] 6 … 10");
    }

    #[test]
    fn describes_day_offsets() {
        assert_eq!(describe_days(0), "today");
        assert_eq!(describe_days(3), "in 3 days");
        assert_eq!(describe_days(-1), "1 day ago");
        assert_eq!(describe_days(-12), "12 days ago");
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Unit".to_string()],
            vec![
                vec!["\x1b[33mc-1\x1b[0m".to_string(), "A-101".to_string()],
                vec!["c-22".to_string(), "B".to_string()],
            ],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID   Unit  ");
        assert_eq!(lines[1], "---- ----- ");
        assert_eq!(strip_ansi(lines[2]), "c-1  A-101 ");
        assert_eq!(lines[3], "c-22 B     ");
    }

    #[test]
    fn rejects_unknown_color_setting() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "sometimes".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }
}
