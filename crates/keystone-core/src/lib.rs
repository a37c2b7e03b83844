pub mod cli;
pub mod commands;
pub mod config;
pub mod contracts;
pub mod datetime;
pub mod listing;
pub mod pager;
pub mod render;

use std::ffi::OsString;

use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::datetime::{
  ParseKind,
  Remaining,
  local_today,
  remaining_days
};
pub use crate::pager::{
  PageItem,
  PageRange,
  PagerError,
  PaginationRequest,
  compute,
  page_range
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting keystone CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.keystonerc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let mut renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    &cfg,
    &mut renderer,
    cli.command,
    Utc::now()
  )?;

  info!("done");
  Ok(())
}
