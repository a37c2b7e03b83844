use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "keystone",
    version,
    about = "Keystone: pager ranges and contract date checks for the property portal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "keystonerc")]
    pub keystonerc: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the pager labels for a page count.
    Pages {
        #[arg(long, allow_negative_numbers = true)]
        total: i64,

        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        current: i64,

        /// Defaults to `pager.siblings`.
        #[arg(long, allow_negative_numbers = true)]
        siblings: Option<i64>,
    },

    /// Days from today until a date.
    Remaining {
        date: String,

        #[arg(long, default_value = "today", allow_hyphen_values = true)]
        today: String,
    },

    /// Search, count and page a contract feed.
    List {
        file: PathBuf,

        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        page: i64,

        /// Defaults to `list.page_size`.
        #[arg(long)]
        page_size: Option<usize>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        search: Option<String>,
    },

    /// Summarise expiring contracts and due inspections.
    Contracts {
        file: PathBuf,

        #[arg(long, default_value = "today", allow_hyphen_values = true)]
        today: String,
    },

    /// Show the effective configuration.
    Config,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` / `rc.KEY:VALUE` tokens out before clap
/// sees the arguments.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_tokens_become_overrides() {
        let pre = preprocess_args(&os(&[
            "keystone",
            "rc.pager.siblings=2",
            "pages",
            "rc.color:off",
            "--total",
            "10",
        ]))
        .unwrap();

        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.pager.siblings".to_string(), "2".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
        assert_eq!(pre.cleaned_args, os(&["keystone", "pages", "--total", "10"]));
    }

    #[test]
    fn parses_pages_subcommand_with_negative_values() {
        let cli = GlobalCli::try_parse_from(os(&[
            "keystone", "-vv", "pages", "--total", "-3", "--current", "2",
        ]))
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Command::Pages {
                total: -3,
                current: 2,
                siblings: None
            }
        );
    }

    #[test]
    fn parses_rc_flag_and_relative_today() {
        let cli = GlobalCli::try_parse_from(os(&[
            "keystone",
            "--rc",
            "timezone=Asia/Tokyo",
            "remaining",
            "2025-06-15",
            "--today",
            "-2d",
        ]))
        .unwrap();
        assert_eq!(cli.rc_overrides[0].key, "timezone");
        assert_eq!(cli.rc_overrides[0].value, "Asia/Tokyo");
        assert_eq!(
            cli.command,
            Command::Remaining {
                date: "2025-06-15".to_string(),
                today: "-2d".to_string()
            }
        );
    }

    #[test]
    fn key_val_requires_equals() {
        assert!("color".parse::<KeyVal>().is_err());
    }
}
