use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};

const TIMEZONE_CONFIG_FILE: &str =
  "keystone-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "KEYSTONE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "KEYSTONE_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "UTC";

/// Date-only inputs are pinned to this
/// UTC hour before their calendar fields
/// are read back.
const DATE_ONLY_ANCHOR_HOUR: u32 = 12;

const FALLBACK_DATE_FORMATS: [&str; 7] = [
  "%Y/%m/%d",
  "%Y.%m.%d",
  "%Y%m%d",
  "%m/%d/%Y",
  "%d %b %Y",
  "%b %d, %Y",
  "%B %d, %Y"
];

const FALLBACK_DATETIME_FORMATS: [&str;
  4] = [
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y/%m/%d %H:%M:%S",
  "%Y/%m/%d %H:%M"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Picks `override_id` when it names a
/// valid zone, otherwise the project
/// timezone.
pub fn resolve_timezone(
  override_id: Option<&str>
) -> Tz {
  override_id
    .and_then(|raw| {
      parse_timezone(raw, "rc.timezone")
    })
    .unwrap_or_else(|| {
      *project_timezone()
    })
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::info!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Calendar date of `now` in `zone`, i.e.
/// local midnight of the current day.
#[must_use]
pub fn local_today<Z: TimeZone>(
  now: DateTime<Utc>,
  zone: &Z
) -> NaiveDate {
  now.with_timezone(zone).date_naive()
}

/// How a date string was understood.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ParseKind {
  /// `YYYY-MM-DD` or an ISO-8601
  /// timestamp.
  Precise,
  /// Recovered through the loose
  /// format list.
  Fallback
}

impl fmt::Display for ParseKind {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | ParseKind::Precise => {
        f.write_str("precise")
      }
      | ParseKind::Fallback => {
        f.write_str("fallback")
      }
    }
  }
}

/// Whole calendar days between a date
/// and "today". Negative once the date
/// has passed.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Remaining {
  pub days: i64,
  pub kind: ParseKind
}

impl Remaining {
  pub fn is_past(&self) -> bool {
    self.days < 0
  }

  /// True for `0..=days` ahead.
  pub fn is_within(
    &self,
    days: i64
  ) -> bool {
    (0..=days).contains(&self.days)
  }
}

/// Days from `today` to the calendar
/// date in `raw`.
///
/// `today` must already be the local
/// calendar date (see [`local_today`]).
/// ISO timestamps are converted to
/// `zone` before their time of day is
/// dropped; date-only strings never
/// depend on `zone`.
///
/// Returns `None` when `raw` cannot be
/// read as a date at all; callers treat
/// that as "no expiry data".
#[tracing::instrument(
  level = "debug",
  skip(zone)
)]
pub fn remaining_days<Z: TimeZone>(
  raw: &str,
  today: NaiveDate,
  zone: &Z
) -> Option<Remaining> {
  let (date, kind) =
    parse_calendar_date(raw, zone)?;
  Some(Remaining {
    days: date
      .signed_duration_since(today)
      .num_days(),
    kind
  })
}

pub fn parse_calendar_date<
  Z: TimeZone
>(
  raw: &str,
  zone: &Z
) -> Option<(NaiveDate, ParseKind)> {
  let token = raw.trim();
  if token.is_empty() {
    tracing::debug!(
      "empty date string"
    );
    return None;
  }

  if let Some(date) =
    parse_precise(token, zone)
  {
    return Some((
      date,
      ParseKind::Precise
    ));
  }

  match parse_loose(token, zone) {
    | Some(date) => {
      tracing::debug!(
        input = token,
        date = %date,
        "date parsed through fallback formats"
      );
      Some((date, ParseKind::Fallback))
    }
    | None => {
      tracing::warn!(
        input = token,
        "unparseable date string"
      );
      None
    }
  }
}

fn parse_precise<Z: TimeZone>(
  token: &str,
  zone: &Z
) -> Option<NaiveDate> {
  if token.contains('T') {
    parse_timestamp_date(token, zone)
  } else {
    parse_date_only(token)
  }
}

fn parse_timestamp_date<
  Z: TimeZone
>(
  token: &str,
  zone: &Z
) -> Option<NaiveDate> {
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(
      dt.with_timezone(zone)
        .date_naive()
    );
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    let utc = DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc);
    return Some(
      utc
        .with_timezone(zone)
        .date_naive()
    );
  }

  // Offset-less timestamps are already
  // local wall-clock time.
  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt.date());
    }
  }

  None
}

fn parse_date_only(
  token: &str
) -> Option<NaiveDate> {
  let mut fields = token.split('-');
  let (
    Some(year),
    Some(month),
    Some(day),
    None
  ) = (
    fields.next(),
    fields.next(),
    fields.next(),
    fields.next()
  )
  else {
    return None;
  };

  let year: i32 =
    year.trim().parse().ok()?;
  let month: u32 =
    month.trim().parse().ok()?;
  let day: u32 =
    day.trim().parse().ok()?;

  let anchored = Utc
    .with_ymd_and_hms(
      year,
      month,
      day,
      DATE_ONLY_ANCHOR_HOUR,
      0,
      0
    )
    .single()?;
  Some(anchored.date_naive())
}

fn parse_loose<Z: TimeZone>(
  token: &str,
  zone: &Z
) -> Option<NaiveDate> {
  if let Ok(dt) =
    DateTime::parse_from_rfc2822(token)
  {
    return Some(
      dt.with_timezone(zone)
        .date_naive()
    );
  }

  // `2025-06-15 10:00:00Z`
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      &token.replacen(' ', "T", 1)
    )
  {
    return Some(
      dt.with_timezone(zone)
        .date_naive()
    );
  }

  for fmt in FALLBACK_DATETIME_FORMATS
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt.date());
    }
  }

  FALLBACK_DATE_FORMATS
    .iter()
    .find_map(|fmt| {
      NaiveDate::parse_from_str(
        token, fmt
      )
      .ok()
    })
    .or_else(|| parse_partial_iso(token))
}

/// `YYYY-MM` is the first of the month,
/// `YYYY` the first of January.
fn parse_partial_iso(
  token: &str
) -> Option<NaiveDate> {
  let all_digits = |part: &str| {
    !part.is_empty()
      && part
        .bytes()
        .all(|b| b.is_ascii_digit())
  };

  let mut parts = token.split('-');
  let year = parts.next()?;
  if year.len() != 4 || !all_digits(year)
  {
    return None;
  }

  let month = match parts.next() {
    | None => 1,
    | Some(m)
      if m.len() <= 2
        && all_digits(m) =>
    {
      m.parse::<u32>().ok()?
    }
    | Some(_) => return None
  };
  if parts.next().is_some() {
    return None;
  }

  NaiveDate::from_ymd_opt(
    year.parse().ok()?,
    month,
    1
  )
}

/// Resolves a "today" expression such as
/// `today`, `+3d` or `2025-06-10` to a
/// calendar date in `zone`.
#[tracing::instrument(skip(now, zone), fields(input = input))]
pub fn parse_today_expr<Z: TimeZone>(
  input: &str,
  now: DateTime<Utc>,
  zone: &Z
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_today(now, zone);

  match lower.as_str() {
    | "now" | "today" => {
      return Ok(today);
    }
    | "tomorrow" => {
      return shift_days(today, 1);
    }
    | "yesterday" => {
      return shift_days(today, -1);
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let days = match unit {
      | "d" => num,
      | "w" => num.saturating_mul(7),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    };

    return shift_days(
      today,
      if sign == "-" { -days } else { days }
    );
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     +Nd/-Nd, +Nw/-Nw, YYYY-MM-DD"
  })
}

fn shift_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  let delta = Duration::try_days(days)
    .ok_or_else(|| {
      anyhow!(
        "day offset out of range: \
         {days}"
      )
    })?;
  date
    .checked_add_signed(delta)
    .ok_or_else(|| {
      anyhow!(
        "date out of range after \
         shifting by {days} days"
      )
    })
}

#[cfg(test)]
mod tests {
  use chrono::{
    FixedOffset,
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    ParseKind,
    local_today,
    parse_today_expr,
    remaining_days
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn counts_days_both_directions() {
    let today = date(2025, 6, 10);
    let ahead = remaining_days(
      "2025-06-15",
      today,
      &Utc
    )
    .expect("parse ahead");
    let behind = remaining_days(
      "2025-06-05",
      today,
      &Utc
    )
    .expect("parse behind");

    assert_eq!(ahead.days, 5);
    assert_eq!(behind.days, -5);
    assert_eq!(
      ahead.kind,
      ParseKind::Precise
    );
    assert!(behind.is_past());
    assert!(ahead.is_within(5));
    assert!(!ahead.is_within(4));
  }

  #[test]
  fn repeated_calls_agree() {
    let today = date(2025, 6, 10);
    let first = remaining_days(
      "2025-07-01T08:00:00Z",
      today,
      &Utc
    );
    let second = remaining_days(
      "2025-07-01T08:00:00Z",
      today,
      &Utc
    );
    assert_eq!(first, second);
  }

  #[test]
  fn date_only_is_stable_across_offsets()
  {
    let today = date(2024, 12, 20);
    for hours in -12..=14 {
      let zone =
        FixedOffset::east_opt(
          hours * 3600
        )
        .expect("valid offset");
      let got = remaining_days(
        "2025-01-01",
        today,
        &zone
      )
      .expect("parse date");
      assert_eq!(
        got.days, 12,
        "offset {hours}h"
      );
    }
  }

  #[test]
  fn timestamp_and_date_only_agree() {
    let today = date(2025, 6, 10);
    let stamped = remaining_days(
      "2025-06-15T23:59:59Z",
      today,
      &Utc
    )
    .expect("parse timestamp");
    let plain = remaining_days(
      "2025-06-15",
      today,
      &Utc
    )
    .expect("parse date");
    assert_eq!(stamped.days, plain.days);
  }

  #[test]
  fn timestamps_are_read_in_the_zone() {
    let today = date(2025, 6, 10);
    let tokyo = chrono_tz::Asia::Tokyo;
    let got = remaining_days(
      "2025-06-15T20:00:00Z",
      today,
      &tokyo
    )
    .expect("parse timestamp");
    assert_eq!(got.days, 6);

    let naive = remaining_days(
      "2025-06-15T23:30:00",
      today,
      &tokyo
    )
    .expect("parse naive timestamp");
    assert_eq!(naive.days, 5);
  }

  #[test]
  fn loose_formats_are_marked_fallback()
  {
    let today = date(2025, 6, 10);
    for raw in [
      "2025/06/15",
      "06/15/2025",
      "15 Jun 2025",
      "2025-06-15 09:30:00",
      "2025-06-15 10:00:00Z"
    ] {
      let got =
        remaining_days(raw, today, &Utc)
          .expect("fallback parse");
      assert_eq!(got.days, 5, "{raw}");
      assert_eq!(
        got.kind,
        ParseKind::Fallback,
        "{raw}"
      );
    }
  }

  #[test]
  fn partial_iso_dates_start_the_period()
  {
    let today = date(2025, 6, 10);
    for (raw, days) in
      [("2025-06", -9), ("2025-6", -9), ("2025", -160)]
    {
      let got =
        remaining_days(raw, today, &Utc)
          .expect("partial date");
      assert_eq!(got.days, days, "{raw}");
      assert_eq!(
        got.kind,
        ParseKind::Fallback,
        "{raw}"
      );
    }
  }

  #[test]
  fn spaced_timestamp_converts_to_zone()
  {
    let today = date(2025, 6, 10);
    let got = remaining_days(
      "2025-06-15 20:00:00Z",
      today,
      &chrono_tz::Asia::Tokyo
    )
    .expect("spaced rfc3339");
    assert_eq!(got.days, 6);
    assert_eq!(got.kind, ParseKind::Fallback);
  }

  #[test]
  fn garbage_is_unknown() {
    let today = date(2025, 6, 10);
    for raw in [
      "",
      "   ",
      "not a date",
      "2025-02-30",
      "2025-13-01",
      "2025-13",
      "2025-06-",
      "25-06"
    ] {
      assert_eq!(
        remaining_days(raw, today, &Utc),
        None,
        "{raw:?}"
      );
    }
  }

  #[test]
  fn local_today_follows_zone() {
    let now = Utc
      .with_ymd_and_hms(
        2025, 6, 10, 2, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      local_today(now, &Utc),
      date(2025, 6, 10)
    );
    assert_eq!(
      local_today(
        now,
        &chrono_tz::America::New_York
      ),
      date(2025, 6, 9)
    );
  }

  #[test]
  fn parses_today_expressions() {
    let now = Utc
      .with_ymd_and_hms(
        2025, 6, 10, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let cases = [
      ("today", date(2025, 6, 10)),
      ("tomorrow", date(2025, 6, 11)),
      ("yesterday", date(2025, 6, 9)),
      ("+3d", date(2025, 6, 13)),
      ("-1w", date(2025, 6, 3)),
      ("2025-01-31", date(2025, 1, 31))
    ];
    for (input, want) in cases {
      let got =
        parse_today_expr(input, now, &Utc)
          .expect("parse today expr");
      assert_eq!(got, want, "{input}");
    }
    assert!(
      parse_today_expr(
        "next tuesday",
        now,
        &Utc
      )
      .is_err()
    );
  }
}
