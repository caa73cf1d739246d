use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  NaiveDate,
  TimeDelta,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_FILE_NAME: &str =
  "studyplan-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "STUDYPLAN_TIMEZONE";
const TIMEZONE_FILE_ENV_VAR: &str =
  "STUDYPLAN_TIME_CONFIG";

pub const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";

/// `timezone = ".."` at the top level or
/// under `[time]`; the top level wins.
#[derive(Debug, Default, Deserialize)]
struct TimezoneFile {
  timezone: Option<String>,
  #[serde(default)]
  time:     TimezoneTable
}

#[derive(Debug, Default, Deserialize)]
struct TimezoneTable {
  timezone: Option<String>
}

/// Calendar date of `dt` as seen from
/// `tz`.
#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

/// Timezone used for "today" and for
/// dating RFC 3339 due values: env var,
/// then the TOML file, then Oslo.
pub fn resolve_project_timezone() -> Tz {
  let env = std::env::var(TIMEZONE_ENV_VAR).ok();
  let file_text = timezone_file_path()
    .and_then(|path| {
      fs::read_to_string(&path)
        .inspect_err(|err| {
          tracing::debug!(
            file = %path.display(),
            error = %err,
            "no timezone file"
          );
        })
        .ok()
    });

  choose_timezone(
    env.as_deref(),
    file_text.as_deref()
  )
}

fn choose_timezone(
  env: Option<&str>,
  file_text: Option<&str>
) -> Tz {
  env
    .and_then(|raw| {
      named_timezone(raw, TIMEZONE_ENV_VAR)
    })
    .or_else(|| {
      file_text.and_then(timezone_from_toml)
    })
    .unwrap_or(chrono_tz::Europe::Oslo)
}

fn timezone_file_path() -> Option<PathBuf>
{
  match std::env::var(TIMEZONE_FILE_ENV_VAR)
  {
    | Ok(raw) if !raw.trim().is_empty() => {
      Some(PathBuf::from(raw.trim()))
    }
    | _ => std::env::current_dir()
      .ok()
      .map(|dir| dir.join(TIMEZONE_FILE_NAME))
  }
}

fn timezone_from_toml(
  text: &str
) -> Option<Tz> {
  let file: TimezoneFile =
    toml::from_str(text)
      .inspect_err(|err| {
        tracing::warn!(
          error = %err,
          "ignoring unreadable timezone file"
        );
      })
      .ok()?;
  let name =
    file.timezone.or(file.time.timezone)?;
  named_timezone(&name, TIMEZONE_FILE_NAME)
}

fn named_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let name = raw.trim();
  match name.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(source, timezone = name, "project timezone");
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = name,
        error = %err,
        "ignoring unknown timezone"
      );
      None
    }
  }
}

fn strict_date_regex()
-> Option<&'static Regex> {
  static STRICT_DATE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  STRICT_DATE
    .get_or_init(|| {
      Regex::new(r"^\d{4}-\d{2}-\d{2}$")
        .ok()
    })
    .as_ref()
}

/// Reads a stored due value.
///
/// Accepts `YYYY-MM-DD` and RFC 3339
/// date-times (taken as a date in `tz`).
/// Anything else is treated as "no
/// date".
pub fn parse_due_date(
  raw: &str,
  tz: &Tz
) -> Option<NaiveDate> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if strict_date_regex()
    .is_some_and(|re| re.is_match(token))
  {
    return match NaiveDate::parse_from_str(
      token,
      DUE_DATE_FORMAT
    ) {
      | Ok(date) => Some(date),
      | Err(err) => {
        tracing::debug!(
          due = %token,
          error = %err,
          "due date out of range; skipping"
        );
        None
      }
    };
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(
      dt.with_timezone(tz).date_naive()
    );
  }

  tracing::debug!(
    due = %token,
    "unrecognized due date; skipping"
  );
  None
}

/// Parses a due date typed on the
/// command line into a calendar date.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_date(now, tz);

  match lower.as_str() {
    | "today" | "now" => {
      return Ok(today);
    }
    | "tomorrow" => {
      return Ok(add_days(today, 1));
    }
    | "yesterday" => {
      return Ok(add_days(today, -1));
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  if let Some(days) =
    relative_days(&lower)
  {
    return today
      .checked_add_signed(TimeDelta::days(
        days
      ))
      .ok_or_else(|| {
        anyhow!(
          "relative date out of \
           range: {input}"
        )
      });
  }

  if let Some(date) =
    parse_due_date(token, tz)
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized due date: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     +Nd/-Nd/+Nw, YYYY-MM-DD, RFC3339"
  })
}

/// First day of the month `months`
/// away from the month containing
/// `anchor`.
///
/// Results outside chrono's range are
/// clamped to its first or last
/// representable month.
#[must_use]
pub fn shift_month_start(
  anchor: NaiveDate,
  months: i32
) -> NaiveDate {
  let min = month_index(NaiveDate::MIN);
  let max = month_index(NaiveDate::MAX);
  let target = (month_index(anchor)
    + i64::from(months))
  .clamp(min, max);

  let year =
    i32::try_from(target.div_euclid(12))
      .unwrap_or(anchor.year());
  let month =
    target.rem_euclid(12) as u32 + 1;

  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(anchor)
}

fn month_index(date: NaiveDate) -> i64 {
  i64::from(date.year()) * 12
    + i64::from(date.month0())
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };

  NaiveDate::from_ymd_opt(
    next_year, next_month, 1
  )
  .and_then(|next| next.pred_opt())
  .map(|last| last.day())
  .unwrap_or(31)
}

/// Column of `date` in a Monday-first
/// week (Monday = 0, Sunday = 6).
#[must_use]
pub fn monday_first_column(
  date: NaiveDate
) -> u32 {
  (date.weekday().num_days_from_sunday()
    + 6)
    % 7
}

/// `+3d`, `-2w` and friends as a signed
/// day count.
fn relative_days(token: &str) -> Option<i64> {
  static RELATIVE: OnceLock<Option<Regex>> =
    OnceLock::new();
  let re = RELATIVE
    .get_or_init(|| {
      Regex::new(r"^([+-])(\d{1,6})([dw])$")
        .ok()
    })
    .as_ref()?;

  let caps = re.captures(token)?;
  let amount: i64 = caps[2].parse().ok()?;
  let days = if &caps[3] == "w" {
    amount * 7
  } else {
    amount
  };
  Some(if &caps[1] == "-" { -days } else { days })
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(TimeDelta::days(
      days
    ))
    .unwrap_or(date)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" | "mandag" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues"
    | "tirsdag" => Some(Weekday::Tue),
    | "wednesday" | "wed" | "onsdag" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" | "torsdag" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" | "fredag" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" | "lordag"
    | "lørdag" => Some(Weekday::Sat),
    | "sunday" | "sun" | "sondag"
    | "søndag" => Some(Weekday::Sun),
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}
