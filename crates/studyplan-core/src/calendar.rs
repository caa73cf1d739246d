use std::collections::BTreeSet;

use chrono::{
  DateTime,
  Datelike,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::{
  days_in_month,
  local_date,
  monday_first_column,
  parse_due_date,
  shift_month_start
};
use crate::locale::Locale;

/// Anything that can be placed on the
/// month grid by its due date.
pub trait DueDate {
  fn due_raw(&self) -> Option<&str>;
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
  pub key:        String,
  #[serde(rename = "dayNumber")]
  pub day:        Option<u32>,
  pub is_padding: bool,
  pub has_marker: bool
}

impl DayCell {
  fn padding(key: String) -> Self {
    Self {
      key,
      day: None,
      is_padding: true,
      has_marker: false
    }
  }

  fn day(
    day: u32,
    has_marker: bool
  ) -> Self {
    Self {
      key: format!("d{day}"),
      day: Some(day),
      is_padding: false,
      has_marker
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct MonthCalendar {
  pub year:        i32,
  pub month:       u32,
  pub month_label: String,
  pub cells:       Vec<DayCell>,
  #[serde(rename = "todayDayNumber")]
  pub today:       Option<u32>
}

impl MonthCalendar {
  pub fn weeks(
    &self
  ) -> impl Iterator<Item = &[DayCell]>
  {
    self.cells.chunks(7)
  }

  pub fn leading_padding(&self) -> usize {
    self
      .cells
      .iter()
      .take_while(|cell| cell.is_padding)
      .count()
  }

  pub fn day_count(&self) -> usize {
    self
      .cells
      .iter()
      .filter(|cell| !cell.is_padding)
      .count()
  }

  /// Returns `day` if it names a real
  /// cell of this month.
  pub fn select(
    &self,
    day: u32
  ) -> Option<u32> {
    self
      .cells
      .iter()
      .any(|cell| cell.day == Some(day))
      .then_some(day)
  }
}

#[derive(Debug, Clone)]
pub struct CalendarBuilder {
  timezone: Tz,
  locale:   Locale
}

impl CalendarBuilder {
  pub fn new(
    timezone: Tz,
    locale: Locale
  ) -> Self {
    Self { timezone, locale }
  }

  /// Builds the grid for the month
  /// `offset` months away from the
  /// month containing `now`.
  #[tracing::instrument(skip(self, items, now), fields(items = items.len()))]
  pub fn build<T: DueDate>(
    &self,
    offset: i32,
    items: &[T],
    now: DateTime<Utc>
  ) -> MonthCalendar {
    let today =
      local_date(now, &self.timezone);
    let first = shift_month_start(
      today, offset
    );
    let (year, month) =
      (first.year(), first.month());

    let marked =
      self.marked_days(first, items);
    let leading =
      monday_first_column(first);
    let days = days_in_month(year, month);

    let mut cells = Vec::with_capacity(
      (leading + days + 6) as usize
    );
    for idx in 0..leading {
      cells.push(DayCell::padding(
        format!("p{idx}")
      ));
    }
    for day in 1..=days {
      cells.push(DayCell::day(
        day,
        marked.contains(&day)
      ));
    }
    while cells.len() % 7 != 0 {
      let key =
        format!("n{}", cells.len());
      cells.push(DayCell::padding(key));
    }

    let today_marker = (today.year()
      == year
      && today.month() == month)
      .then(|| today.day());

    tracing::debug!(
      year,
      month,
      leading,
      days,
      markers = marked.len(),
      "built month grid"
    );

    MonthCalendar {
      year,
      month,
      month_label: self
        .locale
        .month_label(year, month),
      cells,
      today: today_marker
    }
  }

  /// Items due on `day` of the month
  /// shown by `calendar`.
  pub fn items_due_on<'a, T: DueDate>(
    &self,
    calendar: &MonthCalendar,
    day: u32,
    items: &'a [T]
  ) -> Vec<&'a T> {
    let Some(target) =
      NaiveDate::from_ymd_opt(
        calendar.year,
        calendar.month,
        day
      )
    else {
      return vec![];
    };

    items
      .iter()
      .filter(|item| {
        self.due_date(*item)
          == Some(target)
      })
      .collect()
  }

  fn marked_days<T: DueDate>(
    &self,
    first: NaiveDate,
    items: &[T]
  ) -> BTreeSet<u32> {
    items
      .iter()
      .filter_map(|item| {
        self.due_date(item)
      })
      .filter(|date| {
        date.year() == first.year()
          && date.month()
            == first.month()
      })
      .map(|date| date.day())
      .collect()
  }

  fn due_date<T: DueDate>(
    &self,
    item: &T
  ) -> Option<NaiveDate> {
    item.due_raw().and_then(|raw| {
      parse_due_date(
        raw,
        &self.timezone
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };
  use chrono_tz::Europe::Oslo;

  use super::{
    CalendarBuilder,
    DueDate
  };
  use crate::locale::Locale;

  struct Item(Option<&'static str>);

  impl DueDate for Item {
    fn due_raw(&self) -> Option<&str> {
      self.0
    }
  }

  fn builder() -> CalendarBuilder {
    CalendarBuilder::new(
      Oslo,
      Locale::Norwegian
    )
  }

  fn at(
    y: i32,
    m: u32,
    d: u32
  ) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(y, m, d, 12, 0, 0)
      .single()
      .expect("valid now")
  }

  #[test]
  fn grid_is_whole_weeks_for_every_offset()
  {
    let cal = builder();
    let now = at(2026, 10, 16);
    for offset in -60..=60 {
      let month = cal.build::<Item>(
        offset,
        &[],
        now
      );
      assert_eq!(
        month.cells.len() % 7,
        0,
        "offset {offset}"
      );
      assert_eq!(
        month.day_count() as u32,
        crate::datetime::days_in_month(
          month.year,
          month.month
        )
      );
    }
  }

  #[test]
  fn february_lengths_follow_leap_years()
  {
    let cal = builder();
    let leap = cal.build::<Item>(
      0,
      &[],
      at(2024, 2, 10)
    );
    assert_eq!(leap.day_count(), 29);
    let common = cal.build::<Item>(
      0,
      &[],
      at(2026, 2, 10)
    );
    assert_eq!(common.day_count(), 28);
    // 2026-02-01 is a Sunday: six
    // leading cells, exactly five weeks.
    assert_eq!(common.leading_padding(), 6);
    assert_eq!(common.cells.len(), 35);
  }

  #[test]
  fn monday_start_has_no_leading_padding()
  {
    let month = builder().build::<Item>(
      0,
      &[],
      at(2026, 6, 20)
    );
    assert_eq!(month.leading_padding(), 0);
    assert_eq!(month.cells[0].key, "d1");
    assert_eq!(month.cells[0].day, Some(1));
  }

  #[test]
  fn padding_keys_are_unique() {
    let month = builder().build::<Item>(
      0,
      &[],
      at(2026, 3, 5)
    );
    let mut keys: Vec<_> = month
      .cells
      .iter()
      .map(|c| c.key.clone())
      .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), month.cells.len());
    assert_eq!(month.cells[0].key, "p0");
    assert_eq!(
      month.cells.last().map(|c| c.key.as_str()),
      Some("n41")
    );
  }

  #[test]
  fn offset_rolls_into_previous_year() {
    let month = builder().build::<Item>(
      -1,
      &[],
      at(2026, 1, 31)
    );
    assert_eq!(
      (month.year, month.month),
      (2025, 12)
    );
    assert_eq!(
      month.month_label,
      "Desember 2025"
    );
    assert_eq!(month.today, None);
  }

  #[test]
  fn today_only_in_current_month() {
    let cal = builder();
    let now = at(2026, 10, 16);
    assert_eq!(
      cal.build::<Item>(0, &[], now).today,
      Some(16)
    );
    assert_eq!(
      cal.build::<Item>(1, &[], now).today,
      None
    );
    assert_eq!(
      cal.build::<Item>(-12, &[], now).today,
      None
    );
  }

  #[test]
  fn today_follows_project_timezone() {
    // 23:30 UTC on Oct 31 is already
    // November 1 in Oslo.
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 31, 23, 30, 0
      )
      .single()
      .expect("valid now");
    let month =
      builder().build::<Item>(0, &[], now);
    assert_eq!(
      (month.month, month.today),
      (11, Some(1))
    );
  }

  #[test]
  fn markers_only_within_target_month() {
    let items = [
      Item(Some("2026-10-03")),
      Item(Some("2026-10-03")),
      Item(Some("2026-10-21")),
      Item(Some("2026-11-03")),
      Item(Some("2025-10-05")),
      Item(Some("not a date")),
      Item(Some("")),
      Item(None)
    ];
    let month = builder().build(
      0,
      &items,
      at(2026, 10, 16)
    );
    let marked: Vec<u32> = month
      .cells
      .iter()
      .filter(|c| c.has_marker)
      .filter_map(|c| c.day)
      .collect();
    assert_eq!(marked, vec![3, 21]);
    assert!(
      month
        .cells
        .iter()
        .filter(|c| c.is_padding)
        .all(|c| !c.has_marker)
    );
  }

  #[test]
  fn lists_items_due_on_selected_day() {
    let items = [
      Item(Some("2026-10-03")),
      Item(Some("2026-10-03T08:00:00+02:00")),
      Item(Some("2026-10-04")),
      Item(None)
    ];
    let cal = builder();
    let month =
      cal.build(0, &items, at(2026, 10, 16));
    assert_eq!(
      cal.items_due_on(&month, 3, &items).len(),
      2
    );
    assert_eq!(
      cal.items_due_on(&month, 4, &items).len(),
      1
    );
    assert!(
      cal.items_due_on(&month, 32, &items)
        .is_empty()
    );
    assert_eq!(month.select(31), Some(31));
    assert_eq!(month.select(0), None);
  }

  #[test]
  fn building_is_idempotent() {
    let items = [Item(Some("2026-10-09"))];
    let cal = builder();
    let now = at(2026, 10, 16);
    assert_eq!(
      cal.build(2, &items, now),
      cal.build(2, &items, now)
    );
  }

  #[test]
  fn json_uses_day_number_field_names() {
    let items = [Item(Some("2026-10-01"))];
    let month = builder().build(
      0,
      &items,
      at(2026, 10, 16)
    );
    let json = serde_json::to_value(&month)
      .expect("serialize");

    assert_eq!(json["todayDayNumber"], 16);
    assert_eq!(
      json["monthLabel"],
      "Oktober 2026"
    );
    assert!(json["cells"][0]["dayNumber"].is_null());
    assert_eq!(json["cells"][3]["dayNumber"], 1);
    assert_eq!(json["cells"][3]["hasMarker"], true);
    assert!(json["cells"][3].get("day").is_none());
  }
}
