//! Time-series vocabulary shared by the indexer and the HTTP layer.
//!
//! Calendar months are encoded as a single integer ([`MonthIndex`]) so that
//! series can be compared, bounded and iterated without date arithmetic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The aggregate pseudo-location that is always listed first.
pub const ALL_LOCATIONS_CODE: &str = "US";

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December",
];

/// Map a full English month name (`"January"`) to its number (1–12).
pub fn month_from_name(name: &str) -> Option<u32> {
  let name = name.trim();
  MONTH_NAMES
    .iter()
    .position(|m| *m == name)
    .map(|i| i as u32 + 1)
}

// ─── MonthIndex ──────────────────────────────────────────────────────────────

/// `year * 12 + (month - 1)`: a total ordering over calendar months.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MonthIndex(i64);

impl MonthIndex {
  /// Build an index from a year and a 1-based month. Returns `None` for a
  /// month outside 1–12.
  pub fn from_parts(year: i64, month: u32) -> Option<Self> {
    if !(1..=12).contains(&month) {
      return None;
    }
    Some(Self(year * 12 + i64::from(month) - 1))
  }

  pub const fn from_raw(raw: i64) -> Self { Self(raw) }

  pub const fn raw(self) -> i64 { self.0 }

  /// Split back into `(year, month)` with a 1-based month.
  pub fn parts(self) -> (i64, u32) {
    (self.0.div_euclid(12), self.0.rem_euclid(12) as u32 + 1)
  }

  /// Inclusive iteration from `self` to `end`.
  pub fn through(self, end: MonthIndex) -> impl Iterator<Item = MonthIndex> {
    (self.0..=end.0).map(MonthIndex)
  }
}

impl fmt::Display for MonthIndex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (year, month) = self.parts();
    write!(f, "{year:04}-{month:02}")
  }
}

// ─── Keys and catalogue entries ──────────────────────────────────────────────

/// Uniquely identifies one time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
  pub location:  String,
  pub indicator: String,
}

impl SeriesKey {
  pub fn new(location: impl Into<String>, indicator: impl Into<String>) -> Self {
    Self { location: location.into(), indicator: indicator.into() }
  }
}

/// A selectable location: its code and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub code: String,
  pub name: String,
}

/// One point of a gap-filled series. `value` is `None` for months absent
/// from the source data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
  pub month_index: MonthIndex,
  pub value:       Option<f64>,
}

/// Axis label for an indicator: percent-like indicators are shares, the rest
/// are 12-month-ending death counts.
pub fn value_label(indicator: &str) -> &'static str {
  if indicator.to_lowercase().contains("percent") {
    "Percent"
  } else {
    "Deaths (12-month ending)"
  }
}
