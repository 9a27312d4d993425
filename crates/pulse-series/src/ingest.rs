//! Row-level parsing and normalisation.

use csv::StringRecord;
use pulse_core::series::{MonthIndex, SeriesKey, month_from_name};

use crate::{Error, Result};

// ─── Columns ─────────────────────────────────────────────────────────────────

const STATE: &str = "State";
const STATE_NAME: &str = "State Name";
const INDICATOR: &str = "Indicator";
const YEAR: &str = "Year";
const MONTH: &str = "Month";
const DATA_VALUE: &str = "Data Value";
const PREDICTED_VALUE: &str = "Predicted Value";

/// Header positions, resolved once per load.
#[derive(Debug, Clone)]
pub(crate) struct Columns {
  state:           usize,
  state_name:      Option<usize>,
  indicator:       usize,
  year:            usize,
  month:           usize,
  data_value:      Option<usize>,
  predicted_value: Option<usize>,
}

impl Columns {
  pub(crate) fn from_headers(headers: &StringRecord) -> Result<Self> {
    let find = |name: &str| headers.iter().position(|h| h.trim() == name);
    let require = |name: &'static str| find(name).ok_or(Error::MissingColumn(name));

    Ok(Self {
      state:           require(STATE)?,
      state_name:      find(STATE_NAME),
      indicator:       require(INDICATOR)?,
      year:            require(YEAR)?,
      month:           require(MONTH)?,
      data_value:      find(DATA_VALUE),
      predicted_value: find(PREDICTED_VALUE),
    })
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One raw CSV row, borrowed from the record being read. Consumed and
/// discarded; nothing here is retained by the index.
#[derive(Debug, Clone, Copy)]
pub struct ObservationRow<'a> {
  pub location_code:   &'a str,
  pub location_name:   &'a str,
  pub indicator:       &'a str,
  pub year:            &'a str,
  pub month:           &'a str,
  pub data_value:      &'a str,
  pub predicted_value: &'a str,
}

/// A validated row, ready to be folded into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
  pub key:           SeriesKey,
  /// Display name; falls back to the location code.
  pub location_name: String,
  pub month:         MonthIndex,
  pub value:         Option<f64>,
}

impl<'a> ObservationRow<'a> {
  pub(crate) fn from_record(record: &'a StringRecord, columns: &Columns) -> Self {
    let field = |idx: usize| record.get(idx).unwrap_or("");
    let optional = |idx: Option<usize>| idx.map_or("", field);

    Self {
      location_code:   field(columns.state),
      location_name:   optional(columns.state_name),
      indicator:       field(columns.indicator),
      year:            field(columns.year),
      month:           field(columns.month),
      data_value:      optional(columns.data_value),
      predicted_value: optional(columns.predicted_value),
    }
  }

  /// Validate the row. Returns `None` when the year is not a number, the
  /// month name is unrecognised, or the location code or indicator is empty.
  pub fn normalize(&self) -> Option<Observation> {
    let location = self.location_code.trim();
    let indicator = self.indicator.trim();
    if location.is_empty() || indicator.is_empty() {
      return None;
    }

    let year = parse_year(self.year)?;
    let month = MonthIndex::from_parts(year, month_from_name(self.month)?)?;

    let name = self.location_name.trim();
    let location_name = if name.is_empty() { location } else { name };

    Some(Observation {
      key: SeriesKey::new(location, indicator),
      location_name: location_name.to_owned(),
      month,
      value: parse_number(self.data_value).or_else(|| parse_number(self.predicted_value)),
    })
  }
}

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// Parse a numeric cell, ignoring thousands separators. Empty, non-numeric
/// and non-finite cells yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
  let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
  let cleaned = cleaned.trim();
  if cleaned.is_empty() {
    return None;
  }
  cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Years must be positive whole numbers.
fn parse_year(raw: &str) -> Option<i64> {
  let n = parse_number(raw)?;
  if n < 1.0 || n.fract() != 0.0 || n > f64::from(i32::MAX) {
    return None;
  }
  Some(n as i64)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row<'a>(code: &'a str, year: &'a str, month: &'a str) -> ObservationRow<'a> {
    ObservationRow {
      location_code:   code,
      location_name:   "United States",
      indicator:       "Number of Drug Overdose Deaths",
      year,
      month,
      data_value:      "4,500",
      predicted_value: "",
    }
  }

  #[test]
  fn parse_number_strips_separators() {
    assert_eq!(parse_number("4,500"), Some(4500.0));
    assert_eq!(parse_number(" 1,234,567.5 "), Some(1_234_567.5));
    assert_eq!(parse_number(""), None);
    assert_eq!(parse_number("n/a"), None);
    assert_eq!(parse_number("inf"), None);
  }

  #[test]
  fn valid_row_normalizes() {
    let obs = row("US", "2020", "January").normalize().unwrap();
    assert_eq!(obs.key, SeriesKey::new("US", "Number of Drug Overdose Deaths"));
    assert_eq!(obs.month, MonthIndex::from_parts(2020, 1).unwrap());
    assert_eq!(obs.value, Some(4500.0));
    assert_eq!(obs.location_name, "United States");
  }

  #[test]
  fn invalid_rows_are_rejected() {
    assert!(row("US", "twenty", "January").normalize().is_none());
    assert!(row("US", "", "January").normalize().is_none());
    assert!(row("US", "0", "January").normalize().is_none());
    assert!(row("US", "2020.5", "January").normalize().is_none());
    assert!(row("US", "2020", "Janvier").normalize().is_none());
    assert!(row("", "2020", "January").normalize().is_none());

    let mut no_indicator = row("US", "2020", "January");
    no_indicator.indicator = "  ";
    assert!(no_indicator.normalize().is_none());
  }

  #[test]
  fn value_falls_back_to_predicted_then_null() {
    let mut r = row("AK", "2021", "March");
    r.data_value = "";
    r.predicted_value = "12";
    assert_eq!(r.normalize().unwrap().value, Some(12.0));

    r.predicted_value = "";
    assert_eq!(r.normalize().unwrap().value, None);
  }

  #[test]
  fn missing_name_falls_back_to_code() {
    let mut r = row("AK", "2021", "March");
    r.location_name = "";
    assert_eq!(r.normalize().unwrap().location_name, "AK");
  }
}
