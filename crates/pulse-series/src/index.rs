//! [`SeriesIndex`] and the fold that builds it.

use std::collections::{BTreeMap, HashMap, HashSet};

use pulse_core::series::{ALL_LOCATIONS_CODE, Location, MonthIndex, SeriesKey, SeriesPoint};

use crate::ingest::{Observation, ObservationRow};

/// Row counters for one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
  pub rows_read:    usize,
  pub rows_indexed: usize,
  pub rows_dropped: usize,
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Accumulates observations in any order; [`SeriesBuilder::finish`] produces
/// the immutable index.
#[derive(Debug, Default)]
pub struct SeriesBuilder {
  series:     HashMap<SeriesKey, BTreeMap<MonthIndex, Option<f64>>>,
  locations:  HashMap<String, String>,
  indicators: HashSet<String>,
  bounds:     Option<(MonthIndex, MonthIndex)>,
  stats:      IngestStats,
}

impl SeriesBuilder {
  /// Validate and fold one row. Returns whether it was indexed.
  pub fn push_row(&mut self, row: &ObservationRow<'_>) -> bool {
    match row.normalize() {
      Some(obs) => {
        self.push(obs);
        true
      }
      None => {
        self.skip_row();
        false
      }
    }
  }

  /// Fold an already-validated observation. A later value for the same key
  /// and month replaces the earlier one.
  pub fn push(&mut self, obs: Observation) {
    self.stats.rows_read += 1;
    self.stats.rows_indexed += 1;

    self
      .locations
      .entry(obs.key.location.clone())
      .or_insert(obs.location_name);
    if !self.indicators.contains(&obs.key.indicator) {
      self.indicators.insert(obs.key.indicator.clone());
    }

    self.bounds = Some(match self.bounds {
      None => (obs.month, obs.month),
      Some((min, max)) => (min.min(obs.month), max.max(obs.month)),
    });

    self.series.entry(obs.key).or_default().insert(obs.month, obs.value);
  }

  /// Count a row that could not be read or validated.
  pub fn skip_row(&mut self) {
    self.stats.rows_read += 1;
    self.stats.rows_dropped += 1;
  }

  pub fn finish(self) -> SeriesIndex {
    let mut locations: Vec<Location> = self
      .locations
      .into_iter()
      .map(|(code, name)| Location { code, name })
      .collect();
    locations.sort_by(|a, b| {
      let a_all = a.code == ALL_LOCATIONS_CODE;
      let b_all = b.code == ALL_LOCATIONS_CODE;
      b_all
        .cmp(&a_all)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.code.cmp(&b.code))
    });

    let mut indicators: Vec<String> = self.indicators.into_iter().collect();
    indicators.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));

    SeriesIndex {
      series: self.series,
      locations,
      indicators,
      bounds: self.bounds,
      stats: self.stats,
    }
  }
}

// ─── Index ───────────────────────────────────────────────────────────────────

/// `(location, indicator)` → month → value, plus the catalogues the UI needs.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesIndex {
  series:     HashMap<SeriesKey, BTreeMap<MonthIndex, Option<f64>>>,
  locations:  Vec<Location>,
  indicators: Vec<String>,
  bounds:     Option<(MonthIndex, MonthIndex)>,
  stats:      IngestStats,
}

impl SeriesIndex {
  /// A gap-filled series over the global month domain. Months missing from
  /// the data have `value: None`. Unknown keys yield an empty series.
  pub fn get_series(&self, location: &str, indicator: &str) -> Vec<SeriesPoint> {
    let key = SeriesKey::new(location, indicator);
    let (Some(values), Some((min, max))) = (self.series.get(&key), self.bounds) else {
      return Vec::new();
    };

    min
      .through(max)
      .map(|month_index| SeriesPoint {
        month_index,
        value: values.get(&month_index).copied().flatten(),
      })
      .collect()
  }

  /// Global `(min, max)` month across the whole dataset.
  pub fn meta(&self) -> Option<(MonthIndex, MonthIndex)> { self.bounds }

  /// Locations, the aggregate first, then alphabetically by display name.
  pub fn locations(&self) -> &[Location] { &self.locations }

  pub fn indicators(&self) -> &[String] { &self.indicators }

  /// Display name for a location code, or the code itself if unknown.
  pub fn location_name<'a>(&'a self, code: &'a str) -> &'a str {
    self
      .locations
      .iter()
      .find(|l| l.code == code)
      .map_or(code, |l| l.name.as_str())
  }

  pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> { self.series.keys() }

  /// Number of distinct series.
  pub fn len(&self) -> usize { self.series.len() }

  pub fn is_empty(&self) -> bool { self.series.is_empty() }

  pub fn stats(&self) -> IngestStats { self.stats }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn obs(code: &str, name: &str, indicator: &str, year: i64, month: u32, value: Option<f64>) -> Observation {
    Observation {
      key:           SeriesKey::new(code, indicator),
      location_name: name.into(),
      month:         MonthIndex::from_parts(year, month).unwrap(),
      value,
    }
  }

  #[test]
  fn out_of_order_input_is_bounded_globally() {
    let mut b = SeriesBuilder::default();
    b.push(obs("AK", "Alaska", "Deaths", 2021, 3, Some(3.0)));
    b.push(obs("AK", "Alaska", "Deaths", 2020, 11, Some(1.0)));
    b.push(obs("US", "United States", "Deaths", 2021, 6, Some(9.0)));
    let index = b.finish();

    let (min, max) = index.meta().unwrap();
    assert_eq!(min.to_string(), "2020-11");
    assert_eq!(max.to_string(), "2021-06");

    let ak = index.get_series("AK", "Deaths");
    assert_eq!(ak.len() as i64, max.raw() - min.raw() + 1);
    assert_eq!(ak[0].value, Some(1.0));
    assert_eq!(ak[1].value, None);
    assert_eq!(ak[4].value, Some(3.0));
    assert!(ak.windows(2).all(|w| w[0].month_index < w[1].month_index));

    let us = index.get_series("US", "Deaths");
    assert_eq!(us.len(), ak.len());
    assert_eq!(us.last().unwrap().value, Some(9.0));
  }

  #[test]
  fn last_write_wins_per_month() {
    let mut b = SeriesBuilder::default();
    b.push(obs("US", "United States", "Deaths", 2020, 1, Some(1.0)));
    b.push(obs("US", "United States", "Deaths", 2020, 1, Some(2.0)));
    let index = b.finish();
    assert_eq!(index.get_series("US", "Deaths")[0].value, Some(2.0));
  }

  #[test]
  fn unknown_series_is_empty() {
    let mut b = SeriesBuilder::default();
    b.push(obs("US", "United States", "Deaths", 2020, 1, Some(1.0)));
    let index = b.finish();
    assert!(index.get_series("US", "Other").is_empty());
    assert!(SeriesBuilder::default().finish().get_series("US", "Deaths").is_empty());
  }

  #[test]
  fn catalogues_are_sorted_with_aggregate_first() {
    let mut b = SeriesBuilder::default();
    b.push(obs("WY", "Wyoming", "b indicator", 2020, 1, None));
    b.push(obs("AL", "Alabama", "A indicator", 2020, 1, None));
    b.push(obs("US", "United States", "c indicator", 2020, 1, None));
    b.push(obs("AL", "Renamed", "A indicator", 2020, 2, None));
    let index = b.finish();

    let codes: Vec<&str> = index.locations().iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, ["US", "AL", "WY"]);
    assert_eq!(index.location_name("AL"), "Alabama");
    assert_eq!(index.location_name("ZZ"), "ZZ");
    assert_eq!(index.indicators(), ["A indicator", "b indicator", "c indicator"]);
  }

  #[test]
  fn stats_count_indexed_and_dropped() {
    let mut b = SeriesBuilder::default();
    b.push(obs("US", "United States", "Deaths", 2020, 1, None));
    b.skip_row();
    let stats = b.finish().stats();
    assert_eq!(stats, IngestStats { rows_read: 2, rows_indexed: 1, rows_dropped: 1 });
  }
}
