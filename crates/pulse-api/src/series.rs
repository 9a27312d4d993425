//! Handlers for the chart data.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/catalog` | Locations, indicators and the month domain |
//! | `GET`  | `/series`  | `?location=US&indicator=...`; unknown pairs give no points |

use axum::{
  Json,
  extract::{Query, State},
};
use pulse_core::series::{Location, MonthIndex, value_label};
use serde::{Deserialize, Serialize};

use crate::AppState;

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Catalog {
  pub locations:  Vec<Location>,
  pub indicators: Vec<String>,
  pub min_month:  Option<MonthIndex>,
  pub max_month:  Option<MonthIndex>,
}

/// `GET /catalog`
pub async fn catalog<S>(State(state): State<AppState<S>>) -> Json<Catalog> {
  let index = &state.series;
  let bounds = index.meta();
  Json(Catalog {
    locations:  index.locations().to_vec(),
    indicators: index.indicators().to_vec(),
    min_month:  bounds.map(|(min, _)| min),
    max_month:  bounds.map(|(_, max)| max),
  })
}

// ─── Series ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
  pub location:  String,
  pub indicator: String,
}

#[derive(Debug, Serialize)]
pub struct SeriesBody {
  pub location:      String,
  pub location_name: String,
  pub indicator:     String,
  pub value_label:   &'static str,
  pub points:        Vec<PointBody>,
}

#[derive(Debug, Serialize)]
pub struct PointBody {
  pub month_index: MonthIndex,
  /// `YYYY-MM`
  pub label:       String,
  pub value:       Option<f64>,
}

/// `GET /series?location=<code>&indicator=<name>`
pub async fn series<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<SeriesParams>,
) -> Json<SeriesBody> {
  let index = &state.series;
  let points = index
    .get_series(&params.location, &params.indicator)
    .into_iter()
    .map(|p| PointBody {
      month_index: p.month_index,
      label:       p.month_index.to_string(),
      value:       p.value,
    })
    .collect();

  Json(SeriesBody {
    location_name: index.location_name(&params.location).to_owned(),
    value_label: value_label(&params.indicator),
    location: params.location,
    indicator: params.indicator,
    points,
  })
}
