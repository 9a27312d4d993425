//! Series indexer for the overdose-statistics CSV export.
//!
//! Rows are streamed once into a [`SeriesIndex`]: `(location, indicator)` →
//! month → value. Malformed rows are skipped and counted rather than
//! failing the load; only an unreadable source is an error.

mod ingest;
mod index;
mod source;

pub mod error;

pub use error::{Error, Result};
pub use index::{IngestStats, SeriesBuilder, SeriesIndex};
pub use ingest::{Observation, ObservationRow, parse_number};
pub use source::{fetch, load, load_path, load_source};
