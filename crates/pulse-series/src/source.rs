//! Loading a [`SeriesIndex`] from a reader, a file, or an HTTP URL.

use std::{io::Read, path::Path};

use csv::{ReaderBuilder, StringRecord};

use crate::{
  Error, Result,
  index::{SeriesBuilder, SeriesIndex},
  ingest::{Columns, ObservationRow},
};

/// Stream CSV rows from `reader` into an index.
///
/// Rows that fail to decode or validate are dropped and counted. Only an
/// I/O failure or a header without the required columns aborts the load.
pub fn load<R: Read>(reader: R) -> Result<SeriesIndex> {
  let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
  let columns = Columns::from_headers(rdr.headers()?)?;

  let mut builder = SeriesBuilder::default();
  let mut record = StringRecord::new();
  loop {
    match rdr.read_record(&mut record) {
      Ok(false) => break,
      Ok(true) => {
        builder.push_row(&ObservationRow::from_record(&record, &columns));
      }
      Err(e) if e.is_io_error() => return Err(e.into()),
      Err(e) => {
        tracing::debug!(error = %e, "skipping undecodable row");
        builder.skip_row();
      }
    }
  }

  let index = builder.finish();
  let stats = index.stats();
  tracing::info!(
    rows = stats.rows_read,
    indexed = stats.rows_indexed,
    dropped = stats.rows_dropped,
    series = index.len(),
    "dataset indexed"
  );
  Ok(index)
}

/// Read and index a CSV file.
pub async fn load_path(path: impl AsRef<Path>) -> Result<SeriesIndex> {
  let bytes = tokio::fs::read(path).await?;
  load(bytes.as_slice())
}

/// Fetch and index a CSV served over HTTP.
pub async fn fetch(url: &str) -> Result<SeriesIndex> {
  let resp = reqwest::get(url).await?;
  let status = resp.status();
  if !status.is_success() {
    return Err(Error::Status { url: url.to_owned(), status: status.as_u16() });
  }
  let body = resp.bytes().await?;
  load(body.as_ref())
}

/// Index `source`, which is either an `http(s)://` URL or a file path.
pub async fn load_source(source: &str) -> Result<SeriesIndex> {
  if source.starts_with("http://") || source.starts_with("https://") {
    fetch(source).await
  } else {
    load_path(source).await
  }
}
