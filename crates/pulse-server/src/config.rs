//! Runtime configuration: an optional TOML file overlaid by `PULSE_*`
//! environment variables (`PULSE_STORE__PATH=/var/lib/pulse/poll.db`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_STATEMENT_ID: &str = "political-statement-v1";
const DEFAULT_STATEMENT_TEXT: &str = "Political statement: We should expand evidence-based \
                                      harm-reduction and treatment programs to address rising \
                                      drug overdose trends.";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:    String,
  #[serde(default = "default_port")]
  pub port:    u16,
  /// CSV file path or `http(s)://` URL.
  #[serde(default = "default_dataset")]
  pub dataset: String,
  /// Absent or with an empty path: voting is disabled.
  #[serde(default)]
  pub store:   Option<StoreConfig>,
  #[serde(default)]
  pub poll:    PollConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  #[serde(default)]
  pub path:              PathBuf,
  #[serde(default = "default_max_attempts")]
  pub max_attempts:      u32,
  /// How often to look for commits made by other processes, such as
  /// `pulse reconcile`.
  #[serde(default = "default_watch_interval_ms")]
  pub watch_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
  #[serde(default = "default_statement_id")]
  pub statement_id:   String,
  #[serde(default = "default_statement_text")]
  pub statement_text: String,
}

impl Default for PollConfig {
  fn default() -> Self {
    Self {
      statement_id:   default_statement_id(),
      statement_text: default_statement_text(),
    }
  }
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_dataset() -> String { "overdoseRates.csv".into() }
fn default_max_attempts() -> u32 { pulse_store_sqlite::DEFAULT_MAX_ATTEMPTS }
fn default_watch_interval_ms() -> u64 {
  pulse_store_sqlite::DEFAULT_WATCH_INTERVAL.as_millis() as u64
}
fn default_statement_id() -> String { DEFAULT_STATEMENT_ID.into() }
fn default_statement_text() -> String { DEFAULT_STATEMENT_TEXT.into() }

impl ServerConfig {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Config::builder()
      .add_source(File::from(path).required(false))
      .add_source(
        Environment::with_prefix("PULSE")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  /// The store to open, or `None` when voting is not configured.
  pub fn store(&self) -> Option<&StoreConfig> {
    self
      .store
      .as_ref()
      .filter(|s| !s.path.as_os_str().is_empty())
  }
}

impl StoreConfig {
  pub fn resolved_path(&self) -> PathBuf { expand_tilde(&self.path) }

  pub fn watch_interval(&self) -> Duration { Duration::from_millis(self.watch_interval_ms) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
