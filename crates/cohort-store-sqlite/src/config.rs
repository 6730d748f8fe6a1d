//! Store configuration.
//!
//! Read from an optional TOML file, overridden by `COHORT_*` environment
//! variables (`COHORT_PATH`, `COHORT_ACTOR`, `COHORT_BUSY_TIMEOUT_MS`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Path given to open an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Database file, or `:memory:`.
  #[serde(default = "default_path")]
  pub path:            PathBuf,
  /// User recorded in audit columns and history rows.
  #[serde(default = "default_actor")]
  pub actor:           String,
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms: u64,
}

fn default_path() -> PathBuf { PathBuf::from(IN_MEMORY) }

fn default_actor() -> String { "system".into() }

fn default_busy_timeout_ms() -> u64 { 5_000 }

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      path:            default_path(),
      actor:           default_actor(),
      busy_timeout_ms: default_busy_timeout_ms(),
    }
  }
}

impl StoreConfig {
  /// Load from `file` (if given and present) layered under the environment.
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("COHORT"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn is_in_memory(&self) -> bool { self.path.as_os_str() == IN_MEMORY }
}
