//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available;
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

use crate::feed::Category;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // YouTube Data API
  pub api_base: String,
  pub api_key_env: String,
  /// Result cap sent as `maxResults` and enforced on every parsed set.
  pub max_results: usize,
  pub default_region_code: String,
  pub music_category_id: String,

  // Start-up shelves
  pub categories: Vec<Category>,
  pub feed_concurrency: usize,

  // Player widget (mpv)
  pub mpv_binary: String,
  pub watch_url_base: String,
  pub widget_ready_timeout_ms: u64,

  // UI
  pub error_banner_secs: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
