use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::constants::constants;

const APP_NAME: &str = "musictube";

/// User preferences persisted in `<config dir>/prefs.toml`.
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq)]
pub struct Config {
  pub theme_name: Option<String>,
  /// ISO-3166 region for the popular chart.
  pub region_code: Option<String>,
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(&config_file) {
        match toml::from_str(&content) {
          Ok(config) => return config,
          Err(e) => warn!(err = %e, path = %config_file.display(), "config: ignoring unreadable prefs"),
        }
      }
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        let config_file = config_dir.join("prefs.toml");
        if let Ok(content) = toml::to_string(self) {
          let _ = std::fs::write(config_file, content);
        }
      }
    }
  }
}

/// Directory for the rolling log file.
pub fn log_dir() -> PathBuf {
  ProjectDirs::from("", "", APP_NAME)
    .map(|dirs| dirs.data_local_dir().join("logs"))
    .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

/// Read the Data API key from the process environment.
pub fn api_key() -> Option<String> {
  api_key_with(|name| std::env::var(name).ok())
}

fn api_key_with(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
  lookup(&constants().api_key_env).map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

/// Pick the chart region: command line, then prefs, then the built-in default.
/// Anything that is not a two-letter code is skipped.
pub fn resolve_region(cli: Option<&str>, config: &Config) -> String {
  [cli, config.region_code.as_deref()]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|code| code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
    .map(|code| code.to_ascii_uppercase())
    .unwrap_or_else(|| constants().default_region_code.clone())
}
