use std::{env, path::PathBuf};

use directories::BaseDirs;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::services::frequency_service::SummaryOptions;

const CONFIG: &str = include_str!("../.config/config.json5");

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the dashboard backend
    pub api_url: String,
    pub page_size: usize,
    pub request_timeout_secs: u64,
    pub top_k: usize,
    pub tied_shown: usize,
    pub include_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            page_size: 20,
            request_timeout_secs: 30,
            top_k: 10,
            tied_shown: 2,
            include_missing: true,
        }
    }
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref CONFIG_FILE: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

impl Config {
    /// The defaults shipped inside the binary
    pub fn embedded() -> Result<Self, json5::Error> {
        json5::from_str(CONFIG)
    }

    /// Layer embedded defaults, a JSON5 config file, and `SHEETVIEW_*` env vars
    ///
    /// An explicit `config_path` (or `SHEETVIEW_CONFIG`) must exist; the
    /// default `~/.sheetview-config.json5` is optional.
    pub fn from_path(config_path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let (selected_path, required) = match config_path.or(CONFIG_FILE.as_ref()) {
            Some(p) => (expand_tilde(p), true),
            None => (default_home_config_path(), false),
        };

        config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5))
            .add_source(
                config::File::from(selected_path)
                    .format(config::FileFormat::Json5)
                    .required(required),
            )
            .add_source(
                config::Environment::with_prefix(&PROJECT_NAME)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Options for column summaries
    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            include_missing: self.include_missing,
            top_k: self.top_k,
            tied_shown: self.tied_shown,
        }
    }

    /// Render the effective settings in the config file format
    pub fn to_json5(&self) -> String {
        json5::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Some(s) = path.to_str() {
        if s.starts_with('~') {
            if let Some(base) = BaseDirs::new() {
                return PathBuf::from(s.replacen('~', base.home_dir().to_str().unwrap_or(""), 1));
            }
        }
    }
    path.clone()
}

fn default_home_config_path() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        return base.home_dir().join(".sheetview-config.json5");
    }
    PathBuf::from(".sheetview-config.json5")
}
