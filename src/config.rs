use crate::error::Result;
use crate::search::{SearchSettings, DEFAULT_PROGRESS_INTERVAL, DEFAULT_STOP_POLL_INTERVAL};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// --- Configuration (Data-Driven) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Item / gacha master tables.
    pub master_path: String,
    /// "en" or "ja"; falls back to $LANG when unset.
    pub language: Option<String>,
    pub worker_max_threads: usize,
    pub worker_reserve_cores: usize,
    pub worker_stack_size_mb: usize,
    /// Partitions per search; 0 means one per pool thread.
    pub search_workers: usize,
    pub progress_interval: u64,
    pub stop_poll_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            master_path: "data/master.json".to_string(),
            language: None,
            worker_max_threads: 0,
            worker_reserve_cores: 1,
            worker_stack_size_mb: 4,
            search_workers: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            stop_poll_interval: DEFAULT_STOP_POLL_INTERVAL,
        }
    }
}

impl Config {
    /// Reads `path`, or `../../path` when run from a target directory.
    /// A missing file is not an error: defaults are used.
    pub fn load(path: &str) -> Result<Self> {
        match read_with_fallback(path) {
            Some((found_at, contents)) => {
                let config = Self::from_json(&contents)?;
                info!("[System] Config loaded from {}", found_at);
                Ok(config)
            }
            None => {
                warn!(
                    "[System] Config not found at './{}' or '../../{}', using defaults",
                    path, path
                );
                Ok(Config::default())
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            progress_interval: self.progress_interval.max(1),
            stop_poll_interval: self.stop_poll_interval.max(1),
        }
    }
}

/// Returns the path that was read and its contents.
pub fn read_with_fallback(path: &str) -> Option<(String, String)> {
    let alt = format!("../../{}", path);
    [path.to_string(), alt]
        .into_iter()
        .filter(|p| Path::new(p).is_file())
        .find_map(|p| fs::read_to_string(&p).ok().map(|contents| (p, contents)))
}
