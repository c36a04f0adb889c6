use crate::index::types::clamp_shard_count;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "revhash";
const CONFIG_FILE: &str = "config.json";
const CORPUS_FILE: &str = "words.txt";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Corpus word list. Defaults to `words.txt` in the app data directory.
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,

    /// Number of index shards (rounded up to a power of two)
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Lines digested per parallel batch while building the index
    #[serde(default = "default_build_chunk_lines")]
    pub build_chunk_lines: usize,

    /// Worker threads for index builds. 0 uses rayon's global pool (one per CPU).
    #[serde(default)]
    pub build_threads: usize,

    /// fsync the corpus after every append
    #[serde(default = "default_sync_on_append")]
    pub sync_on_append: bool,

    /// Override for the server socket path
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

fn default_shard_count() -> usize {
    64
}

fn default_build_chunk_lines() -> usize {
    64 * 1024
}

fn default_sync_on_append() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            shard_count: default_shard_count(),
            build_chunk_lines: default_build_chunk_lines(),
            build_threads: 0,
            sync_on_append: default_sync_on_append(),
            socket_path: None,
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load config from an explicit file, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            let config: AppConfig = serde_json::from_str(&content)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the app data directory
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;
        self.save_to(&config_path)
    }

    /// Save config to an explicit file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file {}", config_path.display()))?;
        Ok(())
    }

    /// Resolve the corpus path, falling back to the app data directory
    pub fn resolve_corpus_path(&self) -> Result<PathBuf> {
        match &self.corpus_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_app_data_dir()?.join(CORPUS_FILE)),
        }
    }

    /// Shard count rounded up to a power of two, at most `MAX_SHARDS`
    pub fn effective_shard_count(&self) -> usize {
        clamp_shard_count(self.shard_count)
    }

    /// Build chunk size, never zero
    pub fn effective_build_chunk_lines(&self) -> usize {
        self.build_chunk_lines.max(1)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}
