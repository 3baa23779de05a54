use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use xane_rollup::{RollupConfig, DEFAULT_INITIAL_LP_POINTS, DEFAULT_TREE_HEIGHT};

pub const CONFIG_ENV: &str = "XANE_SEQUENCER_CONFIG";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Rollup(#[from] xane_rollup::ConfigError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    tree_height: Option<usize>,
    balances_height: Option<usize>,
    pools_height: Option<usize>,
    liquidities_height: Option<usize>,
    initial_lp_points: Option<u64>,
    snapshot_path: String,
    log_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub rollup: RollupConfig,
    pub snapshot_path: PathBuf,
    pub log_filter: String,
}

impl SequencerConfig {
    /// Path named by `XANE_SEQUENCER_CONFIG`, else `config.toml`.
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_toml(&contents, &base_dir)
    }

    /// Parses and validates `contents`; relative paths resolve against
    /// `base_dir`.
    pub fn from_toml(contents: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;
        finalize_config(raw, base_dir)
    }
}

fn finalize_config(raw: RawConfig, base_dir: &Path) -> Result<SequencerConfig, ConfigError> {
    let height = raw.tree_height.unwrap_or(DEFAULT_TREE_HEIGHT);
    let rollup = RollupConfig {
        balances_height: raw.balances_height.unwrap_or(height),
        pools_height: raw.pools_height.unwrap_or(height),
        liquidities_height: raw.liquidities_height.unwrap_or(height),
        initial_lp_points: raw.initial_lp_points.unwrap_or(DEFAULT_INITIAL_LP_POINTS),
    };
    rollup.validate()?;

    if raw.snapshot_path.trim().is_empty() {
        return Err(ConfigError::Invalid("snapshot_path must not be empty".into()));
    }
    let log_filter = raw
        .log_filter
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    Ok(SequencerConfig {
        rollup,
        snapshot_path: resolve_path(base_dir, &raw.snapshot_path),
        log_filter,
    })
}

fn resolve_path(base: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
