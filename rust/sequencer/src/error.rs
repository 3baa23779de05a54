use thiserror::Error;
use xane_rollup::RollupError;

use crate::config::ConfigError;
use crate::snapshot::SnapshotError;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Rollup(#[from] RollupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rollup storage lock poisoned")]
    Poisoned,
}
