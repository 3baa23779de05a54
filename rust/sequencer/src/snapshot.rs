//! JSON persistence of the three stores plus the last committed roots.
//!
//! Records are written in slot order. Restoring replays them through
//! `RollupStorage::restore` and refuses the snapshot unless every rebuilt
//! root equals the persisted one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use xane_rollup::{
    Balance, LiquidityPosition, Pool, RollupConfig, RollupError, RollupState, RollupStorage,
    TreeKind,
};

use crate::utils::{format_felt, parse_amount, parse_felt};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid field element: {0}")]
    InvalidFelt(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("rebuilt {tree} root does not match the snapshot")]
    RootMismatch { tree: TreeKind },
    #[error("failed to access snapshot {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rollup(#[from] RollupError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub balances_root: String,
    pub pools_root: String,
    pub liquidities_root: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub token_id: String,
    pub owner: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub base_token_id: String,
    pub quote_token_id: String,
    pub base_token_amount: String,
    pub quote_token_amount: String,
    pub k: String,
    pub lp_points: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityEntry {
    pub base_token_id: String,
    pub quote_token_id: String,
    pub provider: String,
    pub lp_points: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: StateEntry,
    pub balances: Vec<BalanceEntry>,
    pub pools: Vec<PoolEntry>,
    pub liquidities: Vec<LiquidityEntry>,
}

impl Snapshot {
    pub fn from_storage(storage: &RollupStorage) -> Result<Self, SnapshotError> {
        let state = storage.state()?;
        Ok(Self {
            state: StateEntry {
                balances_root: format_felt(&state.balances_root),
                pools_root: format_felt(&state.pools_root),
                liquidities_root: format_felt(&state.liquidities_root),
            },
            balances: storage
                .balances()
                .records()
                .iter()
                .map(BalanceEntry::from)
                .collect(),
            pools: storage.pools().records().iter().map(PoolEntry::from).collect(),
            liquidities: storage
                .liquidities()
                .records()
                .iter()
                .map(LiquidityEntry::from)
                .collect(),
        })
    }

    pub fn into_storage(self, config: RollupConfig) -> Result<RollupStorage, SnapshotError> {
        let expected = RollupState::new(
            parse_felt(&self.state.balances_root)?,
            parse_felt(&self.state.pools_root)?,
            parse_felt(&self.state.liquidities_root)?,
        );
        let balances = self
            .balances
            .iter()
            .map(BalanceEntry::to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let pools = self
            .pools
            .iter()
            .map(PoolEntry::to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let liquidities = self
            .liquidities
            .iter()
            .map(LiquidityEntry::to_record)
            .collect::<Result<Vec<_>, _>>()?;

        let storage = RollupStorage::restore(config, balances, pools, liquidities)?;
        let rebuilt = storage.state()?;
        for (tree, rebuilt, expected) in [
            (TreeKind::Balances, rebuilt.balances_root, expected.balances_root),
            (TreeKind::Pools, rebuilt.pools_root, expected.pools_root),
            (TreeKind::Liquidities, rebuilt.liquidities_root, expected.liquidities_root),
        ] {
            if rebuilt != expected {
                return Err(SnapshotError::RootMismatch { tree });
            }
        }
        Ok(storage)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        debug!(
            path = %path.display(),
            balances = snapshot.balances.len(),
            pools = snapshot.pools.len(),
            liquidities = snapshot.liquidities.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Writes to a sibling temp file first so a crash never leaves a
    /// truncated snapshot behind.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let contents = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        let io_err = |source: std::io::Error| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }
}

impl From<&Balance> for BalanceEntry {
    fn from(balance: &Balance) -> Self {
        Self {
            token_id: format_felt(&balance.token_id),
            owner: format_felt(&balance.owner),
            amount: balance.amount.to_string(),
        }
    }
}

impl BalanceEntry {
    fn to_record(&self) -> Result<Balance, SnapshotError> {
        Ok(Balance::new(
            parse_felt(&self.token_id)?,
            parse_felt(&self.owner)?,
            parse_amount(&self.amount)?,
        ))
    }
}

impl From<&Pool> for PoolEntry {
    fn from(pool: &Pool) -> Self {
        Self {
            base_token_id: format_felt(&pool.base_token_id),
            quote_token_id: format_felt(&pool.quote_token_id),
            base_token_amount: pool.base_token_amount.to_string(),
            quote_token_amount: pool.quote_token_amount.to_string(),
            k: pool.k.to_string(),
            lp_points: pool.lp_points.to_string(),
        }
    }
}

impl PoolEntry {
    fn to_record(&self) -> Result<Pool, SnapshotError> {
        Ok(Pool {
            base_token_id: parse_felt(&self.base_token_id)?,
            quote_token_id: parse_felt(&self.quote_token_id)?,
            base_token_amount: parse_amount(&self.base_token_amount)?,
            quote_token_amount: parse_amount(&self.quote_token_amount)?,
            k: parse_amount(&self.k)?,
            lp_points: parse_amount(&self.lp_points)?,
        })
    }
}

impl From<&LiquidityPosition> for LiquidityEntry {
    fn from(position: &LiquidityPosition) -> Self {
        Self {
            base_token_id: format_felt(&position.base_token_id),
            quote_token_id: format_felt(&position.quote_token_id),
            provider: format_felt(&position.provider),
            lp_points: position.lp_points.to_string(),
        }
    }
}

impl LiquidityEntry {
    fn to_record(&self) -> Result<LiquidityPosition, SnapshotError> {
        Ok(LiquidityPosition {
            base_token_id: parse_felt(&self.base_token_id)?,
            quote_token_id: parse_felt(&self.quote_token_id)?,
            provider: parse_felt(&self.provider)?,
            lp_points: parse_amount(&self.lp_points)?,
        })
    }
}
