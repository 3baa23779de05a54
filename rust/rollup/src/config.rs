use thiserror::Error;

use crate::error::TreeKind;
use crate::merkle::{MAX_TREE_HEIGHT, MIN_TREE_HEIGHT};
use crate::types::Amount;

pub const DEFAULT_TREE_HEIGHT: usize = 10;
pub const DEFAULT_INITIAL_LP_POINTS: Amount = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{tree} tree height {height} outside {min}..={max}")]
    TreeHeight {
        tree: TreeKind,
        height: usize,
        min: usize,
        max: usize,
    },
    #[error("initial lp points must be non-zero")]
    ZeroInitialLpPoints,
}

/// Construction parameters of one rollup instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupConfig {
    pub balances_height: usize,
    pub pools_height: usize,
    pub liquidities_height: usize,
    /// LP points minted to the creator of a new pool.
    pub initial_lp_points: Amount,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            balances_height: DEFAULT_TREE_HEIGHT,
            pools_height: DEFAULT_TREE_HEIGHT,
            liquidities_height: DEFAULT_TREE_HEIGHT,
            initial_lp_points: DEFAULT_INITIAL_LP_POINTS,
        }
    }
}

impl RollupConfig {
    pub fn with_height(height: usize) -> Self {
        Self {
            balances_height: height,
            pools_height: height,
            liquidities_height: height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (tree, height) in [
            (TreeKind::Balances, self.balances_height),
            (TreeKind::Pools, self.pools_height),
            (TreeKind::Liquidities, self.liquidities_height),
        ] {
            if !(MIN_TREE_HEIGHT..=MAX_TREE_HEIGHT).contains(&height) {
                return Err(ConfigError::TreeHeight {
                    tree,
                    height,
                    min: MIN_TREE_HEIGHT,
                    max: MAX_TREE_HEIGHT,
                });
            }
        }
        if self.initial_lp_points == 0 {
            return Err(ConfigError::ZeroInitialLpPoints);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(RollupConfig::default().validate(), Ok(()));
        assert_eq!(RollupConfig::default().initial_lp_points, 65535);
    }

    #[test]
    fn rejects_short_trees() {
        let config = RollupConfig {
            pools_height: 1,
            ..RollupConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TreeHeight {
                tree: TreeKind::Pools,
                height: 1,
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_lp_supply() {
        let config = RollupConfig {
            initial_lp_points: 0,
            ..RollupConfig::with_height(4)
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInitialLpPoints));
    }
}
