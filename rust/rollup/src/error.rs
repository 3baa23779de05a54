use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::merkle::MerkleError;
use crate::signature::SignatureError;
use crate::store::StoreError;

/// Which of the three authenticated collections an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Balances,
    Pools,
    Liquidities,
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeKind::Balances => write!(f, "balances"),
            TreeKind::Pools => write!(f, "pools"),
            TreeKind::Liquidities => write!(f, "liquidities"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollupError {
    #[error("stale witness: {tree} root does not match the committed root")]
    RootMismatch { tree: TreeKind },
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("sender does not own the balance")]
    InvalidBalanceOwner,
    #[error("sender is not the liquidity provider")]
    InvalidLiquidityProvider,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient lp points")]
    InsufficientLpPoints,
    #[error("trade would drain the pool reserves")]
    InsufficientReserves,
    #[error("slippage limit exceeded")]
    LimitExceeded,
    #[error("token identifiers do not match")]
    InvalidTokenPair,
    #[error("{tree} slot is already occupied")]
    SlotNotEmpty { tree: TreeKind },
    #[error("pool does not exist")]
    EmptyPool,
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("{tree} witness points at slot {witness}, store expects slot {expected}")]
    SlotMismatch {
        tree: TreeKind,
        witness: u64,
        expected: u64,
    },
    #[error("rollup state is not synchronized with its stores")]
    Desynchronized,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}
