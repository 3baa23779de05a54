//! Xane rollup core: Merkle-authenticated balances, pools and liquidity
//! positions, and the constant-product AMM transitions over them.

pub mod amm;
mod config;
mod double_witness;
mod error;
mod merkle;
mod record;
mod request;
mod signature;
mod state;
mod storage;
mod store;
mod types;

pub use config::{ConfigError, RollupConfig, DEFAULT_INITIAL_LP_POINTS, DEFAULT_TREE_HEIGHT};
pub use double_witness::{maybe_swap, MerkleDoubleWitness};
pub use error::{RollupError, TreeKind};
pub use merkle::{MerkleError, MerkleTree, MerkleWitness, MAX_TREE_HEIGHT, MIN_TREE_HEIGHT};
pub use record::{
    Balance, BalanceKey, LiquidityPosition, PairKey, Pool, PositionKey, Record,
};
pub use request::{AddLiquidity, Buy, CreatePool, Payload, RemoveLiquidity, Sell, Signed};
pub use signature::{message_hash, verify, Keypair, Signature, SignatureError};
pub use state::{BalanceUpdate, LiquidityOutcome, PoolCreation, RollupState, SwapOutcome};
pub use storage::RollupStorage;
pub use store::{BalanceStore, CollectionStore, LiquidityStore, PoolStore, StoreError};
pub use types::{Address, Amount, Felt, TokenId, EMPTY_LEAF};
