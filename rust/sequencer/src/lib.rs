//! Sequencer side of the xane rollup: a lock-guarded storage front,
//! JSON snapshots and TOML configuration.

mod config;
mod error;
mod sequencer;
mod snapshot;
pub mod telemetry;
mod utils;

pub use config::{ConfigError, SequencerConfig, CONFIG_ENV};
pub use error::SequencerError;
pub use sequencer::Sequencer;
pub use snapshot::{
    BalanceEntry, LiquidityEntry, PoolEntry, Snapshot, SnapshotError, StateEntry,
};
pub use utils::{format_felt, parse_amount, parse_felt};
