//! Single-writer front of the rollup storage.
//!
//! Lookups and request preparation share a read lock. Every transition
//! holds the write lock for its whole read-modify-commit sequence, so
//! transitions apply in a total order and each one sees the roots the
//! previous one committed.

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};
use xane_rollup::{
    AddLiquidity, Address, Amount, Balance, BalanceKey, BalanceUpdate, Buy, CreatePool, Felt,
    LiquidityOutcome, LiquidityPosition, PairKey, Pool, PoolCreation, PositionKey,
    RemoveLiquidity, RollupConfig, RollupError, RollupState, RollupStorage, Sell, Signed,
    SwapOutcome, TokenId,
};

use crate::config::SequencerConfig;
use crate::error::SequencerError;
use crate::snapshot::Snapshot;
use crate::utils::format_felt;

pub struct Sequencer {
    storage: RwLock<RollupStorage>,
    snapshot_path: PathBuf,
}

impl Sequencer {
    pub fn new(storage: RollupStorage, snapshot_path: PathBuf) -> Self {
        Self {
            storage: RwLock::new(storage),
            snapshot_path,
        }
    }

    /// Restores from the configured snapshot, or starts empty when none
    /// has been written yet.
    pub fn open(config: &SequencerConfig) -> Result<Self, SequencerError> {
        let storage = if config.snapshot_path.try_exists()? {
            let storage = Snapshot::load(&config.snapshot_path)?.into_storage(config.rollup)?;
            info!(
                path = %config.snapshot_path.display(),
                balances = storage.balances().len(),
                pools = storage.pools().len(),
                liquidities = storage.liquidities().len(),
                "rollup storage restored"
            );
            storage
        } else {
            info!(path = %config.snapshot_path.display(), "no snapshot, starting empty");
            RollupStorage::empty(config.rollup)?
        };
        Ok(Self::new(storage, config.snapshot_path.clone()))
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn config(&self) -> Result<RollupConfig, SequencerError> {
        Ok(*self.read()?.config())
    }

    pub fn state(&self) -> Result<RollupState, SequencerError> {
        Ok(*self.read()?.state()?)
    }

    pub fn commitment(&self) -> Result<Felt, SequencerError> {
        Ok(self.state()?.commitment())
    }

    pub fn balance(&self, key: &BalanceKey) -> Result<Balance, SequencerError> {
        Ok(self.read()?.balance_or_unfunded(key))
    }

    pub fn pool(&self, pair: &PairKey) -> Result<Pool, SequencerError> {
        Ok(*self.read()?.pools().get(pair).map_err(RollupError::from)?)
    }

    pub fn position(&self, key: &PositionKey) -> Result<LiquidityPosition, SequencerError> {
        Ok(*self.read()?.liquidities().get(key).map_err(RollupError::from)?)
    }

    pub fn prepare_create_pool(
        &self,
        sender: Address,
        base_token_id: TokenId,
        quote_token_id: TokenId,
        base_token_amount: Amount,
        quote_token_amount: Amount,
    ) -> Result<CreatePool, SequencerError> {
        Ok(self.read()?.prepare_create_pool(
            sender,
            base_token_id,
            quote_token_id,
            base_token_amount,
            quote_token_amount,
        )?)
    }

    pub fn prepare_add_liquidity(
        &self,
        sender: Address,
        pair: &PairKey,
        base_token_amount: Amount,
        quote_token_amount_max_limit: Amount,
    ) -> Result<AddLiquidity, SequencerError> {
        Ok(self.read()?.prepare_add_liquidity(
            sender,
            pair,
            base_token_amount,
            quote_token_amount_max_limit,
        )?)
    }

    pub fn prepare_remove_liquidity(
        &self,
        sender: Address,
        pair: &PairKey,
        lp_points: Amount,
        base_token_amount_min_limit: Amount,
        quote_token_amount_min_limit: Amount,
    ) -> Result<RemoveLiquidity, SequencerError> {
        Ok(self.read()?.prepare_remove_liquidity(
            sender,
            pair,
            lp_points,
            base_token_amount_min_limit,
            quote_token_amount_min_limit,
        )?)
    }

    pub fn prepare_buy(
        &self,
        sender: Address,
        pair: &PairKey,
        base_token_amount: Amount,
        quote_token_amount_max_limit: Amount,
    ) -> Result<Buy, SequencerError> {
        Ok(self.read()?.prepare_buy(
            sender,
            pair,
            base_token_amount,
            quote_token_amount_max_limit,
        )?)
    }

    pub fn prepare_sell(
        &self,
        sender: Address,
        pair: &PairKey,
        base_token_amount: Amount,
        quote_token_amount_min_limit: Amount,
    ) -> Result<Sell, SequencerError> {
        Ok(self.read()?.prepare_sell(
            sender,
            pair,
            base_token_amount,
            quote_token_amount_min_limit,
        )?)
    }

    pub fn deposit(
        &self,
        key: &BalanceKey,
        amount: Amount,
    ) -> Result<BalanceUpdate, SequencerError> {
        self.transition("deposit", |storage| storage.deposit(key, amount))
    }

    pub fn withdraw(
        &self,
        key: &BalanceKey,
        amount: Amount,
    ) -> Result<BalanceUpdate, SequencerError> {
        self.transition("withdraw", |storage| storage.withdraw(key, amount))
    }

    pub fn create_pool(
        &self,
        request: &Signed<CreatePool>,
    ) -> Result<PoolCreation, SequencerError> {
        self.transition("create_pool", |storage| storage.apply_create_pool(request))
    }

    pub fn add_liquidity(
        &self,
        request: &Signed<AddLiquidity>,
    ) -> Result<LiquidityOutcome, SequencerError> {
        self.transition("add_liquidity", |storage| storage.apply_add_liquidity(request))
    }

    pub fn remove_liquidity(
        &self,
        request: &Signed<RemoveLiquidity>,
    ) -> Result<LiquidityOutcome, SequencerError> {
        self.transition("remove_liquidity", |storage| {
            storage.apply_remove_liquidity(request)
        })
    }

    pub fn buy(&self, request: &Signed<Buy>) -> Result<SwapOutcome, SequencerError> {
        self.transition("buy", |storage| storage.apply_buy(request))
    }

    pub fn sell(&self, request: &Signed<Sell>) -> Result<SwapOutcome, SequencerError> {
        self.transition("sell", |storage| storage.apply_sell(request))
    }

    pub fn snapshot(&self) -> Result<Snapshot, SequencerError> {
        let storage = self.read()?;
        Ok(Snapshot::from_storage(&storage)?)
    }

    /// Persists the current stores to the configured snapshot path. Holds
    /// the read lock while writing so the file matches one committed state.
    pub fn save(&self) -> Result<(), SequencerError> {
        let storage = self.read()?;
        Snapshot::from_storage(&storage)?.save(&self.snapshot_path)?;
        info!(
            path = %self.snapshot_path.display(),
            commitment = %format_felt(&storage.state()?.commitment()),
            "snapshot saved"
        );
        Ok(())
    }

    fn transition<T>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut RollupStorage) -> Result<T, RollupError>,
    ) -> Result<T, SequencerError> {
        let mut storage = self.write()?;
        match apply(&mut *storage) {
            Ok(outcome) => {
                let state = storage.state()?;
                info!(
                    op,
                    balances_root = %format_felt(&state.balances_root),
                    pools_root = %format_felt(&state.pools_root),
                    liquidities_root = %format_felt(&state.liquidities_root),
                    "transition applied"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(op, error = %err, "transition rejected");
                Err(err.into())
            }
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RollupStorage>, SequencerError> {
        self.storage.read().map_err(|_| SequencerError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RollupStorage>, SequencerError> {
        self.storage.write().map_err(|_| SequencerError::Poisoned)
    }
}
