//! The three collection stores plus the committed `RollupState`.
//!
//! Mutating any store leaves the aggregate dirty until `update_state`
//! copies the store roots back into the state; a dirty state is never
//! handed out. The `apply_*` methods run a transition against the committed
//! state, persist its records, resynchronize and check that the stores
//! reproduce the roots the transition returned.

use tracing::{debug, warn};

use crate::config::RollupConfig;
use crate::double_witness::MerkleDoubleWitness;
use crate::error::{RollupError, TreeKind};
use crate::merkle::MerkleWitness;
use crate::record::{Balance, BalanceKey, LiquidityPosition, PairKey, Pool, PositionKey, Record};
use crate::request::{AddLiquidity, Buy, CreatePool, RemoveLiquidity, Sell, Signed};
use crate::state::{BalanceUpdate, LiquidityOutcome, PoolCreation, RollupState, SwapOutcome};
use crate::store::{BalanceStore, LiquidityStore, PoolStore};
use crate::types::{Address, Amount, TokenId};

#[derive(Debug, Clone)]
pub struct RollupStorage {
    config: RollupConfig,
    state: RollupState,
    balances: BalanceStore,
    pools: PoolStore,
    liquidities: LiquidityStore,
    dirty: bool,
}

impl RollupStorage {
    pub fn empty(config: RollupConfig) -> Result<Self, RollupError> {
        Self::restore(config, Vec::new(), Vec::new(), Vec::new())
    }

    /// Replays every record into its store in the given order and derives
    /// the state from the rebuilt roots.
    pub fn restore(
        config: RollupConfig,
        balances: Vec<Balance>,
        pools: Vec<Pool>,
        liquidities: Vec<LiquidityPosition>,
    ) -> Result<Self, RollupError> {
        config.validate()?;
        let balances = BalanceStore::restore(config.balances_height, balances)?;
        let pools = PoolStore::restore(config.pools_height, pools)?;
        let liquidities = LiquidityStore::restore(config.liquidities_height, liquidities)?;
        let state = RollupState::new(balances.root(), pools.root(), liquidities.root());
        Ok(Self {
            config,
            state,
            balances,
            pools,
            liquidities,
            dirty: false,
        })
    }

    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    pub fn state(&self) -> Result<&RollupState, RollupError> {
        if self.dirty {
            return Err(RollupError::Desynchronized);
        }
        Ok(&self.state)
    }

    pub fn is_synchronized(&self) -> bool {
        !self.dirty
    }

    pub fn update_state(&mut self) {
        self.state = RollupState::new(
            self.balances.root(),
            self.pools.root(),
            self.liquidities.root(),
        );
        self.dirty = false;
    }

    pub fn balances(&self) -> &BalanceStore {
        &self.balances
    }

    pub fn pools(&self) -> &PoolStore {
        &self.pools
    }

    pub fn liquidities(&self) -> &LiquidityStore {
        &self.liquidities
    }

    pub fn balances_mut(&mut self) -> &mut BalanceStore {
        self.dirty = true;
        &mut self.balances
    }

    pub fn pools_mut(&mut self) -> &mut PoolStore {
        self.dirty = true;
        &mut self.pools
    }

    pub fn liquidities_mut(&mut self) -> &mut LiquidityStore {
        self.dirty = true;
        &mut self.liquidities
    }

    pub fn store_balance(&mut self, balance: Balance) -> Result<usize, RollupError> {
        Ok(self.balances_mut().upsert(balance)?)
    }

    pub fn store_pool(&mut self, pool: Pool) -> Result<usize, RollupError> {
        Ok(self.pools_mut().upsert(pool)?)
    }

    pub fn store_liquidity(&mut self, position: LiquidityPosition) -> Result<usize, RollupError> {
        Ok(self.liquidities_mut().upsert(position)?)
    }

    /// Stored balance for `key`, or an unfunded one when none exists yet.
    pub fn balance_or_unfunded(&self, key: &BalanceKey) -> Balance {
        self.balances
            .get(key)
            .copied()
            .unwrap_or_else(|_| Balance::unfunded(*key))
    }

    pub fn balance_witness(
        &self,
        key: &BalanceKey,
    ) -> Result<(Balance, MerkleWitness), RollupError> {
        let witness = self.balances.witness_or_next_slot(key)?;
        Ok((self.balance_or_unfunded(key), witness))
    }

    /// Both balances of a pool operation with their paired witness. Either
    /// balance may be missing, in which case it is proven at the next slot.
    pub fn balance_pair(
        &self,
        base: &BalanceKey,
        quote: &BalanceKey,
    ) -> Result<(Balance, Balance, MerkleDoubleWitness), RollupError> {
        let (base_balance, base_witness) = self.balance_witness(base)?;
        let (quote_balance, quote_witness) = self.balance_witness(quote)?;
        let witness = MerkleDoubleWitness::new(base_witness, quote_witness)?;
        Ok((base_balance, quote_balance, witness))
    }

    pub fn pool_witness(&self, pair: &PairKey) -> Result<(Pool, MerkleWitness), RollupError> {
        let pool = *self.pools.get(pair)?;
        Ok((pool, self.pools.witness_for(pair)?))
    }

    /// Stored position, or `LiquidityPosition::empty()` proven at the next
    /// slot when the provider has none.
    pub fn position_witness(
        &self,
        key: &PositionKey,
    ) -> Result<(LiquidityPosition, MerkleWitness), RollupError> {
        let position = self
            .liquidities
            .get(key)
            .copied()
            .unwrap_or_else(|_| LiquidityPosition::empty());
        Ok((position, self.liquidities.witness_or_next_slot(key)?))
    }

    pub fn prepare_create_pool(
        &self,
        sender: Address,
        base_token_id: TokenId,
        quote_token_id: TokenId,
        base_token_amount: Amount,
        quote_token_amount: Amount,
    ) -> Result<CreatePool, RollupError> {
        if self.pools.index_of(&PairKey::new(base_token_id, quote_token_id)).is_some() {
            return Err(RollupError::SlotNotEmpty {
                tree: TreeKind::Pools,
            });
        }
        let (base_balance, quote_balance, balances_witness) = self.balance_pair(
            &balance_key(base_token_id, sender),
            &balance_key(quote_token_id, sender),
        )?;
        Ok(CreatePool {
            base_token_amount,
            quote_token_amount,
            base_balance,
            quote_balance,
            balances_witness,
            pool_witness: self.pools.witness_for_next_slot()?,
            liquidity_witness: self.liquidities.witness_for_next_slot()?,
        })
    }

    pub fn prepare_add_liquidity(
        &self,
        sender: Address,
        pair: &PairKey,
        base_token_amount: Amount,
        quote_token_amount_max_limit: Amount,
    ) -> Result<AddLiquidity, RollupError> {
        let (pool, pool_witness) = self.pool_witness(pair)?;
        let (base_balance, quote_balance, balances_witness) = self.balance_pair(
            &balance_key(pool.base_token_id, sender),
            &balance_key(pool.quote_token_id, sender),
        )?;
        let (position, liquidity_witness) = self.position_witness(&position_key(&pool, sender))?;
        Ok(AddLiquidity {
            base_token_amount,
            quote_token_amount_max_limit,
            base_balance,
            quote_balance,
            pool,
            position,
            balances_witness,
            pool_witness,
            liquidity_witness,
        })
    }

    pub fn prepare_remove_liquidity(
        &self,
        sender: Address,
        pair: &PairKey,
        lp_points: Amount,
        base_token_amount_min_limit: Amount,
        quote_token_amount_min_limit: Amount,
    ) -> Result<RemoveLiquidity, RollupError> {
        let (pool, pool_witness) = self.pool_witness(pair)?;
        let (base_balance, quote_balance, balances_witness) = self.balance_pair(
            &balance_key(pool.base_token_id, sender),
            &balance_key(pool.quote_token_id, sender),
        )?;
        let key = position_key(&pool, sender);
        let position = *self.liquidities.get(&key)?;
        Ok(RemoveLiquidity {
            lp_points,
            base_token_amount_min_limit,
            quote_token_amount_min_limit,
            base_balance,
            quote_balance,
            pool,
            position,
            balances_witness,
            pool_witness,
            liquidity_witness: self.liquidities.witness_for(&key)?,
        })
    }

    pub fn prepare_buy(
        &self,
        sender: Address,
        pair: &PairKey,
        base_token_amount: Amount,
        quote_token_amount_max_limit: Amount,
    ) -> Result<Buy, RollupError> {
        let (pool, pool_witness) = self.pool_witness(pair)?;
        let (base_balance, quote_balance, balances_witness) = self.balance_pair(
            &balance_key(pool.base_token_id, sender),
            &balance_key(pool.quote_token_id, sender),
        )?;
        Ok(Buy {
            base_token_amount,
            quote_token_amount_max_limit,
            base_balance,
            quote_balance,
            pool,
            balances_witness,
            pool_witness,
        })
    }

    pub fn prepare_sell(
        &self,
        sender: Address,
        pair: &PairKey,
        base_token_amount: Amount,
        quote_token_amount_min_limit: Amount,
    ) -> Result<Sell, RollupError> {
        let (pool, pool_witness) = self.pool_witness(pair)?;
        let (base_balance, quote_balance, balances_witness) = self.balance_pair(
            &balance_key(pool.base_token_id, sender),
            &balance_key(pool.quote_token_id, sender),
        )?;
        Ok(Sell {
            base_token_amount,
            quote_token_amount_min_limit,
            base_balance,
            quote_balance,
            pool,
            balances_witness,
            pool_witness,
        })
    }

    pub fn deposit(
        &mut self,
        key: &BalanceKey,
        amount: Amount,
    ) -> Result<BalanceUpdate, RollupError> {
        let state = *self.state()?;
        let (balance, witness) = self.balance_witness(key)?;
        let update = state.add_balance(amount, &balance, &witness)?;
        self.persist_balance(update)
    }

    pub fn withdraw(
        &mut self,
        key: &BalanceKey,
        amount: Amount,
    ) -> Result<BalanceUpdate, RollupError> {
        let state = *self.state()?;
        let balance = *self.balances.get(key)?;
        let witness = self.balances.witness_for(key)?;
        let update = state.sub_balance(amount, &balance, &witness)?;
        self.persist_balance(update)
    }

    pub fn apply_create_pool(
        &mut self,
        request: &Signed<CreatePool>,
    ) -> Result<PoolCreation, RollupError> {
        let state = *self.state()?;
        let req = &request.payload;
        let pair = PairKey::new(req.base_balance.token_id, req.quote_balance.token_id);
        if self.pools.index_of(&pair).is_some() {
            return Err(RollupError::SlotNotEmpty {
                tree: TreeKind::Pools,
            });
        }
        let outcome = state.create_pool(request, self.config.initial_lp_points)?;
        self.check_balance_slots(
            &req.balances_witness,
            &outcome.base_balance,
            &outcome.quote_balance,
        )?;
        expect_slot(
            TreeKind::Pools,
            &req.pool_witness,
            self.pools.slot_for(&outcome.pool.key()),
        )?;
        expect_slot(
            TreeKind::Liquidities,
            &req.liquidity_witness,
            self.liquidities.slot_for(&outcome.position.key()),
        )?;

        self.store_balance(outcome.base_balance)?;
        self.store_balance(outcome.quote_balance)?;
        self.store_pool(outcome.pool)?;
        self.store_liquidity(outcome.position)?;
        self.commit(outcome.state)?;
        Ok(outcome)
    }

    pub fn apply_add_liquidity(
        &mut self,
        request: &Signed<AddLiquidity>,
    ) -> Result<LiquidityOutcome, RollupError> {
        let state = *self.state()?;
        let req = &request.payload;
        let outcome = state.add_liquidity(request)?;
        self.persist_liquidity(
            &req.balances_witness,
            &req.pool_witness,
            &req.liquidity_witness,
            outcome,
        )
    }

    pub fn apply_remove_liquidity(
        &mut self,
        request: &Signed<RemoveLiquidity>,
    ) -> Result<LiquidityOutcome, RollupError> {
        let state = *self.state()?;
        let req = &request.payload;
        let outcome = state.remove_liquidity(request)?;
        self.persist_liquidity(
            &req.balances_witness,
            &req.pool_witness,
            &req.liquidity_witness,
            outcome,
        )
    }

    pub fn apply_buy(&mut self, request: &Signed<Buy>) -> Result<SwapOutcome, RollupError> {
        let state = *self.state()?;
        let req = &request.payload;
        let outcome = state.buy(request)?;
        self.persist_swap(&req.balances_witness, &req.pool_witness, outcome)
    }

    pub fn apply_sell(&mut self, request: &Signed<Sell>) -> Result<SwapOutcome, RollupError> {
        let state = *self.state()?;
        let req = &request.payload;
        let outcome = state.sell(request)?;
        self.persist_swap(&req.balances_witness, &req.pool_witness, outcome)
    }

    fn persist_balance(&mut self, update: BalanceUpdate) -> Result<BalanceUpdate, RollupError> {
        self.store_balance(update.balance)?;
        self.commit(update.state)?;
        Ok(update)
    }

    fn persist_liquidity(
        &mut self,
        balances_witness: &MerkleDoubleWitness,
        pool_witness: &MerkleWitness,
        liquidity_witness: &MerkleWitness,
        outcome: LiquidityOutcome,
    ) -> Result<LiquidityOutcome, RollupError> {
        self.check_balance_slots(balances_witness, &outcome.base_balance, &outcome.quote_balance)?;
        expect_slot(TreeKind::Pools, pool_witness, self.pools.slot_for(&outcome.pool.key()))?;
        expect_slot(
            TreeKind::Liquidities,
            liquidity_witness,
            self.liquidities.slot_for(&outcome.position.key()),
        )?;

        self.store_balance(outcome.base_balance)?;
        self.store_balance(outcome.quote_balance)?;
        self.store_pool(outcome.pool)?;
        self.store_liquidity(outcome.position)?;
        self.commit(outcome.state)?;
        Ok(outcome)
    }

    fn persist_swap(
        &mut self,
        balances_witness: &MerkleDoubleWitness,
        pool_witness: &MerkleWitness,
        outcome: SwapOutcome,
    ) -> Result<SwapOutcome, RollupError> {
        self.check_balance_slots(balances_witness, &outcome.base_balance, &outcome.quote_balance)?;
        expect_slot(TreeKind::Pools, pool_witness, self.pools.slot_for(&outcome.pool.key()))?;

        self.store_balance(outcome.base_balance)?;
        self.store_balance(outcome.quote_balance)?;
        self.store_pool(outcome.pool)?;
        self.commit(outcome.state)?;
        Ok(outcome)
    }

    /// A witness only proves a leaf position; the records must also land in
    /// the slots the witnesses were taken at, or the stores and the
    /// transition disagree on the new roots.
    fn check_balance_slots(
        &self,
        witness: &MerkleDoubleWitness,
        base: &Balance,
        quote: &Balance,
    ) -> Result<(), RollupError> {
        let balances = &self.balances;
        expect_slot(TreeKind::Balances, witness.first(), balances.slot_for(&base.key()))?;
        expect_slot(TreeKind::Balances, witness.second(), balances.slot_for(&quote.key()))
    }

    fn commit(&mut self, expected: RollupState) -> Result<(), RollupError> {
        self.update_state();
        if self.state != expected {
            warn!(
                balances_root = %format!("{:#x}", self.state.balances_root),
                expected = %format!("{:#x}", expected.balances_root),
                "stores diverged from transition output"
            );
            self.dirty = true;
            return Err(RollupError::Desynchronized);
        }
        debug!(commitment = %format!("{:#x}", self.state.commitment()), "state synchronized");
        Ok(())
    }
}

fn expect_slot(tree: TreeKind, witness: &MerkleWitness, expected: u64) -> Result<(), RollupError> {
    let index = witness.calculate_index();
    if index != expected {
        return Err(RollupError::SlotMismatch {
            tree,
            witness: index,
            expected,
        });
    }
    Ok(())
}

fn balance_key(token_id: TokenId, owner: Address) -> BalanceKey {
    BalanceKey { token_id, owner }
}

fn position_key(pool: &Pool, provider: Address) -> PositionKey {
    PositionKey {
        base_token_id: pool.base_token_id,
        quote_token_id: pool.quote_token_id,
        provider,
    }
}
