//! Rollup state and its transitions.
//!
//! Every transition is a pure function of the committed roots and a signed
//! request. It checks the request's records against the roots, verifies the
//! signature, applies the business rules, and returns the updated records
//! together with the roots recomputed from the same witnesses. The caller
//! persists the records; nothing is mutated here, so a failed transition
//! has no side effects.

use starknet_crypto::poseidon_hash_many;
use tracing::debug;

use crate::amm;
use crate::double_witness::MerkleDoubleWitness;
use crate::error::{RollupError, TreeKind};
use crate::merkle::MerkleWitness;
use crate::record::{Balance, LiquidityPosition, Pool, Record};
use crate::request::{AddLiquidity, Buy, CreatePool, Payload, RemoveLiquidity, Sell, Signed};
use crate::types::{Address, Amount, Felt, EMPTY_LEAF};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupState {
    pub balances_root: Felt,
    pub pools_root: Felt,
    pub liquidities_root: Felt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub state: RollupState,
    pub balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCreation {
    pub state: RollupState,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub position: LiquidityPosition,
}

/// Result of adding or removing liquidity. The token amounts are what
/// moved between the balances and the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityOutcome {
    pub state: RollupState,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub position: LiquidityPosition,
    pub base_token_amount: Amount,
    pub quote_token_amount: Amount,
    pub lp_points: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub state: RollupState,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub quote_token_amount: Amount,
}

impl RollupState {
    pub fn new(balances_root: Felt, pools_root: Felt, liquidities_root: Felt) -> Self {
        Self {
            balances_root,
            pools_root,
            liquidities_root,
        }
    }

    pub fn to_fields(&self) -> [Felt; 3] {
        [self.balances_root, self.pools_root, self.liquidities_root]
    }

    /// Hash the settlement contract stores for this state.
    pub fn commitment(&self) -> Felt {
        poseidon_hash_many(&self.to_fields())
    }

    pub fn add_balance(
        &self,
        amount: Amount,
        balance: &Balance,
        witness: &MerkleWitness,
    ) -> Result<BalanceUpdate, RollupError> {
        self.check_balance(balance, witness)?;
        let updated = Balance {
            amount: balance
                .amount
                .checked_add(amount)
                .ok_or(RollupError::Overflow)?,
            ..*balance
        };
        Ok(BalanceUpdate {
            state: Self {
                balances_root: witness.calculate_root(updated.commitment()),
                ..*self
            },
            balance: updated,
        })
    }

    pub fn sub_balance(
        &self,
        amount: Amount,
        balance: &Balance,
        witness: &MerkleWitness,
    ) -> Result<BalanceUpdate, RollupError> {
        self.check_balance(balance, witness)?;
        let updated = Balance {
            amount: balance
                .amount
                .checked_sub(amount)
                .ok_or(RollupError::InsufficientBalance)?,
            ..*balance
        };
        Ok(BalanceUpdate {
            state: Self {
                balances_root: witness.calculate_root(updated.commitment()),
                ..*self
            },
            balance: updated,
        })
    }

    pub fn create_pool(
        &self,
        request: &Signed<CreatePool>,
        initial_lp_points: Amount,
    ) -> Result<PoolCreation, RollupError> {
        let req = &request.payload;
        self.check_balance_pair(&req.balances_witness, &req.base_balance, &req.quote_balance)?;
        self.check_root(
            TreeKind::Pools,
            self.pools_root,
            req.pool_witness.calculate_root(EMPTY_LEAF),
        )?;
        self.check_root(
            TreeKind::Liquidities,
            self.liquidities_root,
            req.liquidity_witness.calculate_root(EMPTY_LEAF),
        )?;
        self.authorize(request)?;

        if req.base_balance.token_id == req.quote_balance.token_id {
            return Err(RollupError::InvalidTokenPair);
        }
        check_owner(request.sender, &req.base_balance, &req.quote_balance)?;
        if req.base_token_amount == 0 || req.quote_token_amount == 0 {
            return Err(RollupError::ZeroAmount);
        }
        let base_balance = debit(&req.base_balance, req.base_token_amount)?;
        let quote_balance = debit(&req.quote_balance, req.quote_token_amount)?;

        let pool = Pool {
            base_token_id: req.base_balance.token_id,
            quote_token_id: req.quote_balance.token_id,
            base_token_amount: req.base_token_amount,
            quote_token_amount: req.quote_token_amount,
            k: amm::constant_product(req.base_token_amount, req.quote_token_amount)?,
            lp_points: initial_lp_points,
        };
        let position = LiquidityPosition {
            base_token_id: pool.base_token_id,
            quote_token_id: pool.quote_token_id,
            provider: request.sender,
            lp_points: initial_lp_points,
        };

        let state = Self {
            balances_root: req
                .balances_witness
                .calculate_root(base_balance.commitment(), quote_balance.commitment())?,
            pools_root: req.pool_witness.calculate_root(pool.commitment()),
            liquidities_root: req.liquidity_witness.calculate_root(position.commitment()),
        };
        debug!(k = pool.k, lp_points = pool.lp_points, "pool created");
        Ok(PoolCreation {
            state,
            base_balance,
            quote_balance,
            pool,
            position,
        })
    }

    pub fn add_liquidity(
        &self,
        request: &Signed<AddLiquidity>,
    ) -> Result<LiquidityOutcome, RollupError> {
        let req = &request.payload;
        self.check_balance_pair(&req.balances_witness, &req.base_balance, &req.quote_balance)?;
        self.check_pool(&req.pool, &req.pool_witness)?;
        self.check_position(&req.position, &req.liquidity_witness)?;
        self.authorize(request)?;

        check_owner(request.sender, &req.base_balance, &req.quote_balance)?;
        check_pool_tokens(&req.pool, &req.base_balance, &req.quote_balance)?;
        if !req.position.is_vacant() {
            if req.position.provider != request.sender {
                return Err(RollupError::InvalidLiquidityProvider);
            }
            check_position_tokens(&req.position, &req.pool)?;
        }
        if req.base_token_amount == 0 {
            return Err(RollupError::ZeroAmount);
        }

        let quote_token_amount = amm::liquidity_quote(&req.pool, req.base_token_amount)?;
        if quote_token_amount > req.quote_token_amount_max_limit {
            return Err(RollupError::LimitExceeded);
        }
        let minted = amm::lp_points_to_mint(&req.pool, req.base_token_amount)?;
        let base_balance = debit(&req.base_balance, req.base_token_amount)?;
        let quote_balance = debit(&req.quote_balance, quote_token_amount)?;

        let pool = reprice(
            &req.pool,
            add(req.pool.base_token_amount, req.base_token_amount)?,
            add(req.pool.quote_token_amount, quote_token_amount)?,
            add(req.pool.lp_points, minted)?,
        )?;
        let position = if req.position.is_vacant() {
            LiquidityPosition {
                base_token_id: pool.base_token_id,
                quote_token_id: pool.quote_token_id,
                provider: request.sender,
                lp_points: minted,
            }
        } else {
            LiquidityPosition {
                lp_points: add(req.position.lp_points, minted)?,
                ..req.position
            }
        };

        let state = Self {
            balances_root: req
                .balances_witness
                .calculate_root(base_balance.commitment(), quote_balance.commitment())?,
            pools_root: req.pool_witness.calculate_root(pool.commitment()),
            liquidities_root: req.liquidity_witness.calculate_root(position.commitment()),
        };
        Ok(LiquidityOutcome {
            state,
            base_balance,
            quote_balance,
            pool,
            position,
            base_token_amount: req.base_token_amount,
            quote_token_amount,
            lp_points: minted,
        })
    }

    pub fn remove_liquidity(
        &self,
        request: &Signed<RemoveLiquidity>,
    ) -> Result<LiquidityOutcome, RollupError> {
        let req = &request.payload;
        self.check_balance_pair(&req.balances_witness, &req.base_balance, &req.quote_balance)?;
        self.check_pool(&req.pool, &req.pool_witness)?;
        self.check_position(&req.position, &req.liquidity_witness)?;
        self.authorize(request)?;

        check_owner(request.sender, &req.base_balance, &req.quote_balance)?;
        check_pool_tokens(&req.pool, &req.base_balance, &req.quote_balance)?;
        if req.position.is_vacant() || req.position.provider != request.sender {
            return Err(RollupError::InvalidLiquidityProvider);
        }
        check_position_tokens(&req.position, &req.pool)?;
        if req.lp_points == 0 {
            return Err(RollupError::ZeroAmount);
        }
        let remaining = req
            .position
            .lp_points
            .checked_sub(req.lp_points)
            .ok_or(RollupError::InsufficientLpPoints)?;

        let base_token_amount =
            amm::redeem(req.lp_points, req.pool.base_token_amount, req.pool.lp_points)?;
        let quote_token_amount =
            amm::redeem(req.lp_points, req.pool.quote_token_amount, req.pool.lp_points)?;
        if base_token_amount < req.base_token_amount_min_limit
            || quote_token_amount < req.quote_token_amount_min_limit
        {
            return Err(RollupError::LimitExceeded);
        }

        let base_balance = credit(&req.base_balance, base_token_amount)?;
        let quote_balance = credit(&req.quote_balance, quote_token_amount)?;
        let pool = reprice(
            &req.pool,
            sub(req.pool.base_token_amount, base_token_amount)?,
            sub(req.pool.quote_token_amount, quote_token_amount)?,
            sub(req.pool.lp_points, req.lp_points)?,
        )?;
        let position = LiquidityPosition {
            lp_points: remaining,
            ..req.position
        };

        let state = Self {
            balances_root: req
                .balances_witness
                .calculate_root(base_balance.commitment(), quote_balance.commitment())?,
            pools_root: req.pool_witness.calculate_root(pool.commitment()),
            liquidities_root: req.liquidity_witness.calculate_root(position.commitment()),
        };
        Ok(LiquidityOutcome {
            state,
            base_balance,
            quote_balance,
            pool,
            position,
            base_token_amount,
            quote_token_amount,
            lp_points: req.lp_points,
        })
    }

    pub fn buy(&self, request: &Signed<Buy>) -> Result<SwapOutcome, RollupError> {
        let req = &request.payload;
        self.check_balance_pair(&req.balances_witness, &req.base_balance, &req.quote_balance)?;
        self.check_pool(&req.pool, &req.pool_witness)?;
        self.authorize(request)?;

        check_owner(request.sender, &req.base_balance, &req.quote_balance)?;
        check_pool_tokens(&req.pool, &req.base_balance, &req.quote_balance)?;
        if req.base_token_amount == 0 {
            return Err(RollupError::ZeroAmount);
        }
        let quote = amm::buy_quote(&req.pool, req.base_token_amount)?;
        if quote.quote_delta > req.quote_token_amount_max_limit {
            return Err(RollupError::LimitExceeded);
        }
        let quote_balance = debit(&req.quote_balance, quote.quote_delta)?;
        let base_balance = credit(&req.base_balance, req.base_token_amount)?;
        self.settle_swap(
            req.pool,
            quote,
            &req.balances_witness,
            &req.pool_witness,
            base_balance,
            quote_balance,
        )
    }

    pub fn sell(&self, request: &Signed<Sell>) -> Result<SwapOutcome, RollupError> {
        let req = &request.payload;
        self.check_balance_pair(&req.balances_witness, &req.base_balance, &req.quote_balance)?;
        self.check_pool(&req.pool, &req.pool_witness)?;
        self.authorize(request)?;

        check_owner(request.sender, &req.base_balance, &req.quote_balance)?;
        check_pool_tokens(&req.pool, &req.base_balance, &req.quote_balance)?;
        if req.base_token_amount == 0 {
            return Err(RollupError::ZeroAmount);
        }
        let base_balance = debit(&req.base_balance, req.base_token_amount)?;
        let quote = amm::sell_quote(&req.pool, req.base_token_amount)?;
        if quote.quote_delta < req.quote_token_amount_min_limit {
            return Err(RollupError::LimitExceeded);
        }
        let quote_balance = credit(&req.quote_balance, quote.quote_delta)?;
        self.settle_swap(
            req.pool,
            quote,
            &req.balances_witness,
            &req.pool_witness,
            base_balance,
            quote_balance,
        )
    }

    fn settle_swap(
        &self,
        pool: Pool,
        quote: amm::SwapQuote,
        balances_witness: &MerkleDoubleWitness,
        pool_witness: &MerkleWitness,
        base_balance: Balance,
        quote_balance: Balance,
    ) -> Result<SwapOutcome, RollupError> {
        let pool = reprice(
            &pool,
            quote.base_token_amount,
            quote.quote_token_amount,
            pool.lp_points,
        )?;
        let state = Self {
            balances_root: balances_witness
                .calculate_root(base_balance.commitment(), quote_balance.commitment())?,
            pools_root: pool_witness.calculate_root(pool.commitment()),
            ..*self
        };
        Ok(SwapOutcome {
            state,
            base_balance,
            quote_balance,
            pool,
            quote_token_amount: quote.quote_delta,
        })
    }

    fn check_root(
        &self,
        tree: TreeKind,
        committed: Felt,
        calculated: Felt,
    ) -> Result<(), RollupError> {
        if committed != calculated {
            debug!(%tree, "witness does not match committed root");
            return Err(RollupError::RootMismatch { tree });
        }
        Ok(())
    }

    fn check_balance(&self, balance: &Balance, witness: &MerkleWitness) -> Result<(), RollupError> {
        self.balance_leaf(balance, witness).map(|_| ())
    }

    fn check_balance_pair(
        &self,
        witness: &MerkleDoubleWitness,
        base: &Balance,
        quote: &Balance,
    ) -> Result<(), RollupError> {
        let base_leaf = self.balance_leaf(base, witness.first())?;
        let quote_leaf = self.balance_leaf(quote, witness.second())?;
        let calculated = witness.calculate_root(base_leaf, quote_leaf)?;
        self.check_root(TreeKind::Balances, self.balances_root, calculated)
    }

    /// Leaf the balance occupies under `witness`. A written balance always
    /// commits to its hash, even at zero; only an unfunded balance may be
    /// proven against a slot that still holds `EMPTY_LEAF`.
    fn balance_leaf(
        &self,
        balance: &Balance,
        witness: &MerkleWitness,
    ) -> Result<Felt, RollupError> {
        let stored = balance.commitment();
        if witness.calculate_root(stored) == self.balances_root {
            return Ok(stored);
        }
        let leaf = if balance.amount == 0 { EMPTY_LEAF } else { stored };
        self.check_root(TreeKind::Balances, self.balances_root, witness.calculate_root(leaf))?;
        Ok(leaf)
    }

    fn check_pool(&self, pool: &Pool, witness: &MerkleWitness) -> Result<(), RollupError> {
        self.check_root(
            TreeKind::Pools,
            self.pools_root,
            witness.calculate_root(pool.commitment()),
        )?;
        if pool.is_vacant() {
            return Err(RollupError::EmptyPool);
        }
        Ok(())
    }

    fn check_position(
        &self,
        position: &LiquidityPosition,
        witness: &MerkleWitness,
    ) -> Result<(), RollupError> {
        self.check_root(
            TreeKind::Liquidities,
            self.liquidities_root,
            witness.calculate_root(position.commitment()),
        )
    }

    fn authorize<P: Payload>(&self, request: &Signed<P>) -> Result<(), RollupError> {
        if !request.verify(self) {
            return Err(RollupError::InvalidSignature);
        }
        Ok(())
    }
}

fn check_owner(sender: Address, base: &Balance, quote: &Balance) -> Result<(), RollupError> {
    if base.owner != sender || quote.owner != sender {
        return Err(RollupError::InvalidBalanceOwner);
    }
    Ok(())
}

fn check_pool_tokens(pool: &Pool, base: &Balance, quote: &Balance) -> Result<(), RollupError> {
    if pool.base_token_id != base.token_id || pool.quote_token_id != quote.token_id {
        return Err(RollupError::InvalidTokenPair);
    }
    Ok(())
}

fn check_position_tokens(position: &LiquidityPosition, pool: &Pool) -> Result<(), RollupError> {
    if position.base_token_id != pool.base_token_id
        || position.quote_token_id != pool.quote_token_id
    {
        return Err(RollupError::InvalidTokenPair);
    }
    Ok(())
}

fn add(a: Amount, b: Amount) -> Result<Amount, RollupError> {
    a.checked_add(b).ok_or(RollupError::Overflow)
}

fn sub(a: Amount, b: Amount) -> Result<Amount, RollupError> {
    a.checked_sub(b).ok_or(RollupError::Overflow)
}

fn debit(balance: &Balance, amount: Amount) -> Result<Balance, RollupError> {
    let amount = balance
        .amount
        .checked_sub(amount)
        .ok_or(RollupError::InsufficientBalance)?;
    Ok(Balance { amount, ..*balance })
}

fn credit(balance: &Balance, amount: Amount) -> Result<Balance, RollupError> {
    Ok(Balance {
        amount: add(balance.amount, amount)?,
        ..*balance
    })
}

/// Pool with new reserves and `k` recomputed from them.
fn reprice(
    pool: &Pool,
    base_token_amount: Amount,
    quote_token_amount: Amount,
    lp_points: Amount,
) -> Result<Pool, RollupError> {
    Ok(Pool {
        base_token_amount,
        quote_token_amount,
        k: amm::constant_product(base_token_amount, quote_token_amount)?,
        lp_points,
        ..*pool
    })
}
