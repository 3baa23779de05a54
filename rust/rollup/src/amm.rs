//! Constant-product pricing. Intermediates are computed in `u128` and
//! narrowed back with a checked conversion; every division floors.
//!
//! Minting and redemption floor in the pool's favour. Swaps floor the
//! post-trade quote reserve and the caller recomputes `k` from the rounded
//! reserves, so `k == base * quote` holds exactly after every trade. That
//! floor favours the pool on sells and the buyer on buys, where `k` may
//! shrink by less than one base unit's worth of quote.

use crate::error::RollupError;
use crate::record::Pool;
use crate::types::Amount;

/// Reserves after a swap and the quote-token amount that changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub base_token_amount: Amount,
    pub quote_token_amount: Amount,
    pub quote_delta: Amount,
}

fn narrow(value: u128) -> Result<Amount, RollupError> {
    Amount::try_from(value).map_err(|_| RollupError::Overflow)
}

/// `a * b / c`, floored.
fn mul_div(a: Amount, b: Amount, c: Amount) -> Result<Amount, RollupError> {
    if c == 0 {
        return Err(RollupError::EmptyPool);
    }
    narrow(u128::from(a) * u128::from(b) / u128::from(c))
}

pub fn constant_product(base: Amount, quote: Amount) -> Result<Amount, RollupError> {
    base.checked_mul(quote).ok_or(RollupError::Overflow)
}

/// Quote amount that must accompany `base_amount` to keep the pool ratio.
pub fn liquidity_quote(pool: &Pool, base_amount: Amount) -> Result<Amount, RollupError> {
    let grown = pool
        .base_token_amount
        .checked_add(base_amount)
        .ok_or(RollupError::Overflow)?;
    let scaled = mul_div(grown, pool.quote_token_amount, pool.base_token_amount)?;
    scaled
        .checked_sub(pool.quote_token_amount)
        .ok_or(RollupError::Overflow)
}

pub fn lp_points_to_mint(pool: &Pool, base_amount: Amount) -> Result<Amount, RollupError> {
    mul_div(base_amount, pool.lp_points, pool.base_token_amount)
}

/// Share of `reserve` owed for burning `lp_points` out of `total_lp_points`.
pub fn redeem(
    lp_points: Amount,
    reserve: Amount,
    total_lp_points: Amount,
) -> Result<Amount, RollupError> {
    mul_div(lp_points, reserve, total_lp_points)
}

/// Cost of taking `base_amount` out of the pool. The new quote reserve is
/// `floor(k / new_base)`, so the buyer pays up to one unit less than the
/// exact curve price: buying 1 base from a 1000/1 pool costs nothing and
/// leaves `k` at 999.
pub fn buy_quote(pool: &Pool, base_amount: Amount) -> Result<SwapQuote, RollupError> {
    if base_amount >= pool.base_token_amount {
        return Err(RollupError::InsufficientReserves);
    }
    let base_token_amount = pool.base_token_amount - base_amount;
    let quote_token_amount = pool.k / base_token_amount;
    let cost = quote_token_amount
        .checked_sub(pool.quote_token_amount)
        .ok_or(RollupError::Overflow)?;
    Ok(SwapQuote {
        base_token_amount,
        quote_token_amount,
        quote_delta: cost,
    })
}

pub fn sell_quote(pool: &Pool, base_amount: Amount) -> Result<SwapQuote, RollupError> {
    // A drained pool has nothing to pay out and no providers to absorb the
    // deposit.
    if pool.base_token_amount == 0 || pool.quote_token_amount == 0 {
        return Err(RollupError::EmptyPool);
    }
    let base_token_amount = pool
        .base_token_amount
        .checked_add(base_amount)
        .ok_or(RollupError::Overflow)?;
    let quote_token_amount = pool.k / base_token_amount;
    let proceeds = pool
        .quote_token_amount
        .checked_sub(quote_token_amount)
        .ok_or(RollupError::Overflow)?;
    Ok(SwapQuote {
        base_token_amount,
        quote_token_amount,
        quote_delta: proceeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Felt;

    fn pool(base: Amount, quote: Amount, lp_points: Amount) -> Pool {
        Pool {
            base_token_id: Felt::from(1u8),
            quote_token_id: Felt::from(2u8),
            base_token_amount: base,
            quote_token_amount: quote,
            k: base * quote,
            lp_points,
        }
    }

    #[test]
    fn add_liquidity_keeps_ratio() {
        let pool = pool(1000, 2000, 65535);
        assert_eq!(liquidity_quote(&pool, 100).unwrap(), 200);
        assert_eq!(lp_points_to_mint(&pool, 100).unwrap(), 6553);
    }

    #[test]
    fn buy_floors_new_quote() {
        let quote = buy_quote(&pool(1000, 2000, 1), 100).unwrap();
        assert_eq!(quote.base_token_amount, 900);
        assert_eq!(quote.quote_token_amount, 2222);
        assert_eq!(quote.quote_delta, 222);
    }

    #[test]
    fn buy_rounding_favours_the_buyer() {
        let quote = buy_quote(&pool(1000, 1, 1), 1).unwrap();
        assert_eq!(quote.quote_delta, 0);
        assert_eq!(quote.quote_token_amount, 1);
        let k = constant_product(quote.base_token_amount, quote.quote_token_amount).unwrap();
        assert_eq!(k, 999);
    }

    #[test]
    fn buy_cannot_drain_pool() {
        let pool = pool(1000, 2000, 1);
        assert_eq!(buy_quote(&pool, 1000), Err(RollupError::InsufficientReserves));
        assert_eq!(buy_quote(&pool, 5000), Err(RollupError::InsufficientReserves));
    }

    #[test]
    fn sell_pays_out_of_quote_reserve() {
        let quote = sell_quote(&pool(1000, 2000, 1), 250).unwrap();
        assert_eq!(quote.base_token_amount, 1250);
        assert_eq!(quote.quote_token_amount, 1600);
        assert_eq!(quote.quote_delta, 400);
    }

    #[test]
    fn drained_pool_refuses_sells() {
        assert_eq!(sell_quote(&pool(0, 0, 0), 10), Err(RollupError::EmptyPool));
    }

    #[test]
    fn redeem_is_proportional() {
        assert_eq!(redeem(6553, 1100, 72088).unwrap(), 99);
        assert_eq!(redeem(72088, 1100, 72088).unwrap(), 1100);
        assert_eq!(redeem(1, 1, 0), Err(RollupError::EmptyPool));
    }

    #[test]
    fn product_overflow_is_reported() {
        assert_eq!(constant_product(u64::MAX, 2), Err(RollupError::Overflow));
        assert_eq!(constant_product(3, 7).unwrap(), 21);
    }
}
