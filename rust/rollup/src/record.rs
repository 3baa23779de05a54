//! Authenticated records and their canonical field encodings.

use std::fmt::Debug;

use starknet_crypto::poseidon_hash_many;

use crate::types::{amount_field, Address, Amount, Felt, TokenId, EMPTY_LEAF};

/// Capabilities a value needs to live in a `CollectionStore`.
pub trait Record: Clone + Debug {
    type Key: Clone + Debug;

    /// Human-readable record kind used in errors and logs.
    const KIND: &'static str;

    fn key(&self) -> Self::Key;

    fn matches(&self, key: &Self::Key) -> bool;

    /// Canonical, order-stable serialization.
    fn to_fields(&self) -> Vec<Felt>;

    /// Placeholder for a slot that was never written. It commits to
    /// `EMPTY_LEAF` instead of its hash.
    fn is_vacant(&self) -> bool;

    fn content_hash(&self) -> Felt {
        poseidon_hash_many(&self.to_fields())
    }

    fn commitment(&self) -> Felt {
        if self.is_vacant() {
            EMPTY_LEAF
        } else {
            self.content_hash()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceKey {
    pub token_id: TokenId,
    pub owner: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub token_id: TokenId,
    pub owner: Address,
    pub amount: Amount,
}

impl Balance {
    pub fn new(token_id: TokenId, owner: Address, amount: Amount) -> Self {
        Self {
            token_id,
            owner,
            amount,
        }
    }

    /// Zero balance for `key`, the starting point of a first deposit.
    pub fn unfunded(key: BalanceKey) -> Self {
        Self::new(key.token_id, key.owner, 0)
    }
}

impl Record for Balance {
    type Key = BalanceKey;
    const KIND: &'static str = "balance";

    fn key(&self) -> BalanceKey {
        BalanceKey {
            token_id: self.token_id,
            owner: self.owner,
        }
    }

    fn matches(&self, key: &BalanceKey) -> bool {
        self.token_id == key.token_id && self.owner == key.owner
    }

    fn to_fields(&self) -> Vec<Felt> {
        vec![self.token_id, self.owner, amount_field(self.amount)]
    }

    // Balances carry their key even when unfunded, so there is no
    // placeholder: a stored balance keeps committing to its hash at zero.
    fn is_vacant(&self) -> bool {
        false
    }
}

/// Unordered token pair: `(a, b)` and `(b, a)` name the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairKey {
    pub base_token_id: TokenId,
    pub quote_token_id: TokenId,
}

impl PairKey {
    pub fn new(base_token_id: TokenId, quote_token_id: TokenId) -> Self {
        Self {
            base_token_id,
            quote_token_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool {
    pub base_token_id: TokenId,
    pub quote_token_id: TokenId,
    pub base_token_amount: Amount,
    pub quote_token_amount: Amount,
    pub k: Amount,
    pub lp_points: Amount,
}

impl Pool {
    pub fn empty() -> Self {
        Self {
            base_token_id: Felt::ZERO,
            quote_token_id: Felt::ZERO,
            base_token_amount: 0,
            quote_token_amount: 0,
            k: 0,
            lp_points: 0,
        }
    }
}

impl Record for Pool {
    type Key = PairKey;
    const KIND: &'static str = "pool";

    fn key(&self) -> PairKey {
        PairKey::new(self.base_token_id, self.quote_token_id)
    }

    fn matches(&self, key: &PairKey) -> bool {
        (self.base_token_id == key.base_token_id && self.quote_token_id == key.quote_token_id)
            || (self.base_token_id == key.quote_token_id
                && self.quote_token_id == key.base_token_id)
    }

    fn to_fields(&self) -> Vec<Felt> {
        vec![
            self.base_token_id,
            self.quote_token_id,
            amount_field(self.base_token_amount),
            amount_field(self.quote_token_amount),
            amount_field(self.k),
            amount_field(self.lp_points),
        ]
    }

    fn is_vacant(&self) -> bool {
        *self == Self::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionKey {
    pub base_token_id: TokenId,
    pub quote_token_id: TokenId,
    pub provider: Address,
}

/// A provider's share of one pool, measured in LP points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityPosition {
    pub base_token_id: TokenId,
    pub quote_token_id: TokenId,
    pub provider: Address,
    pub lp_points: Amount,
}

impl LiquidityPosition {
    pub fn empty() -> Self {
        Self {
            base_token_id: Felt::ZERO,
            quote_token_id: Felt::ZERO,
            provider: Felt::ZERO,
            lp_points: 0,
        }
    }
}

impl Record for LiquidityPosition {
    type Key = PositionKey;
    const KIND: &'static str = "liquidity position";

    fn key(&self) -> PositionKey {
        PositionKey {
            base_token_id: self.base_token_id,
            quote_token_id: self.quote_token_id,
            provider: self.provider,
        }
    }

    fn matches(&self, key: &PositionKey) -> bool {
        self.base_token_id == key.base_token_id
            && self.quote_token_id == key.quote_token_id
            && self.provider == key.provider
    }

    fn to_fields(&self) -> Vec<Felt> {
        vec![
            self.base_token_id,
            self.quote_token_id,
            self.provider,
            amount_field(self.lp_points),
        ]
    }

    fn is_vacant(&self) -> bool {
        *self == Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn felt(value: u64) -> Felt {
        Felt::from(value)
    }

    #[test]
    fn pool_matches_either_order() {
        let pool = Pool {
            base_token_id: felt(1),
            quote_token_id: felt(2),
            ..Pool::empty()
        };
        assert!(pool.matches(&PairKey::new(felt(1), felt(2))));
        assert!(pool.matches(&PairKey::new(felt(2), felt(1))));
        assert!(!pool.matches(&PairKey::new(felt(1), felt(3))));
    }

    #[test]
    fn position_key_is_ordered() {
        let position = LiquidityPosition {
            base_token_id: felt(1),
            quote_token_id: felt(2),
            provider: felt(9),
            lp_points: 10,
        };
        assert!(position.matches(&position.key()));
        assert!(!position.matches(&PositionKey {
            base_token_id: felt(2),
            quote_token_id: felt(1),
            provider: felt(9),
        }));
    }

    #[test]
    fn only_placeholders_commit_to_empty_leaf() {
        let exhausted = Balance::new(felt(1), felt(2), 0);
        assert_eq!(exhausted.commitment(), exhausted.content_hash());
        assert_ne!(exhausted.commitment(), EMPTY_LEAF);
        assert_eq!(Pool::empty().commitment(), EMPTY_LEAF);
        assert_eq!(LiquidityPosition::empty().commitment(), EMPTY_LEAF);

        let drained = LiquidityPosition {
            base_token_id: felt(1),
            quote_token_id: felt(2),
            provider: felt(3),
            lp_points: 0,
        };
        assert_eq!(drained.commitment(), drained.content_hash());
    }

    #[test]
    fn pool_hash_covers_quote_amount() {
        let pool = Pool {
            base_token_id: felt(1),
            quote_token_id: felt(2),
            base_token_amount: 10,
            quote_token_amount: 20,
            k: 200,
            lp_points: 5,
        };
        let skewed = Pool {
            quote_token_amount: 21,
            ..pool
        };
        assert_ne!(pool.content_hash(), skewed.content_hash());
    }
}
