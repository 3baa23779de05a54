//! Scalar types shared by every record and tree.

pub use starknet_crypto::Felt;

/// Opaque identifier of a fungible token.
pub type TokenId = Felt;

/// Stark-curve public key identifying an account or liquidity provider.
pub type Address = Felt;

/// Token quantity. Arithmetic on amounts is always checked.
pub type Amount = u64;

/// Commitment stored in a Merkle slot that holds no record.
pub const EMPTY_LEAF: Felt = Felt::ZERO;

pub(crate) fn amount_field(amount: Amount) -> Felt {
    Felt::from(amount)
}

pub(crate) fn flag_field(flag: bool) -> Felt {
    if flag {
        Felt::ONE
    } else {
        Felt::ZERO
    }
}
