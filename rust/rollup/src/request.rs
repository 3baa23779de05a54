//! Signed transition requests.
//!
//! The signed message is the current `RollupState` fields followed by the
//! payload fields in declaration order. Signing and verification both go
//! through [`Signed::message`], so the order cannot drift between them.

use crate::double_witness::MerkleDoubleWitness;
use crate::merkle::MerkleWitness;
use crate::record::{Balance, LiquidityPosition, Pool, Record};
use crate::signature::{self, Keypair, Signature, SignatureError};
use crate::state::RollupState;
use crate::types::{amount_field, Address, Amount, Felt};

pub trait Payload {
    fn write_fields(&self, fields: &mut Vec<Felt>);
}

#[derive(Debug, Clone)]
pub struct Signed<P> {
    pub sender: Address,
    pub signature: Signature,
    pub payload: P,
}

impl<P: Payload> Signed<P> {
    pub fn message(state: &RollupState, payload: &P) -> Vec<Felt> {
        let mut fields = state.to_fields().to_vec();
        payload.write_fields(&mut fields);
        fields
    }

    /// Signs `payload` against `state`, the state it will be applied to.
    pub fn sign(
        keypair: &Keypair,
        state: &RollupState,
        payload: P,
    ) -> Result<Self, SignatureError> {
        let signature = keypair.sign(&Self::message(state, &payload))?;
        Ok(Self {
            sender: keypair.address(),
            signature,
            payload,
        })
    }

    pub fn verify(&self, state: &RollupState) -> bool {
        signature::verify(
            self.sender,
            &Self::message(state, &self.payload),
            &self.signature,
        )
    }
}

/// Opens a pool and seeds it from the sender's balances. The pool and
/// liquidity witnesses must prove empty slots.
#[derive(Debug, Clone)]
pub struct CreatePool {
    pub base_token_amount: Amount,
    pub quote_token_amount: Amount,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub balances_witness: MerkleDoubleWitness,
    pub pool_witness: MerkleWitness,
    pub liquidity_witness: MerkleWitness,
}

impl Payload for CreatePool {
    fn write_fields(&self, fields: &mut Vec<Felt>) {
        fields.push(amount_field(self.base_token_amount));
        fields.push(amount_field(self.quote_token_amount));
        fields.extend(self.base_balance.to_fields());
        fields.extend(self.quote_balance.to_fields());
        fields.extend(self.balances_witness.to_fields());
        fields.extend(self.pool_witness.to_fields());
        fields.extend(self.liquidity_witness.to_fields());
    }
}

/// `position` is `LiquidityPosition::empty()` with a next-slot witness when
/// the sender has no position in the pool yet.
#[derive(Debug, Clone)]
pub struct AddLiquidity {
    pub base_token_amount: Amount,
    pub quote_token_amount_max_limit: Amount,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub position: LiquidityPosition,
    pub balances_witness: MerkleDoubleWitness,
    pub pool_witness: MerkleWitness,
    pub liquidity_witness: MerkleWitness,
}

impl Payload for AddLiquidity {
    fn write_fields(&self, fields: &mut Vec<Felt>) {
        fields.push(amount_field(self.base_token_amount));
        fields.push(amount_field(self.quote_token_amount_max_limit));
        fields.extend(self.base_balance.to_fields());
        fields.extend(self.quote_balance.to_fields());
        fields.extend(self.pool.to_fields());
        fields.extend(self.position.to_fields());
        fields.extend(self.balances_witness.to_fields());
        fields.extend(self.pool_witness.to_fields());
        fields.extend(self.liquidity_witness.to_fields());
    }
}

#[derive(Debug, Clone)]
pub struct RemoveLiquidity {
    pub lp_points: Amount,
    pub base_token_amount_min_limit: Amount,
    pub quote_token_amount_min_limit: Amount,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub position: LiquidityPosition,
    pub balances_witness: MerkleDoubleWitness,
    pub pool_witness: MerkleWitness,
    pub liquidity_witness: MerkleWitness,
}

impl Payload for RemoveLiquidity {
    fn write_fields(&self, fields: &mut Vec<Felt>) {
        fields.push(amount_field(self.lp_points));
        fields.push(amount_field(self.base_token_amount_min_limit));
        fields.push(amount_field(self.quote_token_amount_min_limit));
        fields.extend(self.base_balance.to_fields());
        fields.extend(self.quote_balance.to_fields());
        fields.extend(self.pool.to_fields());
        fields.extend(self.position.to_fields());
        fields.extend(self.balances_witness.to_fields());
        fields.extend(self.pool_witness.to_fields());
        fields.extend(self.liquidity_witness.to_fields());
    }
}

/// Buys `base_token_amount` of the pool's base token, paying at most
/// `quote_token_amount_max_limit`.
#[derive(Debug, Clone)]
pub struct Buy {
    pub base_token_amount: Amount,
    pub quote_token_amount_max_limit: Amount,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub balances_witness: MerkleDoubleWitness,
    pub pool_witness: MerkleWitness,
}

impl Payload for Buy {
    fn write_fields(&self, fields: &mut Vec<Felt>) {
        fields.push(amount_field(self.base_token_amount));
        fields.push(amount_field(self.quote_token_amount_max_limit));
        fields.extend(self.base_balance.to_fields());
        fields.extend(self.quote_balance.to_fields());
        fields.extend(self.pool.to_fields());
        fields.extend(self.balances_witness.to_fields());
        fields.extend(self.pool_witness.to_fields());
    }
}

#[derive(Debug, Clone)]
pub struct Sell {
    pub base_token_amount: Amount,
    pub quote_token_amount_min_limit: Amount,
    pub base_balance: Balance,
    pub quote_balance: Balance,
    pub pool: Pool,
    pub balances_witness: MerkleDoubleWitness,
    pub pool_witness: MerkleWitness,
}

impl Payload for Sell {
    fn write_fields(&self, fields: &mut Vec<Felt>) {
        fields.push(amount_field(self.base_token_amount));
        fields.push(amount_field(self.quote_token_amount_min_limit));
        fields.extend(self.base_balance.to_fields());
        fields.extend(self.quote_balance.to_fields());
        fields.extend(self.pool.to_fields());
        fields.extend(self.balances_witness.to_fields());
        fields.extend(self.pool_witness.to_fields());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::MerkleTree;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn buy_payload(state_tree: &MerkleTree, limit: Amount) -> Buy {
        let base_balance = Balance::new(Felt::from(1u8), Felt::from(9u8), 0);
        let quote_balance = Balance::new(Felt::from(2u8), Felt::from(9u8), 500);
        Buy {
            base_token_amount: 10,
            quote_token_amount_max_limit: limit,
            base_balance,
            quote_balance,
            pool: Pool::empty(),
            balances_witness: state_tree.double_witness(0, 1).unwrap(),
            pool_witness: state_tree.witness(0).unwrap(),
        }
    }

    #[test]
    fn message_starts_with_state_fields() {
        let tree = MerkleTree::new(3).unwrap();
        let state = RollupState::new(Felt::from(1u8), Felt::from(2u8), Felt::from(3u8));
        let payload = buy_payload(&tree, 40);
        let message = Signed::message(&state, &payload);
        assert_eq!(&message[..3], &state.to_fields());
        assert_eq!(message[3], Felt::from(10u8));
        assert_eq!(message[4], Felt::from(40u8));
    }

    #[test]
    fn signature_binds_payload_and_state() {
        let mut rng = StdRng::seed_from_u64(3);
        let keypair = Keypair::random(&mut rng);
        let tree = MerkleTree::new(3).unwrap();
        let state = RollupState::new(Felt::ZERO, Felt::ONE, Felt::from(2u8));
        let signed = Signed::sign(&keypair, &state, buy_payload(&tree, 40)).unwrap();
        assert!(signed.verify(&state));

        let other_state = RollupState::new(Felt::ONE, Felt::ONE, Felt::from(2u8));
        assert!(!signed.verify(&other_state));

        let mut tampered = signed.clone();
        tampered.payload.quote_token_amount_max_limit = 41;
        assert!(!tampered.verify(&state));
    }
}
