//! Paired inclusion witness: proves and rewrites two leaves of one tree
//! against a single root.
//!
//! Below the level where the two paths meet, each leaf folds through its own
//! siblings. At the meeting node the two partial hashes are combined with
//! each other, never with the sibling recorded in the witness, since that
//! sibling is the other leaf's *old* value. Above it both paths share the
//! same siblings. Hash-argument order is chosen with [`maybe_swap`], so the
//! fold has no data-dependent branch on the hashed values.

use starknet_crypto::poseidon_hash;

use crate::merkle::{MerkleError, MerkleTree, MerkleWitness};
use crate::types::Felt;

/// Branchless conditional swap over the field: `(x, y)` when `flag` is set,
/// `(y, x)` otherwise.
pub fn maybe_swap(flag: bool, x: Felt, y: Felt) -> (Felt, Felt) {
    let b = if flag { Felt::ONE } else { Felt::ZERO };
    let m = b * (x - y);
    (y + m, x - m)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleDoubleWitness {
    first: MerkleWitness,
    second: MerkleWitness,
}

impl MerkleDoubleWitness {
    pub fn new(first: MerkleWitness, second: MerkleWitness) -> Result<Self, MerkleError> {
        if first.height() != second.height() {
            return Err(MerkleError::HeightMismatch {
                expected: first.height(),
                got: second.height(),
            });
        }
        Ok(Self { first, second })
    }

    pub fn height(&self) -> usize {
        self.first.height()
    }

    pub fn first(&self) -> &MerkleWitness {
        &self.first
    }

    pub fn second(&self) -> &MerkleWitness {
        &self.second
    }

    pub fn calculate_indexes(&self) -> (u64, u64) {
        (self.first.calculate_index(), self.second.calculate_index())
    }

    /// Level of the lowest node shared by both paths, counted from the
    /// leaves (`1` for sibling leaves, `height - 1` when they only meet at
    /// the root). `None` when both witnesses point at the same leaf.
    pub fn merge_level(&self) -> Option<usize> {
        let (first, second) = self.calculate_indexes();
        let diff = first ^ second;
        if diff == 0 {
            return None;
        }
        Some((u64::BITS - diff.leading_zeros()) as usize)
    }

    pub fn calculate_root(&self, leaf_first: Felt, leaf_second: Felt) -> Result<Felt, MerkleError> {
        let Some(merge) = self.merge_level() else {
            let root = self.first.calculate_root(leaf_first);
            if leaf_first != leaf_second || root != self.second.calculate_root(leaf_second) {
                return Err(MerkleError::DivergentLeaves {
                    index: self.first.calculate_index(),
                });
            }
            return Ok(root);
        };
        self.check_shared_path(merge)?;

        let (path_first, flags_first) = (self.first.path(), self.first.is_left());
        let (path_second, flags_second) = (self.second.path(), self.second.is_left());

        let mut hash_first = leaf_first;
        let mut hash_second = leaf_second;
        for level in 0..merge - 1 {
            let (left, right) = maybe_swap(flags_first[level], hash_first, path_first[level]);
            hash_first = poseidon_hash(left, right);
            let (left, right) = maybe_swap(flags_second[level], hash_second, path_second[level]);
            hash_second = poseidon_hash(left, right);
        }

        let (left, right) = maybe_swap(flags_first[merge - 1], hash_first, hash_second);
        let mut hash = poseidon_hash(left, right);
        for level in merge..path_first.len() {
            let (left, right) = maybe_swap(flags_first[level], hash, path_first[level]);
            hash = poseidon_hash(left, right);
        }
        Ok(hash)
    }

    /// First witness followed by the second, the order in which paired
    /// witnesses are signed.
    pub fn to_fields(&self) -> Vec<Felt> {
        let mut fields = self.first.to_fields();
        fields.extend(self.second.to_fields());
        fields
    }

    fn check_shared_path(&self, merge: usize) -> Result<(), MerkleError> {
        let (path_first, flags_first) = (self.first.path(), self.first.is_left());
        let (path_second, flags_second) = (self.second.path(), self.second.is_left());
        if flags_first[merge - 1] == flags_second[merge - 1] {
            return Err(MerkleError::UnrelatedWitnesses);
        }
        let shared = merge..path_first.len();
        if path_first[shared.clone()] != path_second[shared.clone()]
            || flags_first[shared.clone()] != flags_second[shared]
        {
            return Err(MerkleError::UnrelatedWitnesses);
        }
        Ok(())
    }
}

impl MerkleTree {
    pub fn double_witness(
        &self,
        first: u64,
        second: u64,
    ) -> Result<MerkleDoubleWitness, MerkleError> {
        MerkleDoubleWitness::new(self.witness(first)?, self.witness(second)?)
    }
}
