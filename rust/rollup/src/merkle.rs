//! Fixed-height Poseidon Merkle tree used by every collection store.
//! A tree of height `h` has `h - 1` hashing levels and `2^(h-1)` leaf slots;
//! untouched slots hold `EMPTY_LEAF`.

use std::collections::HashMap;

use starknet_crypto::poseidon_hash;
use thiserror::Error;

use crate::types::{flag_field, Felt, EMPTY_LEAF};

pub const MIN_TREE_HEIGHT: usize = 2;
pub const MAX_TREE_HEIGHT: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("unsupported tree height {height}")]
    InvalidHeight { height: usize },
    #[error("leaf index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: u64, capacity: u64 },
    #[error("witness height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: usize, got: usize },
    #[error("paired witness points twice at leaf {index} with different leaves")]
    DivergentLeaves { index: u64 },
    #[error("paired witness paths do not belong to the same tree")]
    UnrelatedWitnesses,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    height: usize,
    zero_hashes: Vec<Felt>,
    nodes: HashMap<(usize, u64), Felt>,
    root: Felt,
}

impl MerkleTree {
    pub fn new(height: usize) -> Result<Self, MerkleError> {
        if !(MIN_TREE_HEIGHT..=MAX_TREE_HEIGHT).contains(&height) {
            return Err(MerkleError::InvalidHeight { height });
        }
        let mut zero_hashes = Vec::with_capacity(height);
        zero_hashes.push(EMPTY_LEAF);
        for level in 1..height {
            let prev = zero_hashes[level - 1];
            zero_hashes.push(poseidon_hash(prev, prev));
        }
        let root = zero_hashes[height - 1];
        Ok(Self {
            height,
            zero_hashes,
            nodes: HashMap::new(),
            root,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << (self.height - 1)
    }

    pub fn root(&self) -> Felt {
        self.root
    }

    pub fn leaf(&self, index: u64) -> Result<Felt, MerkleError> {
        self.check_index(index)?;
        Ok(self.node(0, index))
    }

    /// Writes `leaf` at `index` and rehashes the path to the root.
    pub fn set_leaf(&mut self, index: u64, leaf: Felt) -> Result<Felt, MerkleError> {
        self.check_index(index)?;
        let mut current = leaf;
        let mut idx = index;
        for level in 0..self.height - 1 {
            self.store_node(level, idx, current);
            let sibling = self.node(level, idx ^ 1);
            current = hash_pair(idx % 2 == 0, current, sibling);
            idx /= 2;
        }
        self.root = current;
        Ok(current)
    }

    pub fn witness(&self, index: u64) -> Result<MerkleWitness, MerkleError> {
        self.check_index(index)?;
        let levels = self.height - 1;
        let mut path = Vec::with_capacity(levels);
        let mut is_left = Vec::with_capacity(levels);
        let mut idx = index;
        for level in 0..levels {
            path.push(self.node(level, idx ^ 1));
            is_left.push(idx % 2 == 0);
            idx /= 2;
        }
        Ok(MerkleWitness { path, is_left })
    }

    fn node(&self, level: usize, index: u64) -> Felt {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or(self.zero_hashes[level])
    }

    fn store_node(&mut self, level: usize, index: u64, value: Felt) {
        if value == self.zero_hashes[level] {
            self.nodes.remove(&(level, index));
        } else {
            self.nodes.insert((level, index), value);
        }
    }

    fn check_index(&self, index: u64) -> Result<(), MerkleError> {
        let capacity = self.capacity();
        if index >= capacity {
            return Err(MerkleError::IndexOutOfRange { index, capacity });
        }
        Ok(())
    }
}

/// Inclusion witness for one leaf: the sibling at every level, leaf first,
/// and whether the path node at that level is a left child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleWitness {
    path: Vec<Felt>,
    is_left: Vec<bool>,
}

impl MerkleWitness {
    pub fn new(path: Vec<Felt>, is_left: Vec<bool>) -> Result<Self, MerkleError> {
        if path.len() != is_left.len() {
            return Err(MerkleError::HeightMismatch {
                expected: path.len() + 1,
                got: is_left.len() + 1,
            });
        }
        if path.len() + 1 < MIN_TREE_HEIGHT || path.len() + 1 > MAX_TREE_HEIGHT {
            return Err(MerkleError::InvalidHeight {
                height: path.len() + 1,
            });
        }
        Ok(Self { path, is_left })
    }

    pub fn height(&self) -> usize {
        self.path.len() + 1
    }

    pub fn path(&self) -> &[Felt] {
        &self.path
    }

    pub fn is_left(&self) -> &[bool] {
        &self.is_left
    }

    pub fn calculate_root(&self, leaf: Felt) -> Felt {
        self.path
            .iter()
            .zip(self.is_left.iter())
            .fold(leaf, |hash, (sibling, is_left)| {
                hash_pair(*is_left, hash, *sibling)
            })
    }

    pub fn calculate_index(&self) -> u64 {
        self.is_left
            .iter()
            .enumerate()
            .filter(|(_, is_left)| !**is_left)
            .fold(0u64, |index, (level, _)| index | (1u64 << level))
    }

    /// Siblings followed by flags, the order in which witnesses are signed.
    pub fn to_fields(&self) -> Vec<Felt> {
        let mut fields = Vec::with_capacity(self.path.len() * 2);
        fields.extend_from_slice(&self.path);
        fields.extend(self.is_left.iter().map(|flag| flag_field(*flag)));
        fields
    }
}

pub(crate) fn hash_pair(is_left: bool, node: Felt, sibling: Felt) -> Felt {
    if is_left {
        poseidon_hash(node, sibling)
    } else {
        poseidon_hash(sibling, node)
    }
}

#[cfg(test)]
mod tests {
    use super::{MerkleError, MerkleTree, MerkleWitness};
    use crate::types::{Felt, EMPTY_LEAF};
    use starknet_crypto::poseidon_hash;

    #[test]
    fn empty_root_matches_zero_hashes() {
        let tree = MerkleTree::new(4).unwrap();
        let mut expected = EMPTY_LEAF;
        for _ in 0..3 {
            expected = poseidon_hash(expected, expected);
        }
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.capacity(), 8);
    }

    #[test]
    fn witness_matches_current_root() {
        let mut tree = MerkleTree::new(4).unwrap();
        tree.set_leaf(0, Felt::from(11u8)).unwrap();
        tree.set_leaf(5, Felt::from(22u8)).unwrap();
        let witness = tree.witness(5).unwrap();
        assert_eq!(witness.calculate_root(Felt::from(22u8)), tree.root());
        assert_eq!(witness.calculate_index(), 5);
        let empty_slot = tree.witness(3).unwrap();
        assert_eq!(empty_slot.calculate_root(EMPTY_LEAF), tree.root());
    }

    #[test]
    fn set_leaf_back_to_empty_restores_root() {
        let mut tree = MerkleTree::new(3).unwrap();
        let empty_root = tree.root();
        tree.set_leaf(2, Felt::from(7u8)).unwrap();
        assert_ne!(tree.root(), empty_root);
        tree.set_leaf(2, EMPTY_LEAF).unwrap();
        assert_eq!(tree.root(), empty_root);
        assert_eq!(tree.leaf(2).unwrap(), EMPTY_LEAF);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut tree = MerkleTree::new(3).unwrap();
        let err = tree.set_leaf(4, Felt::ONE).unwrap_err();
        assert!(matches!(err, MerkleError::IndexOutOfRange { capacity: 4, .. }));
        assert!(tree.witness(4).is_err());
    }

    #[test]
    fn rejects_degenerate_heights() {
        assert!(matches!(
            MerkleTree::new(1),
            Err(MerkleError::InvalidHeight { height: 1 })
        ));
        assert!(MerkleTree::new(65).is_err());
        assert!(MerkleWitness::new(vec![Felt::ONE], vec![true, false]).is_err());
    }

    #[test]
    fn witness_fields_are_siblings_then_flags() {
        let tree = MerkleTree::new(3).unwrap();
        let witness = tree.witness(1).unwrap();
        let fields = witness.to_fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(&fields[..2], witness.path());
        assert_eq!(fields[2], Felt::ZERO);
        assert_eq!(fields[3], Felt::ONE);
    }
}
