//! Generic record collection backed by a Merkle tree of the same height.
//!
//! Records live in insertion order: the record at position `i` of
//! `records()` commits to leaf `i`. Lookups are linear scans by key; there
//! is no secondary index.

use thiserror::Error;
use tracing::trace;

use crate::double_witness::MerkleDoubleWitness;
use crate::merkle::{MerkleError, MerkleTree, MerkleWitness};
use crate::record::{Balance, LiquidityPosition, Pool, Record};
use crate::types::Felt;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} not found")]
    NotFound { kind: &'static str },
    #[error("{kind} already exists")]
    AlreadyExists { kind: &'static str },
    #[error("{kind} store is full (capacity {capacity})")]
    Full { kind: &'static str, capacity: u64 },
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

#[derive(Debug, Clone)]
pub struct CollectionStore<R: Record> {
    records: Vec<R>,
    tree: MerkleTree,
}

pub type BalanceStore = CollectionStore<Balance>;
pub type PoolStore = CollectionStore<Pool>;
pub type LiquidityStore = CollectionStore<LiquidityPosition>;

impl<R: Record> CollectionStore<R> {
    pub fn empty(height: usize) -> Result<Self, StoreError> {
        Ok(Self {
            records: Vec::new(),
            tree: MerkleTree::new(height)?,
        })
    }

    /// Rebuilds a store by replaying `insert` over `records` in order.
    pub fn restore<I>(height: usize, records: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = R>,
    {
        let mut store = Self::empty(height)?;
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    pub fn get(&self, key: &R::Key) -> Result<&R, StoreError> {
        self.records
            .iter()
            .find(|record| record.matches(key))
            .ok_or(StoreError::NotFound { kind: R::KIND })
    }

    pub fn index_of(&self, key: &R::Key) -> Option<u64> {
        self.records
            .iter()
            .position(|record| record.matches(key))
            .map(|index| index as u64)
    }

    /// Slot a record with `key` occupies, or would occupy once inserted.
    pub fn slot_for(&self, key: &R::Key) -> u64 {
        self.index_of(key).unwrap_or(self.records.len() as u64)
    }

    pub fn witness_for(&self, key: &R::Key) -> Result<MerkleWitness, StoreError> {
        let index = self
            .index_of(key)
            .ok_or(StoreError::NotFound { kind: R::KIND })?;
        Ok(self.tree.witness(index)?)
    }

    /// Witness proving that the next free slot is still empty.
    pub fn witness_for_next_slot(&self) -> Result<MerkleWitness, StoreError> {
        let next = self.records.len() as u64;
        self.check_capacity(next)?;
        Ok(self.tree.witness(next)?)
    }

    pub fn witness_or_next_slot(&self, key: &R::Key) -> Result<MerkleWitness, StoreError> {
        match self.index_of(key) {
            Some(index) => Ok(self.tree.witness(index)?),
            None => self.witness_for_next_slot(),
        }
    }

    pub fn double_witness_for(
        &self,
        first: &R::Key,
        second: &R::Key,
    ) -> Result<MerkleDoubleWitness, StoreError> {
        let first = self.witness_for(first)?;
        let second = self.witness_for(second)?;
        Ok(MerkleDoubleWitness::new(first, second)?)
    }

    /// Appends `record` at the next slot. The store is left untouched when
    /// the key is already present or no slot remains.
    pub fn insert(&mut self, record: R) -> Result<usize, StoreError> {
        if self.index_of(&record.key()).is_some() {
            return Err(StoreError::AlreadyExists { kind: R::KIND });
        }
        let index = self.records.len();
        self.check_capacity(index as u64)?;
        self.tree.set_leaf(index as u64, record.commitment())?;
        trace!(kind = R::KIND, index, "record inserted");
        self.records.push(record);
        Ok(index)
    }

    /// Overwrites the stored record sharing `record`'s key.
    pub fn update(&mut self, record: R) -> Result<usize, StoreError> {
        let index = self
            .records
            .iter()
            .position(|stored| stored.matches(&record.key()))
            .ok_or(StoreError::NotFound { kind: R::KIND })?;
        self.tree.set_leaf(index as u64, record.commitment())?;
        trace!(kind = R::KIND, index, "record updated");
        self.records[index] = record;
        Ok(index)
    }

    pub fn upsert(&mut self, record: R) -> Result<usize, StoreError> {
        if self.index_of(&record.key()).is_some() {
            self.update(record)
        } else {
            self.insert(record)
        }
    }

    pub fn root(&self) -> Felt {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn height(&self) -> usize {
        self.tree.height()
    }

    pub fn capacity(&self) -> u64 {
        self.tree.capacity()
    }

    fn check_capacity(&self, index: u64) -> Result<(), StoreError> {
        let capacity = self.tree.capacity();
        if index >= capacity {
            return Err(StoreError::Full {
                kind: R::KIND,
                capacity,
            });
        }
        Ok(())
    }
}
