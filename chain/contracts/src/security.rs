//! Shared security primitives for contract modules
//!
//! Provides single-owner access control used by the registry and the
//! exchange, and the finalized-order set that gives replay protection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use types::ids::{Address, H256};

use crate::events::ContractEvent;

/// Single-owner access control.
///
/// Owner-only operations check the caller against the stored owner.
/// Ownership can be handed over but never renounced to the zero address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, caller: Address) -> bool {
        caller == self.owner
    }

    /// Hand ownership to `new_owner`. Returns `None` if the caller is not
    /// the owner or the new owner is the zero address.
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Option<ContractEvent> {
        if !self.is_owner(caller) || new_owner.is_zero() {
            return None;
        }
        let previous = self.owner;
        self.owner = new_owner;
        Some(ContractEvent::OwnershipTransferred {
            previous,
            new: new_owner,
        })
    }
}

/// How an order hash left the `Created` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Finalization {
    /// Settled by a successful match
    Consumed,
    /// Cancelled by its maker
    Cancelled,
    /// Consumed by a match whose settlement then failed
    Burned,
}

/// Permanent per-hash finalized flag.
///
/// A hash can be finalized exactly once. Marking several hashes is all or
/// nothing: every hash is checked before any is written.
#[derive(Debug, Clone, Default)]
pub struct FinalizedSet {
    entries: HashMap<H256, Finalization>,
}

impl FinalizedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self, hash: &H256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &H256) -> Option<Finalization> {
        self.entries.get(hash).copied()
    }

    /// Mark one hash. Returns `false` if it was already finalized.
    pub fn finalize(&mut self, hash: H256, how: Finalization) -> bool {
        self.finalize_all(&[hash], how).is_ok()
    }

    /// Mark every hash, or none. Returns the first hash already finalized.
    pub fn finalize_all(&mut self, hashes: &[H256], how: Finalization) -> Result<(), H256> {
        for (i, hash) in hashes.iter().enumerate() {
            // a duplicate within the batch is a replay of itself
            if self.entries.contains_key(hash) || hashes[..i].contains(hash) {
                return Err(*hash);
            }
        }
        for hash in hashes {
            self.entries.insert(*hash, how);
        }
        Ok(())
    }

    /// Downgrade consumed marks to burned after a failed settlement.
    pub fn mark_burned(&mut self, hashes: &[H256]) {
        for hash in hashes {
            if let Some(entry) = self.entries.get_mut(hash) {
                *entry = Finalization::Burned;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&H256, &Finalization)> {
        self.entries.iter()
    }
}
