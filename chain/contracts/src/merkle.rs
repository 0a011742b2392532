//! Merkle Validator: proof-gated transfers through a user's proxy
//!
//! A user commits a whitelist of allowed transfers on a token as a single
//! Merkle root. A criteria-match call, executed inside the user's proxy by
//! delegate call, proves its transfer is a member of that whitelist before
//! the transfer is issued.
//!
//! Leaves and interior nodes are domain separated (`0x00` / `0x01` prefix)
//! and sibling pairs are hashed in sorted order, so proofs carry no
//! left/right flags.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;
use types::ids::{Address, H256};

use crate::abi::{self, Selector};
use crate::calls::CriteriaMatch;
use crate::errors::CallError;
use crate::events::ContractEvent;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub fn hash_leaf(data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    H256::new(hasher.finalize().into())
}

/// Interior node over two children, order independent.
pub fn hash_pair(a: &H256, b: &H256) -> H256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    H256::new(hasher.finalize().into())
}

/// Leaf for a whitelisted transfer: selector, token, then the criteria word
/// (token id, or amount for fungible tokens).
pub fn whitelist_leaf(selector: Selector, token: Address, value: u128) -> H256 {
    let mut data = Vec::with_capacity(4 + 2 * abi::WORD);
    data.extend_from_slice(&selector);
    data.extend_from_slice(&token.to_word());
    data.extend_from_slice(&abi::uint_word(value));
    hash_leaf(&data)
}

pub fn verify_proof(proof: &[H256], root: &H256, leaf: &H256) -> bool {
    let computed = proof.iter().fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    computed == *root
}

/// Off-chain tree builder for whitelist roots and proofs.
///
/// An odd node at the end of a level is promoted to the next level as is.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<H256>>,
}

impl MerkleTree {
    pub fn new(leaves: Vec<H256>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let next = levels
                .last()
                .map(|level| {
                    level
                        .chunks(2)
                        .map(|pair| match pair {
                            [a, b] => hash_pair(a, b),
                            [single] => *single,
                            _ => H256::ZERO,
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root of the tree, zero when empty.
    pub fn root(&self) -> H256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(H256::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Sibling path for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<Vec<H256>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut proof = Vec::new();
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = i ^ 1;
            if let Some(node) = level.get(sibling) {
                proof.push(*node);
            }
            i /= 2;
        }
        Some(proof)
    }
}

/// On-chain whitelist roots, one per (user, token).
#[derive(Debug)]
pub struct MerkleValidator {
    address: Address,
    roots: HashMap<(Address, Address), H256>,
}

impl MerkleValidator {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            roots: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Set the caller's root for `target`. A zero root clears it.
    pub fn set_merkle_root(
        &mut self,
        caller: Address,
        target: Address,
        root: H256,
    ) -> ContractEvent {
        if root.is_zero() {
            self.roots.remove(&(caller, target));
        } else {
            self.roots.insert((caller, target), root);
        }
        debug!(user = %caller, target = %target, root = %root, "Merkle root updated");
        ContractEvent::MerkleRootUpdated {
            user: caller,
            target,
            root,
        }
    }

    pub fn merkle_root(&self, user: Address, target: Address) -> Option<H256> {
        self.roots.get(&(user, target)).copied()
    }

    /// Verify a criteria match for the proxy owned by `owner`.
    ///
    /// The supplied root must equal the stored one and the proof must place
    /// the transfer's leaf under it.
    pub fn authorize(&self, owner: Address, call: &CriteriaMatch) -> Result<(), CallError> {
        let invalid = CallError::ProofInvalid { token: call.token };
        let stored = self.merkle_root(owner, call.token).ok_or_else(|| invalid.clone())?;
        if stored != call.root {
            return Err(invalid);
        }
        let leaf = whitelist_leaf(call.kind.transfer_selector(), call.token, call.criteria_value());
        if !verify_proof(&call.proof, &stored, &leaf) {
            return Err(invalid);
        }
        Ok(())
    }
}
