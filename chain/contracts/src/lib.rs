//! Contract layer for the atomic order-matching exchange
//!
//! Signed orders are matched pairwise and settled in one step: the seller's
//! proxy performs the order's call, the buyer pays through the token transfer
//! proxy and fees are distributed. Either everything happens or the orders
//! are burned and nothing moves.
//!
//! # Modules
//! - `abi`: Calldata word codec and replacement masks
//! - `calls`: Typed builders and decoders for token and library calls
//! - `ledger`: Token contract state with a checkpoint journal
//! - `signing`: Order hashing and signer verification
//! - `registry`: User proxies and timelocked authority grants
//! - `transfer_proxy`: Moves fungible tokens for authorized callers
//! - `merkle`: Whitelist roots and proof verification for criteria calls
//! - `atomicizer`: All-or-nothing call bundles
//! - `env`: Execution environment tying contracts to code addresses
//! - `exchange`: Order validation, matching and settlement
//! - `history`: Exchange state rebuilt from the event log
//! - `chain`: Deployed protocol and its entry points
//! - `config`: Deployment configuration
//! - `security`: Ownership and the finalized-order set
//! - `events`, `errors`: Event and error taxonomy

pub mod abi;
pub mod atomicizer;
pub mod calls;
pub mod chain;
pub mod config;
pub mod env;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod history;
pub mod ledger;
pub mod merkle;
pub mod registry;
pub mod security;
pub mod signing;
pub mod transfer_proxy;

pub use chain::{Chain, Deployment};

/// Contract ABI version, frozen after release
pub const CONTRACT_ABI_VERSION: &str = "1.0.0";
