//! Types library for the atomic order-matching exchange protocol
//!
//! Core type definitions shared by the contract layer and its clients.
//!
//! # Modules
//! - `ids`: Identities (Address, H256, TxId)
//! - `numeric`: Integral token amounts on fixed-point decimals
//! - `order`: Order record and its enumerations
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::errors::*;
}
