//! Order types for the signed-order exchange protocol
//!
//! An `Order` is created and signed off-chain by its maker and only reaches
//! the chain at match time (or when pre-approved by the maker). Orders are
//! immutable: changing any field yields a different order hash.

use serde::{Deserialize, Serialize};

use crate::ids::Address;
use crate::numeric::Amount;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    #[default]
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

/// How the order's price evolves over its listing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleKind {
    /// Constant `base_price`.
    #[default]
    FixedPrice,
    /// Linear move of `extra` across [listing, expiration]: down for sells, up for buys.
    DutchAuction,
    /// `base_price` is a reserve; the counter-order's bid sets the price.
    EnglishAuction,
}

impl SaleKind {
    pub fn as_u8(&self) -> u8 {
        match self {
            SaleKind::FixedPrice => 0,
            SaleKind::DutchAuction => 1,
            SaleKind::EnglishAuction => 2,
        }
    }
}

/// How fees attached to an order are charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeMethod {
    /// Relayer fees are fixed amounts of the payment token.
    ProtocolFee,
    /// Relayer and protocol fees are basis points of the price.
    #[default]
    SplitFee,
}

impl FeeMethod {
    pub fn as_u8(&self) -> u8 {
        match self {
            FeeMethod::ProtocolFee => 0,
            FeeMethod::SplitFee => 1,
        }
    }
}

/// Whether the seller's proxy calls the target or runs its code in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HowToCall {
    #[default]
    Call,
    DelegateCall,
}

impl HowToCall {
    pub fn as_u8(&self) -> u8 {
        match self {
            HowToCall::Call => 0,
            HowToCall::DelegateCall => 1,
        }
    }
}

/// Observable lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Signed and not finalized (it may not be listed yet)
    Created,
    /// Finalized by a settlement attempt (terminal)
    Consumed,
    /// Finalized by the maker (terminal)
    Cancelled,
    /// Past its expiration time without being finalized
    Expired,
}

impl OrderState {
    /// Check if the order can never be matched again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderState::Created)
    }
}

/// Complete order record.
///
/// Fee fields are basis points under `FeeMethod::SplitFee` and fixed
/// payment-token amounts under `FeeMethod::ProtocolFee`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Order {
    /// Exchange deployment this order is bound to
    pub exchange: Address,
    pub maker: Address,
    /// Zero means any taker
    pub taker: Address,
    pub maker_relayer_fee: Amount,
    pub taker_relayer_fee: Amount,
    pub maker_protocol_fee: Amount,
    pub taker_protocol_fee: Amount,
    /// Zero when the counter-order carries the fees
    pub fee_recipient: Address,
    pub fee_method: FeeMethod,
    pub side: Side,
    pub sale_kind: SaleKind,
    /// Contract the seller's proxy invokes
    pub target: Address,
    pub how_to_call: HowToCall,
    #[serde(with = "hex::serde")]
    pub calldata: Vec<u8>,
    /// Bit mask of calldata the counter-order may overwrite
    #[serde(with = "hex::serde")]
    pub replacement_pattern: Vec<u8>,
    /// Optional read-only precondition contract (zero = none)
    pub static_target: Address,
    #[serde(with = "hex::serde")]
    pub static_extradata: Vec<u8>,
    pub payment_token: Address,
    pub base_price: Amount,
    /// Dutch auctions: total price movement across the listing window
    pub extra: Amount,
    /// Unix seconds
    pub listing_time: i64,
    /// Unix seconds, 0 = never expires
    pub expiration_time: i64,
    pub salt: u128,
}

impl Order {
    /// Check the time invariant: a non-zero expiration must follow listing.
    pub fn check_invariant(&self) -> bool {
        self.expiration_time == 0 || self.expiration_time > self.listing_time
    }

    /// Whether the order is inside its listing window at `now`.
    pub fn is_listed_at(&self, now: i64) -> bool {
        self.listing_time <= now && (self.expiration_time == 0 || now < self.expiration_time)
    }

    /// Whether the order has passed its expiration at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiration_time != 0 && now >= self.expiration_time
    }

    pub fn has_static_precondition(&self) -> bool {
        !self.static_target.is_zero()
    }
}
