//! Contract-specific error types
//!
//! Error taxonomy for calldata decoding, the asset ledger, the proxy
//! registry, proxied call execution and the exchange. Lower layers convert
//! into higher ones with `#[from]`.

use thiserror::Error;
use types::errors::NumericError;
use types::ids::{Address, H256};
use types::numeric::Amount;

use crate::events::SettlementStage;

/// Calldata encoding/decoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AbiError {
    #[error("Calldata too short: need {needed} bytes, have {available}")]
    TooShort { needed: usize, available: usize },

    #[error("Dynamic offset out of bounds: {offset}")]
    OffsetOutOfBounds { offset: usize },

    #[error("Word is not a valid address")]
    InvalidAddress,

    #[error("Word does not fit in 128 bits")]
    ValueTooLarge,

    #[error("Word is not a valid bool")]
    InvalidBool,

    #[error("Unknown selector: 0x{0}")]
    UnknownSelector(String),

    #[error("Length mismatch: array {array}, desired {desired}, mask {mask}")]
    LengthMismatch {
        array: usize,
        desired: usize,
        mask: usize,
    },

    #[error("Decoded arguments do not match the expected layout")]
    UnexpectedTokens,
}

/// Token contract errors raised by the asset ledger
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("No token contract at {token}")]
    UnknownToken { token: Address },

    #[error("Token {token} is not a {expected} contract")]
    WrongTokenKind { token: Address, expected: &'static str },

    #[error("Insufficient {token} balance of {holder}: required {required}, available {available}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Allowance of {token} from {owner} to {spender} is {available}, required {required}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Token {token_id} of {token} does not exist")]
    NonexistentToken { token: Address, token_id: u128 },

    #[error("Token {token_id} of {token} is not owned by {claimed}")]
    NotOwner {
        token: Address,
        token_id: u128,
        claimed: Address,
    },

    #[error("{operator} is not approved to move assets of {owner} on {token}")]
    NotApproved {
        token: Address,
        owner: Address,
        operator: Address,
    },

    #[error("Token {token_id} of {token} already minted")]
    AlreadyMinted { token: Address, token_id: u128 },

    #[error("Transfer to the zero address")]
    ZeroAddress,

    #[error("Contract already deployed at {0}")]
    AddressInUse(Address),

    #[error("Arithmetic error: {0}")]
    Numeric(#[from] NumericError),
}

/// Proxy registry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unauthorized: {caller} lacks a current grant on proxy {proxy}")]
    Unauthorized { caller: Address, proxy: Address },

    #[error("Unauthorized: {caller} does not own proxy {proxy}")]
    NotProxyOwner { caller: Address, proxy: Address },

    #[error("Unauthorized: caller is not the registry owner")]
    NotOwner,

    #[error("No proxy registered for {user}")]
    ProxyNotRegistered { user: Address },

    #[error("Unknown proxy: {proxy}")]
    UnknownProxy { proxy: Address },

    #[error("No grant for {caller} on proxy {proxy}")]
    GrantNotFound { proxy: Address, caller: Address },

    #[error("Revocation of {caller} on proxy {proxy} was never started")]
    RevokeNotStarted { proxy: Address, caller: Address },

    #[error("Revocation already pending, available at {available_at}")]
    RevokeAlreadyPending { available_at: i64 },

    #[error("Too early: available at {available_at}")]
    TooEarly { available_at: i64 },

    #[error("No pending authentication for {0}")]
    AuthenticationNotStarted(Address),

    #[error("Initial authentication already granted")]
    InitialAuthenticationDone,

    #[error("Zero address not allowed")]
    ZeroAddress,
}

/// Errors from calls executed through proxies, the validator or the atomicizer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("No contract code at {target}")]
    NoCode { target: Address },

    #[error("Contract at {target} cannot be invoked with {how}")]
    UnsupportedCallKind { target: Address, how: &'static str },

    #[error("Invalid Merkle proof for {token}")]
    ProofInvalid { token: Address },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Sub-call {index} failed: {source}")]
    SubCallFailed {
        index: usize,
        source: Box<CallError>,
    },

    #[error("Calldata error: {0}")]
    Abi(#[from] AbiError),

    #[error("Token error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Why two orders cannot be matched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchFailure {
    #[error("orders must be one buy and one sell")]
    SideMismatch,

    #[error("fee methods differ")]
    FeeMethodMismatch,

    #[error("payment tokens differ")]
    PaymentTokenMismatch,

    #[error("taker restriction not satisfied")]
    TakerMismatch,

    #[error("exactly one order must carry a fee recipient")]
    FeeRecipientConflict,

    #[error("targets differ")]
    TargetMismatch,

    #[error("call kinds differ")]
    CallKindMismatch,

    #[error("counter-order does not accept fee: {0}")]
    FeeNotAccepted(&'static str),

    #[error("prices do not cross: buy {buy_price} < sell {sell_price}")]
    PriceNotCrossed { buy_price: Amount, sell_price: Amount },

    #[error("calldata differs after replacement")]
    CalldataMismatch,

    #[error("replacement pattern: {0}")]
    Replacement(AbiError),
}

/// Exchange-level errors
///
/// Every variant except `SettlementFailed` is raised before any state is
/// touched. `SettlementFailed` is raised after both orders were finalized:
/// the settlement's effects are rolled back but the orders stay burned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Order {hash} targets exchange {actual}, not {expected}")]
    WrongExchange {
        hash: H256,
        expected: Address,
        actual: Address,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Order {hash} not live at {now} (window {listing_time}..{expiration_time})")]
    OrderExpiredOrNotListed {
        hash: H256,
        now: i64,
        listing_time: i64,
        expiration_time: i64,
    },

    #[error("Order {hash} already finalized")]
    AlreadyFinalized { hash: H256 },

    #[error("Invalid signature for order {hash}")]
    InvalidSignature { hash: H256 },

    #[error("Static precondition {static_target} failed for order {hash}")]
    PreconditionFailed { hash: H256, static_target: Address },

    #[error("Orders incompatible: {0}")]
    OrdersIncompatible(#[from] MatchFailure),

    #[error("Unauthorized: {caller}")]
    Unauthorized { caller: Address },

    #[error("Order {hash} already approved")]
    AlreadyApproved { hash: H256 },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Arithmetic error: {0}")]
    Numeric(#[from] NumericError),

    #[error("Settlement failed in {stage:?}, orders {buy_hash}/{sell_hash} burned: {source}")]
    SettlementFailed {
        stage: SettlementStage,
        buy_hash: H256,
        sell_hash: H256,
        source: CallError,
    },
}

impl ExchangeError {
    /// Whether the failure happened after the orders were finalized.
    pub fn burns_orders(&self) -> bool {
        matches!(self, ExchangeError::SettlementFailed { .. })
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
