//! Contract events
//!
//! Events are immutable records emitted by contract operations. Every event
//! is wrapped in a `Log` carrying the transaction id, block time and the
//! emitting contract. External observers rebuild exchange history from the
//! log stream alone (see `history`).

use serde::{Deserialize, Serialize};
use types::ids::{Address, TxId, H256};
use types::numeric::Amount;
use types::order::Order;

/// Phase of a settlement after both orders were finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStage {
    /// Seller proxy executes the order's call
    AssetTransfer,
    /// Buyer pays the seller through the token transfer proxy
    Payment,
    /// Relayer and protocol fees are distributed
    Fees,
}

/// Owner-tunable exchange parameter change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolParameter {
    MinimumMakerProtocolFee(Amount),
    MinimumTakerProtocolFee(Amount),
    ProtocolFeeRecipient(Address),
}

/// Enum wrapper for all contract events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    // ── Registry ──
    ProxyRegistered {
        user: Address,
        proxy: Address,
    },
    AuthorityGranted {
        proxy: Address,
        caller: Address,
    },
    RevokeStarted {
        proxy: Address,
        caller: Address,
        available_at: i64,
    },
    AuthorityRevoked {
        proxy: Address,
        caller: Address,
    },
    AuthenticationPending {
        caller: Address,
        available_at: i64,
    },
    AuthenticationGranted {
        caller: Address,
    },
    AuthenticationRevoked {
        caller: Address,
    },

    // ── Merkle validator ──
    MerkleRootUpdated {
        user: Address,
        target: Address,
        root: H256,
    },

    // ── Tokens ──
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: Amount,
    },
    NftTransfer {
        from: Address,
        to: Address,
        token_id: u128,
    },
    NftApproval {
        owner: Address,
        approved: Address,
        token_id: u128,
    },
    MultiTransfer {
        operator: Address,
        from: Address,
        to: Address,
        token_id: u128,
        amount: Amount,
    },
    ApprovalForAll {
        owner: Address,
        operator: Address,
        approved: bool,
    },

    // ── Exchange ──
    OrderApproved {
        hash: H256,
        order: Box<Order>,
        orderbook_inclusion_desired: bool,
    },
    OrderCancelled {
        hash: H256,
        maker: Address,
    },
    OrdersMatched {
        buy_hash: H256,
        sell_hash: H256,
        maker: Address,
        taker: Address,
        payment_token: Address,
        price: Amount,
        metadata: H256,
    },
    SettlementAborted {
        buy_hash: H256,
        sell_hash: H256,
        stage: SettlementStage,
        reason: String,
    },
    ParameterChanged(ProtocolParameter),
    OwnershipTransferred {
        previous: Address,
        new: Address,
    },
}

impl ContractEvent {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            ContractEvent::ProxyRegistered { .. } => "ProxyRegistered",
            ContractEvent::AuthorityGranted { .. } => "AuthorityGranted",
            ContractEvent::RevokeStarted { .. } => "RevokeStarted",
            ContractEvent::AuthorityRevoked { .. } => "AuthorityRevoked",
            ContractEvent::AuthenticationPending { .. } => "AuthenticationPending",
            ContractEvent::AuthenticationGranted { .. } => "AuthenticationGranted",
            ContractEvent::AuthenticationRevoked { .. } => "AuthenticationRevoked",
            ContractEvent::MerkleRootUpdated { .. } => "MerkleRootUpdated",
            ContractEvent::Transfer { .. } => "Transfer",
            ContractEvent::Approval { .. } => "Approval",
            ContractEvent::NftTransfer { .. } => "NftTransfer",
            ContractEvent::NftApproval { .. } => "NftApproval",
            ContractEvent::MultiTransfer { .. } => "MultiTransfer",
            ContractEvent::ApprovalForAll { .. } => "ApprovalForAll",
            ContractEvent::OrderApproved { .. } => "OrderApproved",
            ContractEvent::OrderCancelled { .. } => "OrderCancelled",
            ContractEvent::OrdersMatched { .. } => "OrdersMatched",
            ContractEvent::SettlementAborted { .. } => "SettlementAborted",
            ContractEvent::ParameterChanged(_) => "ParameterChanged",
            ContractEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
        }
    }
}

/// A logged event with its transaction context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub tx_id: TxId,
    pub timestamp: i64,
    /// Contract that emitted the event
    pub emitter: Address,
    pub event: ContractEvent,
}
