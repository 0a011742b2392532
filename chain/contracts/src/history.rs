//! Exchange history rebuilt from the event log
//!
//! Off-chain observers never read exchange storage. They replay the log
//! stream and arrive at the same finalized set: `OrdersMatched` consumes
//! both hashes, `SettlementAborted` burns them, `OrderCancelled` cancels
//! one. Replay is deterministic and the resulting state has a checksum.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use tracing::{error, info};
use types::ids::{Address, H256};
use types::numeric::Amount;

use crate::events::{ContractEvent, Log, SettlementStage};
use crate::security::Finalization;

/// A successful match as seen in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub buy_hash: H256,
    pub sell_hash: H256,
    pub maker: Address,
    pub taker: Address,
    pub payment_token: Address,
    pub price: Amount,
    pub timestamp: i64,
}

/// A failed settlement that burned both orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnedPair {
    pub buy_hash: H256,
    pub sell_hash: H256,
    pub stage: SettlementStage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("log corruption at entry {index}: order {hash} finalized twice")]
    DuplicateFinalization { index: usize, hash: H256 },

    #[error("volume overflow for payment token {token}")]
    VolumeOverflow { token: Address },

    #[error("state checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Exchange state derived from logs.
#[derive(Debug, Clone, Default)]
pub struct ExchangeHistory {
    exchange: Address,
    fates: BTreeMap<H256, Finalization>,
    approved: BTreeSet<H256>,
    settlements: Vec<Settlement>,
    burned: Vec<BurnedPair>,
    volume: BTreeMap<Address, Amount>,
    events_applied: usize,
}

impl ExchangeHistory {
    pub fn new(exchange: Address) -> Self {
        Self {
            exchange,
            ..Default::default()
        }
    }

    /// Replay `logs`, keeping only events emitted by `exchange`.
    pub fn from_logs(exchange: Address, logs: &[Log]) -> Result<Self, HistoryError> {
        let mut history = Self::new(exchange);
        for (index, log) in logs.iter().enumerate() {
            history.apply(index, log)?;
        }
        info!(
            exchange = %exchange,
            events_applied = history.events_applied,
            settlements = history.settlements.len(),
            checksum = %history.checksum(),
            "Exchange history rebuilt"
        );
        Ok(history)
    }

    /// Like `from_logs`, then compare against a known checksum.
    pub fn from_logs_verified(
        exchange: Address,
        logs: &[Log],
        expected: &str,
    ) -> Result<Self, HistoryError> {
        let history = Self::from_logs(exchange, logs)?;
        let actual = history.checksum();
        if actual != expected {
            error!(expected = %expected, actual = %actual, "History checksum mismatch");
            return Err(HistoryError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(history)
    }

    /// Apply one log entry; `index` is its position for error reporting.
    pub fn apply(&mut self, index: usize, log: &Log) -> Result<(), HistoryError> {
        if log.emitter != self.exchange {
            return Ok(());
        }
        match &log.event {
            ContractEvent::OrderApproved { hash, .. } => {
                self.approved.insert(*hash);
            }
            ContractEvent::OrderCancelled { hash, .. } => {
                self.finalize(index, &[*hash], Finalization::Cancelled)?;
            }
            ContractEvent::OrdersMatched {
                buy_hash,
                sell_hash,
                maker,
                taker,
                payment_token,
                price,
                ..
            } => {
                self.finalize(index, &[*buy_hash, *sell_hash], Finalization::Consumed)?;
                let total = self.volume.entry(*payment_token).or_insert(Amount::ZERO);
                *total = total
                    .checked_add(*price)
                    .ok_or(HistoryError::VolumeOverflow { token: *payment_token })?;
                self.settlements.push(Settlement {
                    buy_hash: *buy_hash,
                    sell_hash: *sell_hash,
                    maker: *maker,
                    taker: *taker,
                    payment_token: *payment_token,
                    price: *price,
                    timestamp: log.timestamp,
                });
            }
            ContractEvent::SettlementAborted {
                buy_hash,
                sell_hash,
                stage,
                reason,
            } => {
                self.finalize(index, &[*buy_hash, *sell_hash], Finalization::Burned)?;
                self.burned.push(BurnedPair {
                    buy_hash: *buy_hash,
                    sell_hash: *sell_hash,
                    stage: *stage,
                    reason: reason.clone(),
                });
            }
            _ => return Ok(()),
        }
        self.events_applied += 1;
        Ok(())
    }

    /// Record `how` for every hash, or for none of them.
    fn finalize(
        &mut self,
        index: usize,
        hashes: &[H256],
        how: Finalization,
    ) -> Result<(), HistoryError> {
        if let Some(hash) = hashes.iter().find(|h| self.fates.contains_key(*h)) {
            return Err(HistoryError::DuplicateFinalization { index, hash: *hash });
        }
        for hash in hashes {
            self.fates.insert(*hash, how);
        }
        Ok(())
    }

    pub fn fate(&self, hash: &H256) -> Option<Finalization> {
        self.fates.get(hash).copied()
    }

    pub fn is_finalized(&self, hash: &H256) -> bool {
        self.fates.contains_key(hash)
    }

    pub fn fates(&self) -> &BTreeMap<H256, Finalization> {
        &self.fates
    }

    pub fn is_approved(&self, hash: &H256) -> bool {
        self.approved.contains(hash)
    }

    pub fn settlements(&self) -> &[Settlement] {
        &self.settlements
    }

    pub fn burned(&self) -> &[BurnedPair] {
        &self.burned
    }

    /// Total settled price in `payment_token`.
    pub fn volume(&self, payment_token: Address) -> Amount {
        self.volume.get(&payment_token).copied().unwrap_or(Amount::ZERO)
    }

    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    /// SHA-256 over the finalized set and volumes, hex encoded.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for (hash, fate) in &self.fates {
            hasher.update(hash.as_bytes());
            hasher.update([match fate {
                Finalization::Consumed => 0u8,
                Finalization::Cancelled => 1,
                Finalization::Burned => 2,
            }]);
        }
        for (token, amount) in &self.volume {
            hasher.update(token.as_bytes());
            hasher.update(amount.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::TxId;

    fn exchange() -> Address {
        Address::derive("contract", b"exchange")
    }

    fn log(event: ContractEvent) -> Log {
        Log {
            tx_id: TxId::new(),
            timestamp: 10,
            emitter: exchange(),
            event,
        }
    }

    fn matched(buy: u8, sell: u8, price: u64) -> ContractEvent {
        ContractEvent::OrdersMatched {
            buy_hash: H256::new([buy; 32]),
            sell_hash: H256::new([sell; 32]),
            maker: Address::derive("user", b"seller"),
            taker: Address::derive("user", b"buyer"),
            payment_token: Address::derive("contract", b"usdt"),
            price: Amount::new(price),
            metadata: H256::ZERO,
        }
    }

    #[test]
    fn test_rebuild_fates_and_volume() {
        let logs = vec![
            log(matched(1, 2, 100)),
            log(ContractEvent::OrderCancelled {
                hash: H256::new([3; 32]),
                maker: Address::derive("user", b"seller"),
            }),
            log(ContractEvent::SettlementAborted {
                buy_hash: H256::new([4; 32]),
                sell_hash: H256::new([5; 32]),
                stage: SettlementStage::Payment,
                reason: "insufficient allowance".to_string(),
            }),
            log(matched(6, 7, 50)),
        ];
        let history = ExchangeHistory::from_logs(exchange(), &logs).unwrap();
        assert_eq!(history.fate(&H256::new([1; 32])), Some(Finalization::Consumed));
        assert_eq!(history.fate(&H256::new([3; 32])), Some(Finalization::Cancelled));
        assert_eq!(history.fate(&H256::new([5; 32])), Some(Finalization::Burned));
        assert_eq!(history.settlements().len(), 2);
        assert_eq!(history.burned()[0].stage, SettlementStage::Payment);
        assert_eq!(history.volume(Address::derive("contract", b"usdt")), Amount::new(150));
        assert_eq!(history.events_applied(), 4);
    }

    #[test]
    fn test_foreign_emitters_ignored() {
        let mut foreign = log(matched(1, 2, 100));
        foreign.emitter = Address::derive("contract", b"impostor");
        let history = ExchangeHistory::from_logs(exchange(), &[foreign]).unwrap();
        assert!(!history.is_finalized(&H256::new([1; 32])));
        assert_eq!(history.events_applied(), 0);
    }

    #[test]
    fn test_double_finalization_is_corruption() {
        let logs = vec![log(matched(1, 2, 100)), log(matched(1, 9, 100))];
        let err = ExchangeHistory::from_logs(exchange(), &logs).unwrap_err();
        assert_eq!(
            err,
            HistoryError::DuplicateFinalization {
                index: 1,
                hash: H256::new([1; 32])
            }
        );
    }

    #[test]
    fn test_rejected_entry_leaves_state_untouched() {
        let mut history = ExchangeHistory::new(exchange());
        history.apply(0, &log(matched(1, 2, 100))).unwrap();
        let before = history.checksum();

        let replayed = log(ContractEvent::SettlementAborted {
            buy_hash: H256::new([9; 32]),
            sell_hash: H256::new([1; 32]),
            stage: SettlementStage::AssetTransfer,
            reason: "proof invalid".to_string(),
        });
        let err = history.apply(1, &replayed).unwrap_err();
        assert_eq!(
            err,
            HistoryError::DuplicateFinalization {
                index: 1,
                hash: H256::new([1; 32])
            }
        );
        assert_eq!(history.fate(&H256::new([1; 32])), Some(Finalization::Consumed));
        assert!(!history.is_finalized(&H256::new([9; 32])));
        assert!(history.burned().is_empty());
        assert_eq!(history.events_applied(), 1);
        assert_eq!(history.checksum(), before);
    }

    #[test]
    fn test_checksum_deterministic() {
        let logs = vec![log(matched(1, 2, 100)), log(matched(3, 4, 7))];
        let a = ExchangeHistory::from_logs(exchange(), &logs).unwrap();
        let b = ExchangeHistory::from_logs(exchange(), &logs).unwrap();
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);

        let partial = ExchangeHistory::from_logs(exchange(), &logs[..1]).unwrap();
        assert_ne!(a.checksum(), partial.checksum());
    }

    #[test]
    fn test_verified_replay() {
        let logs = vec![log(matched(1, 2, 100))];
        let expected = ExchangeHistory::from_logs(exchange(), &logs).unwrap().checksum();
        assert!(ExchangeHistory::from_logs_verified(exchange(), &logs, &expected).is_ok());
        assert!(matches!(
            ExchangeHistory::from_logs_verified(exchange(), &logs, "00"),
            Err(HistoryError::ChecksumMismatch { .. })
        ));
    }
}
