//! Asset ledger: fungible, non-fungible and multi-token balances
//!
//! Every deployed token contract keeps its state here, keyed by the token's
//! address. All writes go through the journal so that a transaction (or an
//! atomicized bundle inside one) can be rolled back to a checkpoint.
//!
//! Token operations take the immediate caller (`msg.sender`) explicitly. A
//! proxy moving a user's tokens calls with the proxy's own address, so
//! allowances and operator approvals are checked against the proxy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use types::ids::Address;
use types::numeric::Amount;

use crate::calls::TokenCall;
use crate::errors::LedgerError;
use crate::events::ContractEvent;

/// Token standard implemented by a deployed token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    /// ERC20-style fungible token
    Fungible,
    /// ERC721-style non-fungible token
    NonFungible,
    /// ERC1155-style semi-fungible token
    MultiToken,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Fungible => "fungible",
            TokenKind::NonFungible => "non-fungible",
            TokenKind::MultiToken => "multi-token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenInfo {
    kind: TokenKind,
    name: String,
}

type HolderKey = (Address, Address);
type AllowanceKey = (Address, Address, Address);
type NftKey = (Address, u128);
type MultiKey = (Address, u128, Address);

/// Undo record: the previous value of a single storage slot.
#[derive(Debug, Clone)]
enum JournalEntry {
    TokenDeployed(Address),
    Balance(HolderKey, Option<Amount>),
    Allowance(AllowanceKey, Option<Amount>),
    Supply(Address, Option<Amount>),
    NftOwner(NftKey, Option<Address>),
    NftApproval(NftKey, Option<Address>),
    Operator(AllowanceKey, Option<bool>),
    MultiBalance(MultiKey, Option<Amount>),
}

/// Journal position returned by [`AssetLedger::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(usize);

fn write_slot<K, V>(map: &mut HashMap<K, V>, key: K, value: Option<V>) -> Option<V>
where
    K: Eq + Hash,
{
    match value {
        Some(v) => map.insert(key, v),
        None => map.remove(&key),
    }
}

#[derive(Debug, Default)]
pub struct AssetLedger {
    tokens: HashMap<Address, TokenInfo>,
    /// Fungible balances and non-fungible holdings count: (token, holder)
    balances: HashMap<HolderKey, Amount>,
    /// (token, owner, spender)
    allowances: HashMap<AllowanceKey, Amount>,
    supply: HashMap<Address, Amount>,
    nft_owners: HashMap<NftKey, Address>,
    nft_approvals: HashMap<NftKey, Address>,
    /// (token, owner, operator)
    operators: HashMap<AllowanceKey, bool>,
    multi_balances: HashMap<MultiKey, Amount>,
    journal: Vec<JournalEntry>,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ───────────────────────── Journal ─────────────────────────

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Undo every write made after `checkpoint`.
    pub fn revert_to(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.0 {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::TokenDeployed(token) => {
                    self.tokens.remove(&token);
                }
                JournalEntry::Balance(key, prev) => {
                    write_slot(&mut self.balances, key, prev);
                }
                JournalEntry::Allowance(key, prev) => {
                    write_slot(&mut self.allowances, key, prev);
                }
                JournalEntry::Supply(key, prev) => {
                    write_slot(&mut self.supply, key, prev);
                }
                JournalEntry::NftOwner(key, prev) => {
                    write_slot(&mut self.nft_owners, key, prev);
                }
                JournalEntry::NftApproval(key, prev) => {
                    write_slot(&mut self.nft_approvals, key, prev);
                }
                JournalEntry::Operator(key, prev) => {
                    write_slot(&mut self.operators, key, prev);
                }
                JournalEntry::MultiBalance(key, prev) => {
                    write_slot(&mut self.multi_balances, key, prev);
                }
            }
        }
    }

    /// Drop undo records once the outermost transaction succeeded.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn set_balance(&mut self, key: HolderKey, value: Amount) {
        let prev = self.balances.insert(key, value);
        self.journal.push(JournalEntry::Balance(key, prev));
    }

    fn set_allowance(&mut self, key: AllowanceKey, value: Amount) {
        let prev = self.allowances.insert(key, value);
        self.journal.push(JournalEntry::Allowance(key, prev));
    }

    fn set_supply(&mut self, token: Address, value: Amount) {
        let prev = self.supply.insert(token, value);
        self.journal.push(JournalEntry::Supply(token, prev));
    }

    fn set_nft_owner(&mut self, key: NftKey, owner: Address) {
        let prev = self.nft_owners.insert(key, owner);
        self.journal.push(JournalEntry::NftOwner(key, prev));
    }

    fn set_nft_approval(&mut self, key: NftKey, approved: Option<Address>) {
        let prev = write_slot(&mut self.nft_approvals, key, approved);
        self.journal.push(JournalEntry::NftApproval(key, prev));
    }

    fn set_operator(&mut self, key: AllowanceKey, approved: bool) {
        let prev = self.operators.insert(key, approved);
        self.journal.push(JournalEntry::Operator(key, prev));
    }

    fn set_multi_balance(&mut self, key: MultiKey, value: Amount) {
        let prev = self.multi_balances.insert(key, value);
        self.journal.push(JournalEntry::MultiBalance(key, prev));
    }

    // ───────────────────────── Deployment & Minting ─────────────────────────

    pub fn deploy_token(
        &mut self,
        token: Address,
        kind: TokenKind,
        name: impl Into<String>,
    ) -> Result<(), LedgerError> {
        if self.tokens.contains_key(&token) {
            return Err(LedgerError::AddressInUse(token));
        }
        self.tokens.insert(
            token,
            TokenInfo {
                kind,
                name: name.into(),
            },
        );
        self.journal.push(JournalEntry::TokenDeployed(token));
        Ok(())
    }

    pub fn mint(
        &mut self,
        token: Address,
        to: Address,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::Fungible)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let supply = self
            .total_supply(token)
            .checked_add(amount)
            .ok_or(types::errors::NumericError::Overflow)?;
        let balance = self.safe_credit(token, to, amount)?;
        self.set_supply(token, supply);
        self.set_balance((token, to), balance);
        Ok(ContractEvent::Transfer {
            from: Address::ZERO,
            to,
            amount,
        })
    }

    pub fn mint_nft(
        &mut self,
        token: Address,
        to: Address,
        token_id: u128,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::NonFungible)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if self.nft_owners.contains_key(&(token, token_id)) {
            return Err(LedgerError::AlreadyMinted { token, token_id });
        }
        let count = self.safe_credit(token, to, Amount::new(1))?;
        self.set_balance((token, to), count);
        self.set_nft_owner((token, token_id), to);
        Ok(ContractEvent::NftTransfer {
            from: Address::ZERO,
            to,
            token_id,
        })
    }

    pub fn mint_multi(
        &mut self,
        token: Address,
        to: Address,
        token_id: u128,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::MultiToken)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let balance = self
            .multi_balance_of(token, token_id, to)
            .checked_add(amount)
            .ok_or(types::errors::NumericError::Overflow)?;
        self.set_multi_balance((token, token_id, to), balance);
        Ok(ContractEvent::MultiTransfer {
            operator: to,
            from: Address::ZERO,
            to,
            token_id,
            amount,
        })
    }

    // ───────────────────────── Views ─────────────────────────

    pub fn token_kind(&self, token: Address) -> Option<TokenKind> {
        self.tokens.get(&token).map(|info| info.kind)
    }

    pub fn token_name(&self, token: Address) -> Option<&str> {
        self.tokens.get(&token).map(|info| info.name.as_str())
    }

    /// Fungible balance, or number of NFTs held.
    pub fn balance_of(&self, token: Address, holder: Address) -> Amount {
        self.balances.get(&(token, holder)).copied().unwrap_or(Amount::ZERO)
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn total_supply(&self, token: Address) -> Amount {
        self.supply.get(&token).copied().unwrap_or(Amount::ZERO)
    }

    pub fn owner_of(&self, token: Address, token_id: u128) -> Option<Address> {
        self.nft_owners.get(&(token, token_id)).copied()
    }

    pub fn get_approved(&self, token: Address, token_id: u128) -> Option<Address> {
        self.nft_approvals.get(&(token, token_id)).copied()
    }

    pub fn is_approved_for_all(&self, token: Address, owner: Address, operator: Address) -> bool {
        self.operators
            .get(&(token, owner, operator))
            .copied()
            .unwrap_or(false)
    }

    pub fn multi_balance_of(&self, token: Address, token_id: u128, holder: Address) -> Amount {
        self.multi_balances
            .get(&(token, token_id, holder))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    // ───────────────────────── Token Calls ─────────────────────────

    /// Execute a decoded token call sent by `caller` to `token`.
    pub fn apply_call(
        &mut self,
        caller: Address,
        token: Address,
        call: TokenCall,
    ) -> Result<ContractEvent, LedgerError> {
        let kind = self.kind_of(token)?;
        match (kind, call) {
            (TokenKind::Fungible, TokenCall::Transfer { to, amount }) => {
                self.transfer(caller, token, to, Amount::from_u128(amount)?)
            }
            (TokenKind::Fungible, TokenCall::TransferFrom { from, to, value }) => {
                self.transfer_from(caller, token, from, to, Amount::from_u128(value)?)
            }
            (TokenKind::Fungible, TokenCall::Approve { spender, value }) => {
                self.approve(caller, token, spender, Amount::from_u128(value)?)
            }
            (TokenKind::NonFungible, TokenCall::TransferFrom { from, to, value }) => {
                self.transfer_nft(caller, token, from, to, value)
            }
            (TokenKind::NonFungible, TokenCall::SafeTransferFrom { from, to, token_id }) => {
                self.transfer_nft(caller, token, from, to, token_id)
            }
            (TokenKind::NonFungible, TokenCall::Approve { spender, value }) => {
                self.approve_nft(caller, token, spender, value)
            }
            (
                TokenKind::NonFungible | TokenKind::MultiToken,
                TokenCall::SetApprovalForAll { operator, approved },
            ) => self.set_approval_for_all(caller, token, operator, approved),
            (
                TokenKind::MultiToken,
                TokenCall::MultiSafeTransferFrom {
                    from,
                    to,
                    token_id,
                    amount,
                    ..
                },
            ) => self.transfer_multi(caller, token, from, to, token_id, Amount::from_u128(amount)?),
            (kind, call) => Err(LedgerError::WrongTokenKind {
                token,
                expected: match call {
                    TokenCall::Transfer { .. } => TokenKind::Fungible.name(),
                    TokenCall::SafeTransferFrom { .. } => TokenKind::NonFungible.name(),
                    TokenCall::MultiSafeTransferFrom { .. } => TokenKind::MultiToken.name(),
                    _ => kind.name(),
                },
            }),
        }
    }

    pub fn transfer(
        &mut self,
        caller: Address,
        token: Address,
        to: Address,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::Fungible)?;
        self.move_fungible(token, caller, to, amount)
    }

    /// Fungible `transferFrom`: spends `caller`'s allowance unless it moves its own funds.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::Fungible)?;
        if caller != from {
            let available = self.allowance(token, from, caller);
            let remaining = available
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientAllowance {
                    token,
                    owner: from,
                    spender: caller,
                    required: amount,
                    available,
                })?;
            // Check the balance before spending the allowance so the error names the real cause
            self.safe_debit(token, from, amount)?;
            self.set_allowance((token, from, caller), remaining);
        }
        self.move_fungible(token, from, to, amount)
    }

    pub fn approve(
        &mut self,
        caller: Address,
        token: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::Fungible)?;
        if spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.set_allowance((token, caller, spender), amount);
        Ok(ContractEvent::Approval {
            owner: caller,
            spender,
            amount,
        })
    }

    pub fn transfer_nft(
        &mut self,
        caller: Address,
        token: Address,
        from: Address,
        to: Address,
        token_id: u128,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::NonFungible)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let owner = self
            .owner_of(token, token_id)
            .ok_or(LedgerError::NonexistentToken { token, token_id })?;
        if owner != from {
            return Err(LedgerError::NotOwner {
                token,
                token_id,
                claimed: from,
            });
        }
        let allowed = caller == owner
            || self.get_approved(token, token_id) == Some(caller)
            || self.is_approved_for_all(token, owner, caller);
        if !allowed {
            return Err(LedgerError::NotApproved {
                token,
                owner,
                operator: caller,
            });
        }
        let from_count = self.safe_debit(token, from, Amount::new(1))?;
        let to_count = self.safe_credit(token, to, Amount::new(1))?;
        self.set_balance((token, from), from_count);
        self.set_balance((token, to), to_count);
        if self.get_approved(token, token_id).is_some() {
            self.set_nft_approval((token, token_id), None);
        }
        self.set_nft_owner((token, token_id), to);
        Ok(ContractEvent::NftTransfer { from, to, token_id })
    }

    pub fn approve_nft(
        &mut self,
        caller: Address,
        token: Address,
        approved: Address,
        token_id: u128,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::NonFungible)?;
        let owner = self
            .owner_of(token, token_id)
            .ok_or(LedgerError::NonexistentToken { token, token_id })?;
        if caller != owner && !self.is_approved_for_all(token, owner, caller) {
            return Err(LedgerError::NotApproved {
                token,
                owner,
                operator: caller,
            });
        }
        let slot = if approved.is_zero() { None } else { Some(approved) };
        self.set_nft_approval((token, token_id), slot);
        Ok(ContractEvent::NftApproval {
            owner,
            approved,
            token_id,
        })
    }

    pub fn set_approval_for_all(
        &mut self,
        caller: Address,
        token: Address,
        operator: Address,
        approved: bool,
    ) -> Result<ContractEvent, LedgerError> {
        match self.kind_of(token)? {
            TokenKind::NonFungible | TokenKind::MultiToken => {}
            TokenKind::Fungible => {
                return Err(LedgerError::WrongTokenKind {
                    token,
                    expected: "non-fungible or multi-token",
                })
            }
        }
        if operator.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.set_operator((token, caller, operator), approved);
        Ok(ContractEvent::ApprovalForAll {
            owner: caller,
            operator,
            approved,
        })
    }

    pub fn transfer_multi(
        &mut self,
        caller: Address,
        token: Address,
        from: Address,
        to: Address,
        token_id: u128,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        self.require_kind(token, TokenKind::MultiToken)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if caller != from && !self.is_approved_for_all(token, from, caller) {
            return Err(LedgerError::NotApproved {
                token,
                owner: from,
                operator: caller,
            });
        }
        let available = self.multi_balance_of(token, token_id, from);
        let from_balance = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                token,
                holder: from,
                required: amount,
                available,
            })?;
        self.set_multi_balance((token, token_id, from), from_balance);
        let to_balance = self
            .multi_balance_of(token, token_id, to)
            .checked_add(amount)
            .ok_or(types::errors::NumericError::Overflow)?;
        self.set_multi_balance((token, token_id, to), to_balance);
        Ok(ContractEvent::MultiTransfer {
            operator: caller,
            from,
            to,
            token_id,
            amount,
        })
    }

    // ───────────────────────── Internal ─────────────────────────

    fn kind_of(&self, token: Address) -> Result<TokenKind, LedgerError> {
        self.token_kind(token)
            .ok_or(LedgerError::UnknownToken { token })
    }

    fn require_kind(&self, token: Address, expected: TokenKind) -> Result<(), LedgerError> {
        if self.kind_of(token)? != expected {
            return Err(LedgerError::WrongTokenKind {
                token,
                expected: expected.name(),
            });
        }
        Ok(())
    }

    fn move_fungible(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<ContractEvent, LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let from_balance = self.safe_debit(token, from, amount)?;
        self.set_balance((token, from), from_balance);
        // Credit after the debit so self-transfers are a no-op
        let to_balance = self.safe_credit(token, to, amount)?;
        self.set_balance((token, to), to_balance);
        Ok(ContractEvent::Transfer { from, to, amount })
    }

    /// Balance after debiting `amount`, without writing it.
    fn safe_debit(
        &self,
        token: Address,
        holder: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let available = self.balance_of(token, holder);
        available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                token,
                holder,
                required: amount,
                available,
            })
    }

    /// Balance after crediting `amount`, without writing it.
    fn safe_credit(
        &self,
        token: Address,
        holder: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        self.balance_of(token, holder)
            .checked_add(amount)
            .ok_or_else(|| types::errors::NumericError::Overflow.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: &[u8]) -> Address {
        Address::derive("user", seed)
    }

    fn token(seed: &[u8]) -> Address {
        Address::derive("contract", seed)
    }

    fn setup() -> (AssetLedger, Address, Address) {
        let mut ledger = AssetLedger::new();
        let usdt = token(b"usdt");
        let nft = token(b"nft");
        ledger.deploy_token(usdt, TokenKind::Fungible, "USDT").unwrap();
        ledger.deploy_token(nft, TokenKind::NonFungible, "Punks").unwrap();
        ledger.mint(usdt, addr(b"alice"), Amount::new(1_000)).unwrap();
        ledger.mint_nft(nft, addr(b"alice"), 7).unwrap();
        ledger.commit();
        (ledger, usdt, nft)
    }

    #[test]
    fn test_deploy_twice_fails() {
        let (mut ledger, usdt, _) = setup();
        assert_eq!(
            ledger.deploy_token(usdt, TokenKind::Fungible, "again"),
            Err(LedgerError::AddressInUse(usdt))
        );
    }

    #[test]
    fn test_transfer_moves_balance() {
        let (mut ledger, usdt, _) = setup();
        ledger.transfer(addr(b"alice"), usdt, addr(b"bob"), Amount::new(300)).unwrap();
        assert_eq!(ledger.balance_of(usdt, addr(b"alice")), Amount::new(700));
        assert_eq!(ledger.balance_of(usdt, addr(b"bob")), Amount::new(300));
        assert_eq!(ledger.total_supply(usdt), Amount::new(1_000));
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let (mut ledger, usdt, _) = setup();
        let err = ledger
            .transfer(addr(b"bob"), usdt, addr(b"alice"), Amount::new(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let (mut ledger, usdt, _) = setup();
        ledger.transfer(addr(b"alice"), usdt, addr(b"alice"), Amount::new(10)).unwrap();
        assert_eq!(ledger.balance_of(usdt, addr(b"alice")), Amount::new(1_000));
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let (mut ledger, usdt, _) = setup();
        let spender = addr(b"proxy");
        ledger.approve(addr(b"alice"), usdt, spender, Amount::new(500)).unwrap();
        ledger
            .transfer_from(spender, usdt, addr(b"alice"), addr(b"bob"), Amount::new(200))
            .unwrap();
        assert_eq!(ledger.allowance(usdt, addr(b"alice"), spender), Amount::new(300));
        let err = ledger
            .transfer_from(spender, usdt, addr(b"alice"), addr(b"bob"), Amount::new(301))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_transfer_from_reports_balance_before_allowance_spend() {
        let (mut ledger, usdt, _) = setup();
        let spender = addr(b"proxy");
        ledger.approve(addr(b"alice"), usdt, spender, Amount::new(5_000)).unwrap();
        let err = ledger
            .transfer_from(spender, usdt, addr(b"alice"), addr(b"bob"), Amount::new(2_000))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.allowance(usdt, addr(b"alice"), spender), Amount::new(5_000));
    }

    #[test]
    fn test_nft_transfer_requires_approval() {
        let (mut ledger, _, nft) = setup();
        let operator = addr(b"proxy");
        let err = ledger
            .transfer_nft(operator, nft, addr(b"alice"), addr(b"bob"), 7)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotApproved { .. }));

        ledger.set_approval_for_all(addr(b"alice"), nft, operator, true).unwrap();
        ledger.transfer_nft(operator, nft, addr(b"alice"), addr(b"bob"), 7).unwrap();
        assert_eq!(ledger.owner_of(nft, 7), Some(addr(b"bob")));
        assert_eq!(ledger.balance_of(nft, addr(b"bob")), Amount::new(1));
        assert_eq!(ledger.balance_of(nft, addr(b"alice")), Amount::ZERO);
    }

    #[test]
    fn test_nft_single_approval_cleared_on_transfer() {
        let (mut ledger, _, nft) = setup();
        let carol = addr(b"carol");
        ledger.approve_nft(addr(b"alice"), nft, carol, 7).unwrap();
        ledger.transfer_nft(carol, nft, addr(b"alice"), addr(b"bob"), 7).unwrap();
        assert_eq!(ledger.get_approved(nft, 7), None);
    }

    #[test]
    fn test_nft_wrong_owner() {
        let (mut ledger, _, nft) = setup();
        let err = ledger
            .transfer_nft(addr(b"bob"), nft, addr(b"bob"), addr(b"carol"), 7)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner { .. }));
        assert!(matches!(
            ledger.transfer_nft(addr(b"alice"), nft, addr(b"alice"), addr(b"bob"), 8),
            Err(LedgerError::NonexistentToken { .. })
        ));
    }

    #[test]
    fn test_mint_nft_twice_fails() {
        let (mut ledger, _, nft) = setup();
        assert!(matches!(
            ledger.mint_nft(nft, addr(b"bob"), 7),
            Err(LedgerError::AlreadyMinted { .. })
        ));
    }

    #[test]
    fn test_multi_token_transfer() {
        let mut ledger = AssetLedger::new();
        let items = token(b"items");
        ledger.deploy_token(items, TokenKind::MultiToken, "Items").unwrap();
        ledger.mint_multi(items, addr(b"alice"), 1, Amount::new(10)).unwrap();
        ledger
            .transfer_multi(addr(b"alice"), items, addr(b"alice"), addr(b"bob"), 1, Amount::new(4))
            .unwrap();
        assert_eq!(ledger.multi_balance_of(items, 1, addr(b"alice")), Amount::new(6));
        assert_eq!(ledger.multi_balance_of(items, 1, addr(b"bob")), Amount::new(4));
        assert!(matches!(
            ledger.transfer_multi(
                addr(b"bob"),
                items,
                addr(b"alice"),
                addr(b"bob"),
                1,
                Amount::new(1)
            ),
            Err(LedgerError::NotApproved { .. })
        ));
    }

    #[test]
    fn test_apply_call_dispatches_by_kind() {
        let (mut ledger, usdt, nft) = setup();
        let call = TokenCall::TransferFrom {
            from: addr(b"alice"),
            to: addr(b"bob"),
            value: 7,
        };
        // token id 7 on the NFT, 7 units on the fungible token
        ledger.apply_call(addr(b"alice"), nft, call.clone()).unwrap();
        ledger.apply_call(addr(b"alice"), usdt, call).unwrap();
        assert_eq!(ledger.owner_of(nft, 7), Some(addr(b"bob")));
        assert_eq!(ledger.balance_of(usdt, addr(b"bob")), Amount::new(7));

        let err = ledger
            .apply_call(
                addr(b"alice"),
                usdt,
                TokenCall::SafeTransferFrom {
                    from: addr(b"alice"),
                    to: addr(b"bob"),
                    token_id: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::WrongTokenKind { .. }));
    }

    #[test]
    fn test_revert_restores_everything() {
        let (mut ledger, usdt, nft) = setup();
        let cp = ledger.checkpoint();
        ledger.transfer(addr(b"alice"), usdt, addr(b"bob"), Amount::new(400)).unwrap();
        ledger.approve(addr(b"alice"), usdt, addr(b"carol"), Amount::new(9)).unwrap();
        ledger.transfer_nft(addr(b"alice"), nft, addr(b"alice"), addr(b"bob"), 7).unwrap();
        ledger.deploy_token(token(b"late"), TokenKind::Fungible, "Late").unwrap();
        ledger.revert_to(cp);

        assert_eq!(ledger.balance_of(usdt, addr(b"alice")), Amount::new(1_000));
        assert_eq!(ledger.balance_of(usdt, addr(b"bob")), Amount::ZERO);
        assert_eq!(ledger.allowance(usdt, addr(b"alice"), addr(b"carol")), Amount::ZERO);
        assert_eq!(ledger.owner_of(nft, 7), Some(addr(b"alice")));
        assert_eq!(ledger.token_kind(token(b"late")), None);
        assert_eq!(ledger.journal_len(), cp.0);
    }

    #[test]
    fn test_nested_checkpoints() {
        let (mut ledger, usdt, _) = setup();
        let outer = ledger.checkpoint();
        ledger.transfer(addr(b"alice"), usdt, addr(b"bob"), Amount::new(1)).unwrap();
        let inner = ledger.checkpoint();
        ledger.transfer(addr(b"alice"), usdt, addr(b"bob"), Amount::new(2)).unwrap();
        ledger.revert_to(inner);
        assert_eq!(ledger.balance_of(usdt, addr(b"bob")), Amount::new(1));
        ledger.revert_to(outer);
        assert_eq!(ledger.balance_of(usdt, addr(b"bob")), Amount::ZERO);
    }
}
