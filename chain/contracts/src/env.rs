//! Execution environment shared by all contracts
//!
//! Owns the block clock, the asset ledger, the registry, the Merkle
//! validator, the contract code table and the event log. Calls are routed
//! here by target address:
//!
//! - a plain call reaches a token contract, with the caller as `msg.sender`;
//! - a delegate call runs library code (Merkle validator, atomicizer) in the
//!   context of the calling proxy;
//! - a static call runs a read-only precondition contract against the ledger.
//!
//! Every state change is journaled; `checkpoint` / `revert_to` cover both
//! the ledger and the event log.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use types::ids::{Address, TxId};
use types::numeric::Amount;
use types::order::HowToCall;

use crate::abi::{self, ParamType, Token};
use crate::atomicizer;
use crate::calls::{self, LibraryCall};
use crate::errors::{CallError, LedgerError};
use crate::events::{ContractEvent, Log};
use crate::ledger::{AssetLedger, Checkpoint, TokenKind};
use crate::merkle::MerkleValidator;
use crate::registry::{ProxyId, ProxyRegistry};
use crate::transfer_proxy::TokenTransferProxy;

/// Read-only precondition contract.
///
/// Receives the order's static extradata and its calldata; the order is
/// only valid when the check returns `true`.
pub trait StaticCheck: Send + Sync {
    fn check(&self, ledger: &AssetLedger, extradata: &[u8], calldata: &[u8]) -> bool;
}

impl<F> StaticCheck for F
where
    F: Fn(&AssetLedger, &[u8], &[u8]) -> bool + Send + Sync,
{
    fn check(&self, ledger: &AssetLedger, extradata: &[u8], calldata: &[u8]) -> bool {
        self(ledger, extradata, calldata)
    }
}

/// Precondition: `holder` owns at least `minimum` of fungible `token`.
///
/// Extradata is `(address token, address holder, uint256 minimum)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceAtLeast;

impl BalanceAtLeast {
    pub fn extradata(token: Address, holder: Address, minimum: u128) -> Vec<u8> {
        abi::encode(&[Token::Address(token), Token::Address(holder), Token::Uint(minimum)])
    }
}

impl StaticCheck for BalanceAtLeast {
    fn check(&self, ledger: &AssetLedger, extradata: &[u8], _calldata: &[u8]) -> bool {
        match abi::decode(&[ParamType::Address, ParamType::Address, ParamType::Uint], extradata) {
            Ok(tokens) => match tokens.as_slice() {
                [Token::Address(token), Token::Address(holder), Token::Uint(minimum)] => {
                    ledger.balance_of(*token, *holder).to_u128() >= *minimum
                }
                _ => false,
            },
            Err(_) => false,
        }
    }
}

/// What lives at a contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Token(TokenKind),
    MerkleValidator,
    Atomicizer,
    StaticCheck,
    /// Core protocol contracts that accept no calldata
    System,
}

impl Code {
    fn is_library(&self) -> bool {
        matches!(self, Code::MerkleValidator | Code::Atomicizer)
    }
}

/// Position in both the ledger journal and the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvCheckpoint {
    ledger: Checkpoint,
    logs: usize,
}

pub struct Env {
    now: i64,
    pub ledger: AssetLedger,
    pub registry: ProxyRegistry,
    pub merkle: MerkleValidator,
    pub transfer_proxy: TokenTransferProxy,
    code: HashMap<Address, Code>,
    static_checks: HashMap<Address, Arc<dyn StaticCheck>>,
    logs: Vec<Log>,
    current_tx: TxId,
    depth: usize,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("now", &self.now)
            .field("contracts", &self.code.len())
            .field("logs", &self.logs.len())
            .field("current_tx", &self.current_tx)
            .finish()
    }
}

impl Env {
    pub fn new(
        now: i64,
        registry: ProxyRegistry,
        merkle: MerkleValidator,
        transfer_proxy: TokenTransferProxy,
    ) -> Self {
        let mut code = HashMap::new();
        code.insert(registry.address(), Code::System);
        code.insert(transfer_proxy.address(), Code::System);
        code.insert(merkle.address(), Code::MerkleValidator);
        Self {
            now,
            ledger: AssetLedger::new(),
            registry,
            merkle,
            transfer_proxy,
            code,
            static_checks: HashMap::new(),
            logs: Vec::new(),
            current_tx: TxId::new(),
            depth: 0,
        }
    }

    // ───────────────────────── Clock ─────────────────────────

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn set_time(&mut self, now: i64) {
        self.now = now;
    }

    // ───────────────────────── Code ─────────────────────────

    pub fn code_at(&self, address: Address) -> Option<Code> {
        self.code.get(&address).copied()
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.code.contains_key(&address)
    }

    /// Register code at an address that holds no contract yet.
    pub fn install(&mut self, address: Address, code: Code) -> Result<(), LedgerError> {
        if address.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if self.code.contains_key(&address) {
            return Err(LedgerError::AddressInUse(address));
        }
        self.code.insert(address, code);
        Ok(())
    }

    pub fn deploy_token(
        &mut self,
        address: Address,
        kind: TokenKind,
        name: &str,
    ) -> Result<(), LedgerError> {
        self.install(address, Code::Token(kind))?;
        if let Err(err) = self.ledger.deploy_token(address, kind, name) {
            self.code.remove(&address);
            return Err(err);
        }
        Ok(())
    }

    pub fn deploy_static_check(
        &mut self,
        address: Address,
        check: Arc<dyn StaticCheck>,
    ) -> Result<(), LedgerError> {
        self.install(address, Code::StaticCheck)?;
        self.static_checks.insert(address, check);
        Ok(())
    }

    // ───────────────────────── Transactions ─────────────────────────

    pub fn checkpoint(&self) -> EnvCheckpoint {
        EnvCheckpoint {
            ledger: self.ledger.checkpoint(),
            logs: self.logs.len(),
        }
    }

    pub fn revert_to(&mut self, checkpoint: EnvCheckpoint) {
        self.ledger.revert_to(checkpoint.ledger);
        self.logs.truncate(checkpoint.logs);
    }

    /// Start a new top-level transaction.
    pub fn begin_tx(&mut self) -> TxId {
        if self.depth == 0 {
            self.current_tx = TxId::new();
        }
        self.current_tx
    }

    /// Drop the undo journal of a finished top-level transaction.
    pub fn commit(&mut self) {
        if self.depth == 0 {
            self.ledger.commit();
        }
    }

    /// Run `f` as a transaction: on error every effect of `f` is reverted.
    pub fn transact<T, E>(&mut self, f: impl FnOnce(&mut Env) -> Result<T, E>) -> Result<T, E> {
        self.begin_tx();
        let checkpoint = self.checkpoint();
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        match result {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(err) => {
                self.revert_to(checkpoint);
                Err(err)
            }
        }
    }

    // ───────────────────────── Events ─────────────────────────

    pub fn emit(&mut self, emitter: Address, event: ContractEvent) {
        trace!(emitter = %emitter, event = event.label(), "Event emitted");
        self.logs.push(Log {
            tx_id: self.current_tx,
            timestamp: self.now,
            emitter,
            event,
        });
    }

    pub fn emit_all(&mut self, emitter: Address, events: impl IntoIterator<Item = ContractEvent>) {
        for event in events {
            self.emit(emitter, event);
        }
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn drain_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.logs)
    }

    // ───────────────────────── Calls ─────────────────────────

    /// Plain call from `caller` to a token contract.
    pub fn call(
        &mut self,
        caller: Address,
        target: Address,
        calldata: &[u8],
    ) -> Result<(), CallError> {
        match self.code_at(target) {
            None => Err(CallError::NoCode { target }),
            Some(Code::Token(_)) => {
                let call = calls::decode_token_call(calldata)?;
                trace!(caller = %caller, target = %target, call = ?call, "Token call");
                let event = self.ledger.apply_call(caller, target, call)?;
                self.emit(target, event);
                Ok(())
            }
            Some(_) => Err(CallError::UnsupportedCallKind {
                target,
                how: "call",
            }),
        }
    }

    /// Run library code at `target` in the context of `proxy`.
    pub fn delegate_call(
        &mut self,
        proxy: ProxyId,
        target: Address,
        calldata: &[u8],
    ) -> Result<(), CallError> {
        match self.code_at(target) {
            None => return Err(CallError::NoCode { target }),
            Some(code) if code.is_library() => {}
            Some(_) => {
                return Err(CallError::UnsupportedCallKind {
                    target,
                    how: "delegatecall",
                })
            }
        }
        match calls::decode_library_call(calldata)? {
            LibraryCall::Criteria(call) => {
                if self.code_at(target) != Some(Code::MerkleValidator) {
                    return Err(CallError::UnsupportedCallKind {
                        target,
                        how: "delegatecall",
                    });
                }
                let owner = self
                    .registry
                    .user_of(proxy)
                    .ok_or(crate::errors::RegistryError::UnknownProxy { proxy })?;
                self.merkle.authorize(owner, &call)?;
                debug!(
                    proxy = %proxy,
                    token = %call.token,
                    kind = ?call.kind,
                    "Criteria proof accepted"
                );
                let event = self.ledger.apply_call(proxy, call.token, call.to_token_call())?;
                self.emit(call.token, event);
                Ok(())
            }
            LibraryCall::Atomicize {
                targets,
                values,
                calldata_lengths,
                calldata,
            } => {
                if self.code_at(target) != Some(Code::Atomicizer) {
                    return Err(CallError::UnsupportedCallKind {
                        target,
                        how: "delegatecall",
                    });
                }
                let bundle =
                    atomicizer::split_bundle(&targets, &values, &calldata_lengths, &calldata)?;
                atomicizer::execute(self, proxy, &bundle)
            }
        }
    }

    /// Call `target` from `proxy` the way its code expects to be reached.
    pub fn dispatch(
        &mut self,
        proxy: ProxyId,
        target: Address,
        calldata: &[u8],
    ) -> Result<(), CallError> {
        match self.code_at(target) {
            Some(code) if code.is_library() => self.delegate_call(proxy, target, calldata),
            _ => self.call(proxy, target, calldata),
        }
    }

    /// Have `proxy` call `target` on behalf of `caller`, who must be authorized on it.
    pub fn proxy_call(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
        how: HowToCall,
        calldata: &[u8],
    ) -> Result<(), CallError> {
        self.registry.check_authority(proxy, caller, self.now)?;
        match how {
            HowToCall::Call => self.call(proxy, target, calldata),
            HowToCall::DelegateCall => self.delegate_call(proxy, target, calldata),
        }
    }

    /// Evaluate the precondition contract at `target`.
    pub fn static_call(
        &self,
        target: Address,
        extradata: &[u8],
        calldata: &[u8],
    ) -> Result<bool, CallError> {
        let check = self
            .static_checks
            .get(&target)
            .ok_or(CallError::NoCode { target })?;
        Ok(check.check(&self.ledger, extradata, calldata))
    }

    /// Move fungible tokens through the token transfer proxy.
    pub fn transfer_tokens(
        &mut self,
        caller: Address,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), CallError> {
        let event = self.transfer_proxy.transfer_tokens(
            &self.registry,
            &mut self.ledger,
            self.now,
            caller,
            token,
            from,
            to,
            amount,
        )?;
        self.emit(token, event);
        Ok(())
    }
}
