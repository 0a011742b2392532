//! Deployed protocol: registry, transfer proxy, validator, atomicizer and exchange
//!
//! `Chain` is the entry surface. Every state-changing call names its caller
//! and runs as a transaction: a failure leaves no effects, except the
//! finalized marks of a burned match.

use std::sync::Arc;

use tracing::info;
use types::ids::{Address, H256};
use types::numeric::Amount;
use types::order::{HowToCall, Order, OrderState};

use crate::config::{ChainConfig, ExchangeConfig};
use crate::env::{Code, Env, StaticCheck};
use crate::errors::{CallError, ConfigError, ExchangeError, LedgerError, RegistryError};
use crate::events::{ContractEvent, Log};
use crate::exchange::{CancelOutcome, Exchange, MatchReceipt};
use crate::history::{ExchangeHistory, HistoryError};
use crate::ledger::{AssetLedger, TokenKind};
use crate::merkle::MerkleValidator;
use crate::registry::{ProxyId, ProxyRegistry};
use crate::signing::OrderSignature;
use crate::transfer_proxy::TokenTransferProxy;

/// Deployment addresses of the protocol contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub exchange: Address,
    pub registry: Address,
    pub transfer_proxy: Address,
    pub merkle_validator: Address,
    pub atomicizer: Address,
}

impl Deployment {
    /// Addresses derived from the deploying owner.
    pub fn for_owner(owner: Address) -> Self {
        let at = |name: &str| {
            let mut seed = name.as_bytes().to_vec();
            seed.extend_from_slice(owner.as_bytes());
            Address::derive("contract", &seed)
        };
        Self {
            exchange: at("exchange"),
            registry: at("proxy-registry"),
            transfer_proxy: at("token-transfer-proxy"),
            merkle_validator: at("merkle-validator"),
            atomicizer: at("atomicizer"),
        }
    }
}

#[derive(Debug)]
pub struct Chain {
    env: Env,
    exchange: Exchange,
    deployment: Deployment,
}

impl Chain {
    /// Deploy every contract at `now` and register the exchange as the
    /// registry's default caller.
    pub fn new(config: ChainConfig, owner: Address, now: i64) -> Result<Self, ConfigError> {
        config.validate()?;
        if owner.is_zero() {
            return Err(ConfigError::Invalid("owner is the zero address".to_string()));
        }
        let deployment = Deployment::for_owner(owner);
        let deploy_err =
            |e: &dyn std::fmt::Display| ConfigError::Invalid(format!("deployment failed: {}", e));

        let mut registry = ProxyRegistry::new(
            deployment.registry,
            owner,
            config.registry.revoke_delay_seconds,
        );
        let granted = registry
            .grant_initial_authentication(owner, deployment.exchange)
            .map_err(|e| deploy_err(&e))?;
        let mut env = Env::new(
            now,
            registry,
            MerkleValidator::new(deployment.merkle_validator),
            TokenTransferProxy::new(deployment.transfer_proxy),
        );
        env.install(deployment.exchange, Code::System).map_err(|e| deploy_err(&e))?;
        env.install(deployment.atomicizer, Code::Atomicizer).map_err(|e| deploy_err(&e))?;
        env.begin_tx();
        env.emit(deployment.registry, granted);
        env.commit();

        let exchange = Exchange::new(deployment.exchange, owner, config.exchange);
        info!(
            exchange = %deployment.exchange,
            registry = %deployment.registry,
            owner = %owner,
            "Protocol deployed"
        );
        Ok(Self {
            env,
            exchange,
            deployment,
        })
    }

    pub fn deployment(&self) -> Deployment {
        self.deployment
    }

    // ───────────────────────── Clock ─────────────────────────

    pub fn now(&self) -> i64 {
        self.env.now()
    }

    pub fn set_time(&mut self, now: i64) {
        self.env.set_time(now);
    }

    pub fn advance_time(&mut self, seconds: i64) {
        let now = self.env.now().saturating_add(seconds);
        self.env.set_time(now);
    }

    // ───────────────────────── Tokens ─────────────────────────

    pub fn deploy_token(
        &mut self,
        address: Address,
        kind: TokenKind,
        name: &str,
    ) -> Result<(), LedgerError> {
        self.env.deploy_token(address, kind, name)
    }

    pub fn deploy_static_check(
        &mut self,
        address: Address,
        check: Arc<dyn StaticCheck>,
    ) -> Result<(), LedgerError> {
        self.env.deploy_static_check(address, check)
    }

    pub fn mint(&mut self, token: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        self.env.transact(|env| {
            let event = env.ledger.mint(token, to, amount)?;
            env.emit(token, event);
            Ok(())
        })
    }

    pub fn mint_nft(
        &mut self,
        token: Address,
        to: Address,
        token_id: u128,
    ) -> Result<(), LedgerError> {
        self.env.transact(|env| {
            let event = env.ledger.mint_nft(token, to, token_id)?;
            env.emit(token, event);
            Ok(())
        })
    }

    pub fn mint_multi(
        &mut self,
        token: Address,
        to: Address,
        token_id: u128,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.env.transact(|env| {
            let event = env.ledger.mint_multi(token, to, token_id, amount)?;
            env.emit(token, event);
            Ok(())
        })
    }

    /// Call a token contract directly, e.g. to approve the transfer proxy.
    pub fn token_call(
        &mut self,
        caller: Address,
        token: Address,
        calldata: &[u8],
    ) -> Result<(), CallError> {
        self.env.transact(|env| env.call(caller, token, calldata))
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
        self.env
            .transact(|env| env.transfer_tokens(caller, token, from, to, amount))
    }

    // ───────────────────────── Registry ─────────────────────────

    pub fn register_proxy(&mut self, user: Address) -> Result<ProxyId, RegistryError> {
        self.env.transact(|env| {
            let now = env.now();
            let (proxy, events) = env.registry.register_proxy(user, now)?;
            let registry = env.registry.address();
            env.emit_all(registry, events);
            Ok(proxy)
        })
    }

    pub fn grant_authority(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, now| registry.grant_authority(caller, proxy, target, now))
    }

    pub fn start_revoke(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, now| registry.start_revoke(caller, proxy, target, now))
    }

    pub fn end_revoke(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, now| registry.end_revoke(caller, proxy, target, now))
    }

    pub fn start_grant_authentication(
        &mut self,
        caller: Address,
        authority: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, now| {
            registry.start_grant_authentication(caller, authority, now)
        })
    }

    pub fn end_grant_authentication(
        &mut self,
        caller: Address,
        authority: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, now| registry.end_grant_authentication(caller, authority, now))
    }

    pub fn revoke_authentication(
        &mut self,
        caller: Address,
        authority: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, _| registry.revoke_authentication(caller, authority))
    }

    pub fn transfer_registry_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), RegistryError> {
        self.registry_op(|registry, _| registry.transfer_ownership(caller, new_owner))
    }

    fn registry_op(
        &mut self,
        op: impl FnOnce(&mut ProxyRegistry, i64) -> Result<ContractEvent, RegistryError>,
    ) -> Result<(), RegistryError> {
        self.env.transact(|env| {
            let now = env.now();
            let event = op(&mut env.registry, now)?;
            let registry = env.registry.address();
            env.emit(registry, event);
            Ok(())
        })
    }

    /// Have `proxy` call `target` on behalf of an authorized `caller`.
    pub fn proxy_call(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
        how: HowToCall,
        calldata: &[u8],
    ) -> Result<(), CallError> {
        self.env
            .transact(|env| env.proxy_call(caller, proxy, target, how, calldata))
    }

    // ───────────────────────── Merkle Validator ─────────────────────────

    pub fn set_merkle_root(&mut self, caller: Address, target: Address, root: H256) {
        let validator = self.deployment.merkle_validator;
        self.env.begin_tx();
        let event = self.env.merkle.set_merkle_root(caller, target, root);
        self.env.emit(validator, event);
        self.env.commit();
    }

    // ───────────────────────── Exchange ─────────────────────────

    pub fn hash_order(&self, order: &Order) -> H256 {
        self.exchange.hash_order(order)
    }

    pub fn hash_to_sign(&self, order: &Order) -> H256 {
        self.exchange.hash_to_sign(order)
    }

    pub fn check_order(
        &self,
        order: &Order,
        signature: &OrderSignature,
    ) -> Result<H256, ExchangeError> {
        self.exchange.check_order(&self.env, order, signature)
    }

    pub fn validate_order(&self, order: &Order, signature: &OrderSignature) -> bool {
        self.exchange.validate_order(&self.env, order, signature)
    }

    pub fn calculate_current_price(&self, order: &Order) -> Result<Amount, ExchangeError> {
        self.exchange.calculate_current_price(order, self.env.now())
    }

    pub fn calculate_match_price(
        &self,
        buy: &Order,
        sell: &Order,
    ) -> Result<Amount, ExchangeError> {
        self.exchange.calculate_match_price(buy, sell, self.env.now())
    }

    pub fn check_match(&self, buy: &Order, sell: &Order) -> Result<Amount, ExchangeError> {
        self.exchange
            .check_match(buy, sell, self.env.now())
            .map(|plan| plan.price)
    }

    pub fn orders_can_match(&self, buy: &Order, sell: &Order) -> bool {
        self.exchange.orders_can_match(&self.env, buy, sell)
    }

    pub fn order_state(&self, order: &Order) -> OrderState {
        self.exchange.order_state(order, self.env.now())
    }

    pub fn approve_order(
        &mut self,
        caller: Address,
        order: &Order,
        orderbook_inclusion_desired: bool,
    ) -> Result<H256, ExchangeError> {
        let exchange = &mut self.exchange;
        self.env
            .transact(|env| exchange.approve_order(env, caller, order, orderbook_inclusion_desired))
    }

    pub fn cancel_order(
        &mut self,
        caller: Address,
        order: &Order,
        cancel_signature: &OrderSignature,
    ) -> Result<CancelOutcome, ExchangeError> {
        let exchange = &mut self.exchange;
        self.env
            .transact(|env| exchange.cancel_order(env, caller, order, cancel_signature))
    }

    /// Match and settle. A failed settlement keeps both orders finalized.
    pub fn atomic_match(
        &mut self,
        caller: Address,
        buy: &Order,
        buy_signature: &OrderSignature,
        sell: &Order,
        sell_signature: &OrderSignature,
        metadata: H256,
    ) -> Result<MatchReceipt, ExchangeError> {
        self.env.begin_tx();
        let result = self.exchange.atomic_match(
            &mut self.env,
            caller,
            buy,
            buy_signature,
            sell,
            sell_signature,
            metadata,
        );
        self.env.commit();
        result
    }

    // ───────────────────────── Owner Operations ─────────────────────────

    pub fn change_minimum_maker_protocol_fee(
        &mut self,
        caller: Address,
        fee: Amount,
    ) -> Result<(), ExchangeError> {
        self.exchange_op(|exchange| exchange.change_minimum_maker_protocol_fee(caller, fee))
    }

    pub fn change_minimum_taker_protocol_fee(
        &mut self,
        caller: Address,
        fee: Amount,
    ) -> Result<(), ExchangeError> {
        self.exchange_op(|exchange| exchange.change_minimum_taker_protocol_fee(caller, fee))
    }

    pub fn change_protocol_fee_recipient(
        &mut self,
        caller: Address,
        recipient: Address,
    ) -> Result<(), ExchangeError> {
        self.exchange_op(|exchange| exchange.change_protocol_fee_recipient(caller, recipient))
    }

    pub fn transfer_exchange_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), ExchangeError> {
        self.exchange_op(|exchange| exchange.transfer_ownership(caller, new_owner))
    }

    fn exchange_op(
        &mut self,
        op: impl FnOnce(&mut Exchange) -> Result<ContractEvent, ExchangeError>,
    ) -> Result<(), ExchangeError> {
        let exchange = &mut self.exchange;
        self.env.transact(|env| {
            let event = op(exchange)?;
            env.emit(exchange.address(), event);
            Ok(())
        })
    }

    // ───────────────────────── Views ─────────────────────────

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub fn exchange_config(&self) -> &ExchangeConfig {
        self.exchange.config()
    }

    pub fn ledger(&self) -> &AssetLedger {
        &self.env.ledger
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.env.registry
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> Amount {
        self.env.ledger.balance_of(token, holder)
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.env.ledger.allowance(token, owner, spender)
    }

    pub fn owner_of(&self, token: Address, token_id: u128) -> Option<Address> {
        self.env.ledger.owner_of(token, token_id)
    }

    pub fn multi_balance_of(&self, token: Address, token_id: u128, holder: Address) -> Amount {
        self.env.ledger.multi_balance_of(token, token_id, holder)
    }

    pub fn proxy_of(&self, user: Address) -> Option<ProxyId> {
        self.env.registry.proxy_for(user)
    }

    pub fn is_authorized(&self, proxy: ProxyId, caller: Address) -> bool {
        self.env.registry.is_authorized(proxy, caller, self.env.now())
    }

    pub fn merkle_root(&self, user: Address, target: Address) -> Option<H256> {
        self.env.merkle.merkle_root(user, target)
    }

    pub fn logs(&self) -> &[Log] {
        self.env.logs()
    }

    pub fn events(&self) -> impl Iterator<Item = &ContractEvent> {
        self.env.logs().iter().map(|log| &log.event)
    }

    pub fn drain_logs(&mut self) -> Vec<Log> {
        self.env.drain_logs()
    }

    /// Exchange history replayed from the current log.
    pub fn history(&self) -> Result<ExchangeHistory, HistoryError> {
        ExchangeHistory::from_logs(self.deployment.exchange, self.env.logs())
    }
}
