//! Exchange: validates, matches and settles pairs of signed orders
//!
//! Per-order state machine: `Created → {Consumed | Cancelled}`, with
//! `Expired` implied by the clock. A hash leaves `Created` at most once.
//!
//! Settlement sequence for `atomic_match`:
//! 1. validate both orders and check they are compatible (no state touched);
//! 2. pre-flight: target code, seller proxy, exchange authority on every
//!    proxy whose funds move;
//! 3. finalize both hashes in one step;
//! 4. under a checkpoint: asset transfer through the seller's proxy, payment
//!    through the token transfer proxy, then fees.
//!
//! A failure in step 4 reverts every effect of step 4 but leaves both hashes
//! finalized: the orders are burned.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};
use types::errors::NumericError;
use types::ids::{Address, H256};
use types::numeric::Amount;
use types::order::{FeeMethod, Order, OrderState, SaleKind, Side};

use crate::abi;
use crate::config::ExchangeConfig;
use crate::env::Env;
use crate::errors::{CallError, ExchangeError, MatchFailure, RegistryError};
use crate::events::{ContractEvent, ProtocolParameter, SettlementStage};
use crate::security::{Finalization, FinalizedSet, Ownable};
use crate::signing::{self, OrderSignature};

/// Result of `cancel_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(H256),
    /// The order was already consumed or cancelled; nothing changed
    AlreadyFinalized(H256),
}

/// A token movement executed during settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment {
    pub stage: SettlementStage,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// Outcome of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReceipt {
    pub buy_hash: H256,
    pub sell_hash: H256,
    pub price: Amount,
    pub payments: Vec<Payment>,
}

/// Everything `check_match` establishes about a compatible pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    pub price: Amount,
    /// Sell calldata after the buyer's replacement bytes were applied
    pub calldata: Vec<u8>,
}

#[derive(Debug)]
pub struct Exchange {
    address: Address,
    owner: Ownable,
    config: ExchangeConfig,
    finalized: FinalizedSet,
    approved: HashSet<H256>,
}

impl Exchange {
    pub fn new(address: Address, owner: Address, mut config: ExchangeConfig) -> Self {
        if config.protocol_fee_recipient.is_zero() {
            config.protocol_fee_recipient = owner;
        }
        Self {
            address,
            owner: Ownable::new(owner),
            config,
            finalized: FinalizedSet::new(),
            approved: HashSet::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner.owner()
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn hash_order(&self, order: &Order) -> H256 {
        signing::hash_order(order)
    }

    /// Digest a maker signs for `order` on this exchange.
    pub fn hash_to_sign(&self, order: &Order) -> H256 {
        signing::hash_to_sign(&signing::hash_order(order), &self.address)
    }

    pub fn is_finalized(&self, hash: &H256) -> bool {
        self.finalized.is_finalized(hash)
    }

    pub fn finalization(&self, hash: &H256) -> Option<Finalization> {
        self.finalized.get(hash)
    }

    /// Snapshot of every finalized hash, in hash order.
    pub fn finalized_orders(&self) -> BTreeMap<H256, Finalization> {
        self.finalized.iter().map(|(h, f)| (*h, *f)).collect()
    }

    pub fn is_approved(&self, hash: &H256) -> bool {
        self.approved.contains(hash)
    }

    pub fn order_state(&self, order: &Order, now: i64) -> OrderState {
        match self.finalized.get(&signing::hash_order(order)) {
            Some(Finalization::Cancelled) => OrderState::Cancelled,
            Some(Finalization::Consumed | Finalization::Burned) => OrderState::Consumed,
            None if order.is_expired_at(now) => OrderState::Expired,
            None => OrderState::Created,
        }
    }

    // ───────────────────────── Validation ─────────────────────────

    /// Static sanity of an order's parameters.
    pub fn validate_order_parameters(&self, order: &Order) -> Result<(), ExchangeError> {
        let malformed = |reason: &str| Err(ExchangeError::MalformedInput(reason.to_string()));
        if !order.check_invariant() {
            return malformed("expiration must follow listing time");
        }
        if order.maker.is_zero() {
            return malformed("maker is the zero address");
        }
        if order.payment_token.is_zero() {
            return malformed("payment token is the zero address");
        }
        if order.sale_kind == SaleKind::DutchAuction {
            if order.expiration_time == 0 {
                return malformed("dutch auction requires an expiration time");
            }
            if order.side == Side::Sell && order.extra > order.base_price {
                return malformed("dutch auction decline exceeds base price");
            }
        }
        if order.fee_method == FeeMethod::SplitFee
            && (order.maker_protocol_fee < self.config.minimum_maker_protocol_fee
                || order.taker_protocol_fee < self.config.minimum_taker_protocol_fee)
        {
            return malformed("protocol fees below the configured minimum");
        }
        Ok(())
    }

    /// Full validation; returns the order hash. Checks stop at the first failure.
    pub fn check_order(
        &self,
        env: &Env,
        order: &Order,
        signature: &OrderSignature,
    ) -> Result<H256, ExchangeError> {
        self.check_order_inner(env, order, signature, false)
    }

    pub fn validate_order(&self, env: &Env, order: &Order, signature: &OrderSignature) -> bool {
        match self.check_order(env, order, signature) {
            Ok(_) => true,
            Err(err) => {
                debug!(maker = %order.maker, error = %err, "Order rejected");
                false
            }
        }
    }

    fn check_order_inner(
        &self,
        env: &Env,
        order: &Order,
        signature: &OrderSignature,
        skip_signature: bool,
    ) -> Result<H256, ExchangeError> {
        let hash = signing::hash_order(order);
        if order.exchange != self.address {
            return Err(ExchangeError::WrongExchange {
                hash,
                expected: self.address,
                actual: order.exchange,
            });
        }
        self.validate_order_parameters(order)?;
        let now = env.now();
        if !order.is_listed_at(now) {
            return Err(ExchangeError::OrderExpiredOrNotListed {
                hash,
                now,
                listing_time: order.listing_time,
                expiration_time: order.expiration_time,
            });
        }
        if self.finalized.is_finalized(&hash) {
            return Err(ExchangeError::AlreadyFinalized { hash });
        }
        if !skip_signature && !self.approved.contains(&hash) {
            let digest = signing::hash_to_sign(&hash, &self.address);
            if !signing::validate_signature(&digest, &order.maker, signature) {
                return Err(ExchangeError::InvalidSignature { hash });
            }
        }
        if order.has_static_precondition() {
            let passed = env
                .static_call(order.static_target, &order.static_extradata, &order.calldata)
                .unwrap_or(false);
            if !passed {
                return Err(ExchangeError::PreconditionFailed {
                    hash,
                    static_target: order.static_target,
                });
            }
        }
        Ok(hash)
    }

    // ───────────────────────── Pricing ─────────────────────────

    /// Price of `order` at `now`.
    pub fn calculate_current_price(
        &self,
        order: &Order,
        now: i64,
    ) -> Result<Amount, ExchangeError> {
        match order.sale_kind {
            SaleKind::FixedPrice | SaleKind::EnglishAuction => Ok(order.base_price),
            SaleKind::DutchAuction => {
                if order.expiration_time == 0 || order.expiration_time <= order.listing_time {
                    return Err(ExchangeError::MalformedInput(
                        "dutch auction requires a listing window".to_string(),
                    ));
                }
                let duration = order.expiration_time - order.listing_time;
                let elapsed = now.saturating_sub(order.listing_time).clamp(0, duration);
                let diff = order.extra.mul_div_floor(
                    Amount::new(elapsed as u64),
                    Amount::new(duration as u64),
                )?;
                match order.side {
                    Side::Sell => Ok(order.base_price.try_sub(diff)?),
                    Side::Buy => order
                        .base_price
                        .checked_add(diff)
                        .ok_or(ExchangeError::Numeric(NumericError::Overflow)),
                }
            }
        }
    }

    /// Settlement price for a pair; the bid must cover the ask.
    pub fn calculate_match_price(
        &self,
        buy: &Order,
        sell: &Order,
        now: i64,
    ) -> Result<Amount, ExchangeError> {
        let sell_price = self.calculate_current_price(sell, now)?;
        let buy_price = self.calculate_current_price(buy, now)?;
        if buy_price < sell_price {
            return Err(MatchFailure::PriceNotCrossed {
                buy_price,
                sell_price,
            }
            .into());
        }
        if sell.sale_kind == SaleKind::EnglishAuction {
            return Ok(buy_price);
        }
        // the maker's price wins
        if sell.fee_recipient.is_zero() {
            Ok(buy_price)
        } else {
            Ok(sell_price)
        }
    }

    // ───────────────────────── Matching ─────────────────────────

    /// Check two orders are compatible; returns the price and the calldata to execute.
    pub fn check_match(
        &self,
        buy: &Order,
        sell: &Order,
        now: i64,
    ) -> Result<MatchPlan, ExchangeError> {
        if buy.side != Side::Buy || sell.side != Side::Sell {
            return Err(MatchFailure::SideMismatch.into());
        }
        if buy.fee_method != sell.fee_method {
            return Err(MatchFailure::FeeMethodMismatch.into());
        }
        if buy.payment_token != sell.payment_token {
            return Err(MatchFailure::PaymentTokenMismatch.into());
        }
        let sell_taker_ok = sell.taker.is_zero() || sell.taker == buy.maker;
        let buy_taker_ok = buy.taker.is_zero() || buy.taker == sell.maker;
        if !sell_taker_ok || !buy_taker_ok {
            return Err(MatchFailure::TakerMismatch.into());
        }
        if buy.fee_recipient.is_zero() == sell.fee_recipient.is_zero() {
            return Err(MatchFailure::FeeRecipientConflict.into());
        }
        if buy.target != sell.target {
            return Err(MatchFailure::TargetMismatch.into());
        }
        if buy.how_to_call != sell.how_to_call {
            return Err(MatchFailure::CallKindMismatch.into());
        }
        check_fee_consent(buy, sell)?;
        let price = self.calculate_match_price(buy, sell, now)?;
        let calldata = merge_calldata(buy, sell)?;
        Ok(MatchPlan { price, calldata })
    }

    pub fn orders_can_match(&self, env: &Env, buy: &Order, sell: &Order) -> bool {
        self.check_match(buy, sell, env.now()).is_ok()
    }

    /// Token movements settling a match at `price`.
    pub fn plan_payments(
        &self,
        buy: &Order,
        sell: &Order,
        price: Amount,
    ) -> Result<Vec<Payment>, ExchangeError> {
        let mut payments = vec![Payment {
            stage: SettlementStage::Payment,
            from: buy.maker,
            to: sell.maker,
            amount: price,
        }];
        let protocol = self.config.protocol_fee_recipient;
        let mut fee = |from: Address, to: Address, amount: Amount| {
            payments.push(Payment {
                stage: SettlementStage::Fees,
                from,
                to,
                amount,
            })
        };
        // the order carrying the fee recipient is the maker side
        let (maker_order, maker, taker) = if sell.fee_recipient.is_zero() {
            (buy, buy.maker, sell.maker)
        } else {
            (sell, sell.maker, buy.maker)
        };
        let recipient = maker_order.fee_recipient;
        match sell.fee_method {
            FeeMethod::SplitFee => {
                fee(maker, recipient, price.bps_floor(maker_order.maker_relayer_fee)?);
                fee(taker, recipient, price.bps_floor(maker_order.taker_relayer_fee)?);
                fee(maker, protocol, price.bps_floor(maker_order.maker_protocol_fee)?);
                fee(taker, protocol, price.bps_floor(maker_order.taker_protocol_fee)?);
            }
            FeeMethod::ProtocolFee => {
                fee(maker, recipient, maker_order.maker_relayer_fee);
                fee(taker, recipient, maker_order.taker_relayer_fee);
            }
        }
        payments.retain(|p| !p.amount.is_zero());
        Ok(payments)
    }

    /// Validate, match and settle `buy` against `sell`.
    ///
    /// A caller who is an order's maker needs no signature for that order.
    #[allow(clippy::too_many_arguments)]
    pub fn atomic_match(
        &mut self,
        env: &mut Env,
        caller: Address,
        buy: &Order,
        buy_signature: &OrderSignature,
        sell: &Order,
        sell_signature: &OrderSignature,
        metadata: H256,
    ) -> Result<MatchReceipt, ExchangeError> {
        let buy_hash = self.check_order_inner(env, buy, buy_signature, caller == buy.maker)?;
        let sell_hash = self.check_order_inner(env, sell, sell_signature, caller == sell.maker)?;
        let plan = self.check_match(buy, sell, env.now())?;
        let payments = self.plan_payments(buy, sell, plan.price)?;

        // Pre-flight: nothing below may fail for a reason visible before finalization
        if !env.has_code(sell.target) {
            return Err(ExchangeError::MalformedInput(format!(
                "target {} has no code",
                sell.target
            )));
        }
        let now = env.now();
        let seller_proxy = env
            .registry
            .proxy_for(sell.maker)
            .ok_or(RegistryError::ProxyNotRegistered { user: sell.maker })?;
        env.registry.check_authority(seller_proxy, self.address, now)?;
        for payment in &payments {
            let proxy = env
                .registry
                .proxy_for(payment.from)
                .ok_or(RegistryError::ProxyNotRegistered { user: payment.from })?;
            env.registry.check_authority(proxy, self.address, now)?;
        }

        self.finalized
            .finalize_all(&[buy_hash, sell_hash], Finalization::Consumed)
            .map_err(|hash| ExchangeError::AlreadyFinalized { hash })?;

        let checkpoint = env.checkpoint();
        let settled = self.settle(env, seller_proxy, sell, &plan.calldata, &payments);
        if let Err((stage, source)) = settled {
            env.revert_to(checkpoint);
            self.finalized.mark_burned(&[buy_hash, sell_hash]);
            warn!(
                buy = %buy_hash,
                sell = %sell_hash,
                stage = ?stage,
                error = %source,
                "Settlement failed, orders burned"
            );
            env.emit(
                self.address,
                ContractEvent::SettlementAborted {
                    buy_hash,
                    sell_hash,
                    stage,
                    reason: source.to_string(),
                },
            );
            return Err(ExchangeError::SettlementFailed {
                stage,
                buy_hash,
                sell_hash,
                source,
            });
        }

        let (maker, taker) = if sell.fee_recipient.is_zero() {
            (buy.maker, sell.maker)
        } else {
            (sell.maker, buy.maker)
        };
        env.emit(
            self.address,
            ContractEvent::OrdersMatched {
                buy_hash,
                sell_hash,
                maker,
                taker,
                payment_token: sell.payment_token,
                price: plan.price,
                metadata,
            },
        );
        info!(
            buy = %buy_hash,
            sell = %sell_hash,
            price = %plan.price,
            payment_token = %sell.payment_token,
            "Orders matched"
        );
        Ok(MatchReceipt {
            buy_hash,
            sell_hash,
            price: plan.price,
            payments,
        })
    }

    fn settle(
        &self,
        env: &mut Env,
        seller_proxy: Address,
        sell: &Order,
        calldata: &[u8],
        payments: &[Payment],
    ) -> Result<(), (SettlementStage, CallError)> {
        env.proxy_call(self.address, seller_proxy, sell.target, sell.how_to_call, calldata)
            .map_err(|e| (SettlementStage::AssetTransfer, e))?;
        for payment in payments {
            env.transfer_tokens(
                self.address,
                sell.payment_token,
                payment.from,
                payment.to,
                payment.amount,
            )
            .map_err(|e| (payment.stage, e))?;
        }
        Ok(())
    }

    // ───────────────────────── Maker Operations ─────────────────────────

    /// Record the order hash as authorized without a signature.
    pub fn approve_order(
        &mut self,
        env: &mut Env,
        caller: Address,
        order: &Order,
        orderbook_inclusion_desired: bool,
    ) -> Result<H256, ExchangeError> {
        if caller != order.maker {
            return Err(ExchangeError::Unauthorized { caller });
        }
        let hash = signing::hash_order(order);
        if !self.approved.insert(hash) {
            return Err(ExchangeError::AlreadyApproved { hash });
        }
        debug!(hash = %hash, maker = %caller, "Order approved");
        env.emit(
            self.address,
            ContractEvent::OrderApproved {
                hash,
                order: Box::new(order.clone()),
                orderbook_inclusion_desired,
            },
        );
        Ok(hash)
    }

    /// Cancel an order, by its maker or with the maker's signed cancellation.
    pub fn cancel_order(
        &mut self,
        env: &mut Env,
        caller: Address,
        order: &Order,
        cancel_signature: &OrderSignature,
    ) -> Result<CancelOutcome, ExchangeError> {
        let hash = signing::hash_order(order);
        if order.exchange != self.address {
            return Err(ExchangeError::WrongExchange {
                hash,
                expected: self.address,
                actual: order.exchange,
            });
        }
        if caller != order.maker {
            let digest = signing::hash_to_cancel(&hash, &self.address);
            if !signing::validate_signature(&digest, &order.maker, cancel_signature) {
                return Err(ExchangeError::Unauthorized { caller });
            }
        }
        if !self.finalized.finalize(hash, Finalization::Cancelled) {
            debug!(hash = %hash, "Cancel of finalized order ignored");
            return Ok(CancelOutcome::AlreadyFinalized(hash));
        }
        info!(hash = %hash, maker = %order.maker, "Order cancelled");
        env.emit(
            self.address,
            ContractEvent::OrderCancelled {
                hash,
                maker: order.maker,
            },
        );
        Ok(CancelOutcome::Cancelled(hash))
    }

    // ───────────────────────── Owner Operations ─────────────────────────

    fn require_owner(&self, caller: Address) -> Result<(), ExchangeError> {
        if !self.owner.is_owner(caller) {
            return Err(ExchangeError::Unauthorized { caller });
        }
        Ok(())
    }

    pub fn change_minimum_maker_protocol_fee(
        &mut self,
        caller: Address,
        fee: Amount,
    ) -> Result<ContractEvent, ExchangeError> {
        self.require_owner(caller)?;
        self.config.minimum_maker_protocol_fee = fee;
        Ok(ContractEvent::ParameterChanged(ProtocolParameter::MinimumMakerProtocolFee(fee)))
    }

    pub fn change_minimum_taker_protocol_fee(
        &mut self,
        caller: Address,
        fee: Amount,
    ) -> Result<ContractEvent, ExchangeError> {
        self.require_owner(caller)?;
        self.config.minimum_taker_protocol_fee = fee;
        Ok(ContractEvent::ParameterChanged(ProtocolParameter::MinimumTakerProtocolFee(fee)))
    }

    pub fn change_protocol_fee_recipient(
        &mut self,
        caller: Address,
        recipient: Address,
    ) -> Result<ContractEvent, ExchangeError> {
        self.require_owner(caller)?;
        if recipient.is_zero() {
            return Err(ExchangeError::MalformedInput(
                "protocol fee recipient is the zero address".to_string(),
            ));
        }
        self.config.protocol_fee_recipient = recipient;
        Ok(ContractEvent::ParameterChanged(ProtocolParameter::ProtocolFeeRecipient(recipient)))
    }

    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<ContractEvent, ExchangeError> {
        self.owner
            .transfer_ownership(caller, new_owner)
            .ok_or(ExchangeError::Unauthorized { caller })
    }
}

/// The maker order's taker fees must not exceed what the taker agreed to.
fn check_fee_consent(buy: &Order, sell: &Order) -> Result<(), MatchFailure> {
    let (maker_order, taker_order) = if sell.fee_recipient.is_zero() {
        (buy, sell)
    } else {
        (sell, buy)
    };
    if maker_order.taker_relayer_fee > taker_order.taker_relayer_fee {
        return Err(MatchFailure::FeeNotAccepted("taker relayer fee"));
    }
    if sell.fee_method == FeeMethod::SplitFee
        && maker_order.taker_protocol_fee > taker_order.taker_protocol_fee
    {
        return Err(MatchFailure::FeeNotAccepted("taker protocol fee"));
    }
    Ok(())
}

/// Apply each side's replacement pattern and require identical calldata.
fn merge_calldata(buy: &Order, sell: &Order) -> Result<Vec<u8>, MatchFailure> {
    let mut buy_calldata = buy.calldata.clone();
    let mut sell_calldata = sell.calldata.clone();
    if !buy.replacement_pattern.is_empty() {
        abi::guarded_array_replace(&mut buy_calldata, &sell.calldata, &buy.replacement_pattern)
            .map_err(MatchFailure::Replacement)?;
    }
    if !sell.replacement_pattern.is_empty() {
        abi::guarded_array_replace(&mut sell_calldata, &buy.calldata, &sell.replacement_pattern)
            .map_err(MatchFailure::Replacement)?;
    }
    if buy_calldata != sell_calldata {
        return Err(MatchFailure::CalldataMismatch);
    }
    Ok(sell_calldata)
}
