//! Shared fixtures for integration tests
#![allow(dead_code)]

use contracts::calls;
use contracts::config::ChainConfig;
use contracts::errors::ExchangeError;
use contracts::exchange::MatchReceipt;
use contracts::ledger::TokenKind;
use contracts::registry::ProxyId;
use contracts::signing::{OrderSignature, OrderSigner};
use contracts::Chain;
use types::ids::{Address, H256};
use types::numeric::Amount;
use types::order::{Order, Side};

pub const START: i64 = 1_000;
pub const BUYER_FUNDS: u64 = 10_000;
pub const SELLER_FUNDS: u64 = 1_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A deployed chain with one seller holding NFT #1 and one funded buyer.
///
/// Both users have proxies, approved the transfer proxy for the payment
/// token, and the seller approved their proxy for the NFT collection.
pub struct Market {
    pub chain: Chain,
    pub owner: Address,
    pub relayer: Address,
    pub seller: OrderSigner,
    pub buyer: OrderSigner,
    pub usdt: Address,
    pub nft: Address,
    pub seller_proxy: ProxyId,
    pub buyer_proxy: ProxyId,
}

impl Market {
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        init_tracing();
        let owner = Address::derive("user", b"owner");
        let relayer = Address::derive("user", b"relayer");
        let mut chain = Chain::new(config, owner, START).unwrap();
        let seller = OrderSigner::from_seed([1u8; 32]);
        let buyer = OrderSigner::from_seed([2u8; 32]);
        let usdt = Address::derive("contract", b"usdt");
        let nft = Address::derive("contract", b"nft");
        chain.deploy_token(usdt, TokenKind::Fungible, "USDT").unwrap();
        chain.deploy_token(nft, TokenKind::NonFungible, "Kitties").unwrap();

        let seller_proxy = chain.register_proxy(seller.address()).unwrap();
        let buyer_proxy = chain.register_proxy(buyer.address()).unwrap();

        let ttp = chain.deployment().transfer_proxy;
        chain.mint(usdt, buyer.address(), Amount::new(BUYER_FUNDS)).unwrap();
        chain.mint(usdt, seller.address(), Amount::new(SELLER_FUNDS)).unwrap();
        chain
            .token_call(buyer.address(), usdt, &calls::approve(ttp, u128::from(u64::MAX)))
            .unwrap();
        chain
            .token_call(seller.address(), usdt, &calls::approve(ttp, u128::from(u64::MAX)))
            .unwrap();
        chain.mint_nft(nft, seller.address(), 1).unwrap();
        chain
            .token_call(seller.address(), nft, &calls::set_approval_for_all(seller_proxy, true))
            .unwrap();

        Self {
            chain,
            owner,
            relayer,
            seller,
            buyer,
            usdt,
            nft,
            seller_proxy,
            buyer_proxy,
        }
    }

    pub fn exchange(&self) -> Address {
        self.chain.deployment().exchange
    }

    /// Fixed-price sell of `token_id`; the buyer's address is left open.
    pub fn sell_nft(&self, token_id: u128, price: u64) -> Order {
        let calldata = calls::transfer_from(self.seller.address(), Address::ZERO, token_id);
        let replacement_pattern = contracts::abi::replacement_mask(calldata.len(), &[1]);
        Order {
            exchange: self.exchange(),
            maker: self.seller.address(),
            fee_recipient: self.relayer,
            side: Side::Sell,
            target: self.nft,
            calldata,
            replacement_pattern,
            payment_token: self.usdt,
            base_price: Amount::new(price),
            listing_time: START,
            salt: token_id,
            ..Default::default()
        }
    }

    /// Counter-order taking `sell_nft(token_id, _)` at `price`.
    pub fn buy_nft(&self, token_id: u128, price: u64) -> Order {
        Order {
            exchange: self.exchange(),
            maker: self.buyer.address(),
            side: Side::Buy,
            target: self.nft,
            calldata: calls::transfer_from(self.seller.address(), self.buyer.address(), token_id),
            payment_token: self.usdt,
            base_price: Amount::new(price),
            listing_time: START,
            salt: 1_000 + token_id,
            ..Default::default()
        }
    }

    /// Submit both orders with fresh signatures, as the relayer.
    pub fn match_orders(
        &mut self,
        buy: &Order,
        sell: &Order,
    ) -> Result<MatchReceipt, ExchangeError> {
        let buy_sig = self.buyer.sign_order(buy);
        let sell_sig = self.seller.sign_order(sell);
        let relayer = self.relayer;
        self.chain
            .atomic_match(relayer, buy, &buy_sig, sell, &sell_sig, H256::ZERO)
    }

    pub fn usdt_of(&self, holder: Address) -> Amount {
        self.chain.balance_of(self.usdt, holder)
    }

    pub fn unsigned() -> OrderSignature {
        OrderSignature::empty()
    }
}
