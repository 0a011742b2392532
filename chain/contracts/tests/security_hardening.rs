//! Security Hardening Tests
//!
//! Adversarial testing:
//! - Permission escalation
//! - Replay of matched and cancelled orders
//! - Incorrect and tampered signatures
//! - Revocation timelock
//! - Validation flips per condition
//! - Fuzz testing (proptest)
//! - Upgrade path (ABI freeze)

mod common;

use common::{Market, START};
use contracts::calls;
use contracts::errors::{CallError, ExchangeError, RegistryError};
use contracts::signing::{OrderSignature, OrderSigner};
use contracts::CONTRACT_ABI_VERSION;
use types::ids::{Address, H256};
use types::numeric::Amount;
use types::order::{HowToCall, Order, SaleKind};

// ═══════════════════════════════════════════════════════════════════
// Permission Tests
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_non_owner_cannot_change_protocol_parameters() {
    let mut m = Market::new();
    let mallory = Address::derive("user", b"mallory");
    assert_eq!(
        m.chain.change_protocol_fee_recipient(mallory, mallory),
        Err(ExchangeError::Unauthorized { caller: mallory })
    );
    assert!(m.chain.change_minimum_maker_protocol_fee(mallory, Amount::ZERO).is_err());
    assert!(m.chain.change_minimum_taker_protocol_fee(mallory, Amount::ZERO).is_err());
    assert!(m.chain.transfer_exchange_ownership(mallory, mallory).is_err());
    assert_eq!(m.chain.exchange().owner(), m.owner);
}

#[test]
fn test_non_owner_cannot_add_default_callers() {
    let mut m = Market::new();
    let mallory = Address::derive("user", b"mallory");
    assert_eq!(
        m.chain.start_grant_authentication(mallory, mallory),
        Err(RegistryError::NotOwner)
    );
    let exchange = m.exchange();
    assert_eq!(m.chain.revoke_authentication(mallory, exchange), Err(RegistryError::NotOwner));
}

#[test]
fn test_stranger_cannot_drive_a_proxy() {
    let mut m = Market::new();
    let mallory = Address::derive("user", b"mallory");
    let calldata = calls::transfer_from(m.seller.address(), mallory, 1);
    let seller_proxy = m.seller_proxy;
    let nft = m.nft;
    let err = m
        .chain
        .proxy_call(mallory, seller_proxy, nft, HowToCall::Call, &calldata)
        .unwrap_err();
    assert!(matches!(err, CallError::Registry(RegistryError::Unauthorized { .. })));
    assert_eq!(m.chain.owner_of(m.nft, 1), Some(m.seller.address()));
}

#[test]
fn test_stranger_cannot_grant_on_foreign_proxy() {
    let mut m = Market::new();
    let mallory = Address::derive("user", b"mallory");
    let seller_proxy = m.seller_proxy;
    let err = m.chain.grant_authority(mallory, seller_proxy, mallory).unwrap_err();
    assert!(matches!(err, RegistryError::NotProxyOwner { .. }));
}

#[test]
fn test_stranger_cannot_pull_funds_through_transfer_proxy() {
    let mut m = Market::new();
    let mallory = Address::derive("user", b"mallory");
    let (usdt, buyer) = (m.usdt, m.buyer.address());
    let err = m
        .chain
        .transfer_tokens(mallory, usdt, buyer, mallory, Amount::new(1))
        .unwrap_err();
    assert!(matches!(err, CallError::Registry(RegistryError::Unauthorized { .. })));
    assert_eq!(m.usdt_of(mallory), Amount::ZERO);
}

#[test]
fn test_stranger_cannot_cancel() {
    let mut m = Market::new();
    let sell = m.sell_nft(1, 100);
    let mallory = OrderSigner::from_seed([9u8; 32]);
    // a cancellation signed by the wrong key
    let err = m
        .chain
        .cancel_order(mallory.address(), &sell, &mallory.sign_cancellation(&sell))
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Unauthorized { .. }));
}

// ═══════════════════════════════════════════════════════════════════
// Replay
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_sell_order_cannot_fill_twice() {
    let mut m = Market::new();
    let sell = m.sell_nft(1, 100);
    let first = m.buy_nft(1, 100);
    m.match_orders(&first, &sell).unwrap();

    // a fresh buy order against the consumed sell
    let second = Order {
        salt: 77,
        ..m.buy_nft(1, 100)
    };
    let err = m.match_orders(&second, &sell).unwrap_err();
    assert_eq!(
        err,
        ExchangeError::AlreadyFinalized {
            hash: m.chain.hash_order(&sell)
        }
    );
}

#[test]
fn test_cancel_is_idempotent() {
    let mut m = Market::new();
    let sell = m.sell_nft(1, 100);
    let seller = m.seller.address();
    m.chain.cancel_order(seller, &sell, &OrderSignature::empty()).unwrap();
    let logs = m.chain.logs().len();
    m.chain.cancel_order(seller, &sell, &OrderSignature::empty()).unwrap();
    assert_eq!(m.chain.logs().len(), logs);
}

#[test]
fn test_signature_bound_to_exchange() {
    let m = Market::new();
    let sell = m.sell_nft(1, 100);
    let foreign = Order {
        exchange: Address::derive("contract", b"other-exchange"),
        ..sell.clone()
    };
    // the signature over the foreign order does not validate here
    assert!(!m.chain.validate_order(&sell, &m.seller.sign_order(&foreign)));
    assert!(matches!(
        m.chain.check_order(&foreign, &m.seller.sign_order(&foreign)),
        Err(ExchangeError::WrongExchange { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════
// Incorrect Signature
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_incorrect_signature_empty() {
    let m = Market::new();
    let sell = m.sell_nft(1, 100);
    assert!(matches!(
        m.chain.check_order(&sell, &OrderSignature::empty()),
        Err(ExchangeError::InvalidSignature { .. })
    ));
}

#[test]
fn test_signature_from_other_key_rejected() {
    let m = Market::new();
    let sell = m.sell_nft(1, 100);
    assert!(!m.chain.validate_order(&sell, &m.buyer.sign_order(&sell)));
}

#[test]
fn test_tampered_order_rejected() {
    let m = Market::new();
    let sell = m.sell_nft(1, 100);
    let sig = m.seller.sign_order(&sell);
    assert!(m.chain.validate_order(&sell, &sig));
    let cheaper = Order {
        base_price: Amount::new(1),
        ..sell
    };
    assert!(!m.chain.validate_order(&cheaper, &sig));
}

#[test]
fn test_truncated_signature_rejected() {
    let m = Market::new();
    let sell = m.sell_nft(1, 100);
    let sig = m.seller.sign_order(&sell);
    let truncated = OrderSignature::new(sig.as_bytes()[..95].to_vec());
    assert!(!m.chain.validate_order(&sell, &truncated));
}

// ═══════════════════════════════════════════════════════════════════
// Validation Flips
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_validate_order_flips_per_condition() {
    let mut m = Market::new();
    let sell = Order {
        expiration_time: START + 100,
        ..m.sell_nft(1, 100)
    };
    let sig = m.seller.sign_order(&sell);
    assert!(m.chain.validate_order(&sell, &sig));

    // exchange identity
    let foreign = Order {
        exchange: Address::derive("contract", b"elsewhere"),
        ..sell.clone()
    };
    assert!(!m.chain.validate_order(&foreign, &m.seller.sign_order(&foreign)));

    // parameter sanity
    let malformed = Order {
        sale_kind: SaleKind::DutchAuction,
        extra: Amount::new(101),
        ..sell.clone()
    };
    assert!(!m.chain.validate_order(&malformed, &m.seller.sign_order(&malformed)));

    // listing window
    let future = Order {
        listing_time: START + 1,
        ..sell.clone()
    };
    assert!(!m.chain.validate_order(&future, &m.seller.sign_order(&future)));

    // signature
    assert!(!m.chain.validate_order(&sell, &OrderSignature::empty()));

    // time passes
    m.chain.set_time(START + 100);
    assert!(!m.chain.validate_order(&sell, &sig));
    m.chain.set_time(START);

    // finalization
    m.chain
        .cancel_order(m.seller.address(), &sell, &OrderSignature::empty())
        .unwrap();
    assert!(!m.chain.validate_order(&sell, &sig));
}

#[test]
fn test_minimum_protocol_fee_enforced() {
    let mut m = Market::new();
    let owner = m.owner;
    m.chain
        .change_minimum_maker_protocol_fee(owner, Amount::new(250))
        .unwrap();
    let sell = m.sell_nft(1, 100);
    assert!(matches!(
        m.chain.check_order(&sell, &m.seller.sign_order(&sell)),
        Err(ExchangeError::MalformedInput(_))
    ));
    let paying = Order {
        maker_protocol_fee: Amount::new(250),
        ..sell
    };
    assert!(m.chain.validate_order(&paying, &m.seller.sign_order(&paying)));
}

// ═══════════════════════════════════════════════════════════════════
// Revocation Timelock
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_revoke_timelock() {
    let mut m = Market::new();
    let exchange = m.exchange();
    let seller = m.seller.address();
    let proxy = m.seller_proxy;
    let delay = m.chain.registry().delay();

    m.chain.start_revoke(seller, proxy, exchange).unwrap();
    assert!(m.chain.is_authorized(proxy, exchange), "grant holds during the delay");

    m.chain.advance_time(delay - 1);
    assert_eq!(
        m.chain.end_revoke(seller, proxy, exchange),
        Err(RegistryError::TooEarly {
            available_at: START + delay
        })
    );

    m.chain.advance_time(1);
    assert!(!m.chain.is_authorized(proxy, exchange));
    m.chain.end_revoke(seller, proxy, exchange).unwrap();
    assert!(m.chain.registry().grant(proxy, exchange).is_none());

    // the proxy survives and the user can grant again
    assert_eq!(m.chain.proxy_of(seller), Some(proxy));
    m.chain.grant_authority(seller, proxy, exchange).unwrap();
    assert!(m.chain.is_authorized(proxy, exchange));
}

// ═══════════════════════════════════════════════════════════════════
// Upgrade Path (ABI Freeze)
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_contract_abi_version_frozen() {
    assert_eq!(CONTRACT_ABI_VERSION, "1.0.0");
}

#[test]
fn test_order_hash_stable_across_calls() {
    let m = Market::new();
    let sell = m.sell_nft(1, 100);
    assert_eq!(m.chain.hash_order(&sell), m.chain.hash_order(&sell.clone()));
    assert_ne!(m.chain.hash_order(&sell), m.chain.hash_to_sign(&sell));
}

// ═══════════════════════════════════════════════════════════════════
// Fuzz Tests (Proptest)
// ═══════════════════════════════════════════════════════════════════

mod fuzz {
    use super::*;
    use contracts::merkle::{hash_leaf, verify_proof, MerkleTree};
    use contracts::security::{Finalization, FinalizedSet};
    use proptest::prelude::*;

    fn dutch_sell(m: &Market, base: u64, extra: u64, duration: i64) -> Order {
        Order {
            sale_kind: SaleKind::DutchAuction,
            base_price: Amount::new(base),
            extra: Amount::new(extra),
            expiration_time: START + duration,
            ..m.sell_nft(1, base)
        }
    }

    proptest! {
        /// Invariant: a Dutch sell's price never increases with time and
        /// stays within [base - extra, base].
        #[test]
        fn fuzz_dutch_price_non_increasing(
            base in 1u64..1_000_000,
            extra_ratio in 0u64..=100,
            duration in 1i64..10_000,
            mut times in prop::collection::vec(-100i64..20_000, 2..10),
        ) {
            let mut m = Market::new();
            let extra = base * extra_ratio / 100;
            let sell = dutch_sell(&m, base, extra, duration);
            times.sort_unstable();
            let mut previous: Option<Amount> = None;
            for t in times {
                m.chain.set_time(START + t);
                let price = m.chain.calculate_current_price(&sell).unwrap();
                prop_assert!(price <= Amount::new(base));
                prop_assert!(price >= Amount::new(base - extra));
                if let Some(p) = previous {
                    prop_assert!(price <= p);
                }
                previous = Some(price);
            }
        }

        /// Invariant: a valid proof verifies; flipping any single bit of
        /// the proof, leaf or root makes it fail.
        #[test]
        fn fuzz_merkle_single_bit_flip(
            n in 2usize..20,
            index_seed in any::<usize>(),
            target in 0usize..3,
            bit in 0usize..256,
        ) {
            let leaves: Vec<H256> = (0..n).map(|i| hash_leaf(&(i as u64).to_be_bytes())).collect();
            let index = index_seed % n;
            let tree = MerkleTree::new(leaves.clone());
            let root = tree.root();
            let proof = tree.proof(index).unwrap();
            let leaf = leaves[index];
            prop_assert!(verify_proof(&proof, &root, &leaf));

            match target {
                0 if !proof.is_empty() => {
                    let mut bad = proof.clone();
                    let i = bit % bad.len();
                    bad[i] = bad[i].with_bit_flipped(bit);
                    prop_assert!(!verify_proof(&bad, &root, &leaf));
                }
                1 => prop_assert!(!verify_proof(&proof, &root, &leaf.with_bit_flipped(bit))),
                _ => prop_assert!(!verify_proof(&proof, &root.with_bit_flipped(bit), &leaf)),
            }
        }

        /// Invariant: at most one transition out of Created per hash.
        #[test]
        fn fuzz_finalize_once(
            ops in prop::collection::vec((0u8..8, 0u8..3), 1..50),
        ) {
            let mut set = FinalizedSet::new();
            let mut seen = std::collections::HashSet::new();
            for (h, how) in ops {
                let hash = H256::new([h; 32]);
                let how = match how {
                    0 => Finalization::Consumed,
                    1 => Finalization::Cancelled,
                    _ => Finalization::Burned,
                };
                let first = seen.insert(h);
                prop_assert_eq!(set.finalize(hash, how), first);
            }
            prop_assert_eq!(set.count(), seen.len());
        }

        /// Invariant: fee shares never exceed the price and round down.
        #[test]
        fn fuzz_split_fee_rounds_down(
            price in 0u64..10_000_000,
            bps in 0u64..=10_000,
        ) {
            let fee = Amount::new(price).bps_floor(Amount::new(bps)).unwrap();
            prop_assert!(fee <= Amount::new(price));
            prop_assert_eq!(fee, Amount::new(((price as u128 * bps as u128) / 10_000) as u64));
        }
    }
}
