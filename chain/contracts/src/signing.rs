//! Signing Module: order hashing, signing and verification
//!
//! Provides the deterministic order encoding, SHA-256 hashing, and Ed25519
//! signatures. A signature is 96 bytes: the signer's public key followed by
//! the 64-byte signature. The signer's address is the last 20 bytes of
//! SHA-256(public key), so a signature is checked against the order's
//! maker without any key registry.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::{Address, H256};
use types::order::Order;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Order encoding version (frozen).
pub const ORDER_ENCODING_VERSION: u8 = 1;

/// Prefix for digests a maker signs to authorize an order.
const ORDER_SIGNING_PREFIX: &[u8] = b"\x19Exchange Signed Order:\n";

/// Prefix for digests a maker signs to cancel an order.
const CANCEL_SIGNING_PREFIX: &[u8] = b"\x19Exchange Cancel Order:\n";

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = PUBLIC_KEY_LEN + 64;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

fn put_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Hash of every order field in a fixed order.
///
/// Fixed-width fields are written big-endian, byte fields carry a length
/// prefix so adjacent fields cannot be shifted into each other.
pub fn hash_order(order: &Order) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update([ORDER_ENCODING_VERSION]);
    hasher.update(order.exchange.as_bytes());
    hasher.update(order.maker.as_bytes());
    hasher.update(order.taker.as_bytes());
    for fee in [
        order.maker_relayer_fee,
        order.taker_relayer_fee,
        order.maker_protocol_fee,
        order.taker_protocol_fee,
    ] {
        hasher.update(fee.to_u128().to_be_bytes());
    }
    hasher.update(order.fee_recipient.as_bytes());
    hasher.update([
        order.fee_method.as_u8(),
        order.side.as_u8(),
        order.sale_kind.as_u8(),
    ]);
    hasher.update(order.target.as_bytes());
    hasher.update([order.how_to_call.as_u8()]);
    put_bytes(&mut hasher, &order.calldata);
    put_bytes(&mut hasher, &order.replacement_pattern);
    hasher.update(order.static_target.as_bytes());
    put_bytes(&mut hasher, &order.static_extradata);
    hasher.update(order.payment_token.as_bytes());
    hasher.update(order.base_price.to_u128().to_be_bytes());
    hasher.update(order.extra.to_u128().to_be_bytes());
    hasher.update(order.listing_time.to_be_bytes());
    hasher.update(order.expiration_time.to_be_bytes());
    hasher.update(order.salt.to_be_bytes());
    H256::new(hasher.finalize().into())
}

fn prefixed(prefix: &[u8], hash: &H256, exchange: &Address) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    hasher.update(exchange.as_bytes());
    hasher.update(hash.as_bytes());
    H256::new(hasher.finalize().into())
}

/// Digest a maker signs to authorize the order with `hash` on `exchange`.
pub fn hash_to_sign(hash: &H256, exchange: &Address) -> H256 {
    prefixed(ORDER_SIGNING_PREFIX, hash, exchange)
}

/// Digest a maker signs to cancel the order with `hash` on `exchange`.
pub fn hash_to_cancel(hash: &H256, exchange: &Address) -> H256 {
    prefixed(CANCEL_SIGNING_PREFIX, hash, exchange)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Raw signature bytes: public key (32) followed by the Ed25519 signature (64).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSignature(#[serde(with = "hex::serde")] Vec<u8>);

impl OrderSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Placeholder for orders authorized by approval or by the caller.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Address controlled by an Ed25519 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let digest: [u8; 32] = Sha256::digest(key.as_bytes()).into();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address::new(out)
}

/// Recover the address that produced `signature` over `digest`.
///
/// Returns `None` for a wrong length, an invalid key or a failed check.
pub fn recover_signer(digest: &H256, signature: &OrderSignature) -> Option<Address> {
    let bytes = signature.as_bytes();
    if bytes.len() != SIGNATURE_LEN {
        return None;
    }
    let key_bytes: [u8; PUBLIC_KEY_LEN] = bytes[..PUBLIC_KEY_LEN].try_into().ok()?;
    let sig_bytes: [u8; 64] = bytes[PUBLIC_KEY_LEN..].try_into().ok()?;
    let key = VerifyingKey::from_bytes(&key_bytes).ok()?;
    let sig = Signature::from_bytes(&sig_bytes);
    key.verify_strict(digest.as_bytes(), &sig).ok()?;
    Some(address_of(&key))
}

/// Whether `signature` is `signer`'s signature over `digest`.
pub fn validate_signature(digest: &H256, signer: &Address, signature: &OrderSignature) -> bool {
    recover_signer(digest, signature).is_some_and(|addr| addr == *signer)
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Client-side order signer.
#[derive(Debug, Clone)]
pub struct OrderSigner {
    key: SigningKey,
}

impl OrderSigner {
    /// Deterministic signer from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn address(&self) -> Address {
        address_of(&self.key.verifying_key())
    }

    pub fn sign_hash(&self, digest: &H256) -> OrderSignature {
        let sig = self.key.sign(digest.as_bytes());
        let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
        bytes.extend_from_slice(self.key.verifying_key().as_bytes());
        bytes.extend_from_slice(&sig.to_bytes());
        OrderSignature(bytes)
    }

    /// Sign the order for the exchange it names.
    pub fn sign_order(&self, order: &Order) -> OrderSignature {
        self.sign_hash(&hash_to_sign(&hash_order(order), &order.exchange))
    }

    /// Sign a cancellation of the order.
    pub fn sign_cancellation(&self, order: &Order) -> OrderSignature {
        self.sign_hash(&hash_to_cancel(&hash_order(order), &order.exchange))
    }
}
