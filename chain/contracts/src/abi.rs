//! Calldata codec
//!
//! Calldata is a 4-byte selector followed by 32-byte argument words. Static
//! arguments occupy one head word each; dynamic arguments (`bytes` and
//! arrays of static words) store an offset in the head and their length and
//! contents in the tail. Offsets are relative to the first argument word.
//!
//! The fixed word layout is what makes byte-level replacement patterns
//! meaningful: argument `i` always lives at bytes `4 + 32*i .. 4 + 32*(i+1)`.

use sha2::{Digest, Sha256};
use types::ids::{Address, H256};

use crate::errors::AbiError;

pub const WORD: usize = 32;
pub const SELECTOR_LEN: usize = 4;

/// Leading four bytes of calldata identifying the function.
pub type Selector = [u8; 4];

/// Selector for a function signature such as `transferFrom(address,address,uint256)`.
pub fn selector(signature: &str) -> Selector {
    let digest: [u8; 32] = Sha256::digest(signature.as_bytes()).into();
    [digest[0], digest[1], digest[2], digest[3]]
}

/// A decoded or to-be-encoded argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    FixedBytes(H256),
    Bytes(Vec<u8>),
    Addresses(Vec<Address>),
    Uints(Vec<u128>),
    Words(Vec<H256>),
}

/// Expected argument layout for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    Bool,
    FixedBytes,
    Bytes,
    Addresses,
    Uints,
    Words,
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            Token::Bytes(_) | Token::Addresses(_) | Token::Uints(_) | Token::Words(_)
        )
    }
}

pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn head_word(token: &Token) -> [u8; 32] {
    match token {
        Token::Address(a) => a.to_word(),
        Token::Uint(v) => uint_word(*v),
        Token::Bool(b) => uint_word(u128::from(*b)),
        Token::FixedBytes(h) => *h.as_bytes(),
        // dynamic tokens are written through `encode_tail`
        _ => [0u8; 32],
    }
}

fn encode_tail(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Bytes(bytes) => {
            out.extend_from_slice(&uint_word(bytes.len() as u128));
            out.extend_from_slice(bytes);
            let pad = (WORD - bytes.len() % WORD) % WORD;
            out.extend(std::iter::repeat(0u8).take(pad));
        }
        Token::Addresses(items) => {
            out.extend_from_slice(&uint_word(items.len() as u128));
            for a in items {
                out.extend_from_slice(&a.to_word());
            }
        }
        Token::Uints(items) => {
            out.extend_from_slice(&uint_word(items.len() as u128));
            for v in items {
                out.extend_from_slice(&uint_word(*v));
            }
        }
        Token::Words(items) => {
            out.extend_from_slice(&uint_word(items.len() as u128));
            for h in items {
                out.extend_from_slice(h.as_bytes());
            }
        }
        _ => {}
    }
}

/// Encode arguments (no selector).
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            encode_tail(token, &mut tail);
        } else {
            head.extend_from_slice(&head_word(token));
        }
    }
    head.extend_from_slice(&tail);
    head
}

/// Encode a full call: selector followed by arguments.
pub fn encode_call(selector: Selector, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector.to_vec();
    out.extend_from_slice(&encode(tokens));
    out
}

/// Split calldata into its selector and argument bytes.
pub fn split_selector(calldata: &[u8]) -> Result<(Selector, &[u8]), AbiError> {
    if calldata.len() < SELECTOR_LEN {
        return Err(AbiError::TooShort {
            needed: SELECTOR_LEN,
            available: calldata.len(),
        });
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&calldata[..SELECTOR_LEN]);
    Ok((sel, &calldata[SELECTOR_LEN..]))
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let end = offset
        .checked_add(WORD)
        .ok_or(AbiError::OffsetOutOfBounds { offset })?;
    let slice = data.get(offset..end).ok_or(AbiError::TooShort {
        needed: end,
        available: data.len(),
    })?;
    let mut word = [0u8; 32];
    word.copy_from_slice(slice);
    Ok(word)
}

fn word_to_u128(word: &[u8; 32]) -> Result<u128, AbiError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(AbiError::ValueTooLarge);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn word_to_usize(word: &[u8; 32]) -> Result<usize, AbiError> {
    usize::try_from(word_to_u128(word)?).map_err(|_| AbiError::ValueTooLarge)
}

/// Locate a dynamic argument: returns (start of contents, element count).
fn dynamic_header(data: &[u8], head_word: &[u8; 32]) -> Result<(usize, usize), AbiError> {
    let offset = word_to_usize(head_word)?;
    if offset >= data.len() {
        return Err(AbiError::OffsetOutOfBounds { offset });
    }
    let len = word_to_usize(&read_word(data, offset)?)?;
    Ok((offset + WORD, len))
}

fn read_words(data: &[u8], start: usize, count: usize) -> Result<Vec<[u8; 32]>, AbiError> {
    // Bound the count by the data actually present before allocating
    if count > data.len() / WORD {
        return Err(AbiError::OffsetOutOfBounds { offset: start });
    }
    (0..count).map(|i| read_word(data, start + i * WORD)).collect()
}

/// Decode arguments (no selector) against an expected layout.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let mut out = Vec::with_capacity(types.len());
    for (i, ty) in types.iter().enumerate() {
        let word = read_word(data, i * WORD)?;
        let token = match ty {
            ParamType::Address => {
                Token::Address(Address::from_word(&word).ok_or(AbiError::InvalidAddress)?)
            }
            ParamType::Uint => Token::Uint(word_to_u128(&word)?),
            ParamType::Bool => match word_to_u128(&word)? {
                0 => Token::Bool(false),
                1 => Token::Bool(true),
                _ => return Err(AbiError::InvalidBool),
            },
            ParamType::FixedBytes => Token::FixedBytes(H256::new(word)),
            ParamType::Bytes => {
                let (start, len) = dynamic_header(data, &word)?;
                let end = start
                    .checked_add(len)
                    .ok_or(AbiError::OffsetOutOfBounds { offset: start })?;
                let bytes = data.get(start..end).ok_or(AbiError::TooShort {
                    needed: end,
                    available: data.len(),
                })?;
                Token::Bytes(bytes.to_vec())
            }
            ParamType::Addresses => {
                let (start, len) = dynamic_header(data, &word)?;
                let items = read_words(data, start, len)?
                    .iter()
                    .map(|w| Address::from_word(w).ok_or(AbiError::InvalidAddress))
                    .collect::<Result<Vec<_>, _>>()?;
                Token::Addresses(items)
            }
            ParamType::Uints => {
                let (start, len) = dynamic_header(data, &word)?;
                let items = read_words(data, start, len)?
                    .iter()
                    .map(word_to_u128)
                    .collect::<Result<Vec<_>, _>>()?;
                Token::Uints(items)
            }
            ParamType::Words => {
                let (start, len) = dynamic_header(data, &word)?;
                let items = read_words(data, start, len)?
                    .into_iter()
                    .map(H256::new)
                    .collect();
                Token::Words(items)
            }
        };
        out.push(token);
    }
    Ok(out)
}

/// Overwrite bits of `array` with bits of `desired` wherever `mask` is set.
///
/// All three slices must have the same length.
pub fn guarded_array_replace(
    array: &mut [u8],
    desired: &[u8],
    mask: &[u8],
) -> Result<(), AbiError> {
    if array.len() != desired.len() || array.len() != mask.len() {
        return Err(AbiError::LengthMismatch {
            array: array.len(),
            desired: desired.len(),
            mask: mask.len(),
        });
    }
    for ((byte, want), m) in array.iter_mut().zip(desired).zip(mask) {
        *byte = (*byte & !m) | (want & m);
    }
    Ok(())
}

/// Replacement mask for `calldata_len` bytes that frees the given argument words.
pub fn replacement_mask(calldata_len: usize, argument_indexes: &[usize]) -> Vec<u8> {
    let mut mask = vec![0u8; calldata_len];
    for &i in argument_indexes {
        let start = SELECTOR_LEN + i * WORD;
        let end = (start + WORD).min(calldata_len);
        if start < end {
            mask[start..end].fill(0xff);
        }
    }
    mask
}
