//! Typed calls understood by the deployed contracts
//!
//! Builders produce calldata for token contracts, the Merkle validator and
//! the atomicizer; decoders turn calldata back into typed calls for
//! execution. ERC20 and ERC721 share `transferFrom` and `approve`
//! signatures, so token calls are interpreted by the callee's token kind.

use types::ids::{Address, H256};

use crate::abi::{self, ParamType, Selector, Token};
use crate::errors::AbiError;

/// Function signatures
pub mod sig {
    pub const TRANSFER: &str = "transfer(address,uint256)";
    pub const TRANSFER_FROM: &str = "transferFrom(address,address,uint256)";
    pub const APPROVE: &str = "approve(address,uint256)";
    pub const SAFE_TRANSFER_FROM: &str = "safeTransferFrom(address,address,uint256)";
    pub const SET_APPROVAL_FOR_ALL: &str = "setApprovalForAll(address,bool)";
    pub const MULTI_SAFE_TRANSFER_FROM: &str =
        "safeTransferFrom(address,address,uint256,uint256,bytes)";

    pub const MATCH_ERC721: &str =
        "matchERC721UsingCriteria(address,address,address,uint256,bytes32,bytes32[])";
    pub const MATCH_ERC721_SAFE: &str = concat!(
        "matchERC721WithSafeTransferUsingCriteria",
        "(address,address,address,uint256,bytes32,bytes32[])"
    );
    pub const MATCH_ERC1155: &str =
        "matchERC1155UsingCriteria(address,address,address,uint256,uint256,bytes32,bytes32[])";
    pub const MATCH_ERC20: &str =
        "matchERC20UsingCriteria(address,address,address,uint256,bytes32,bytes32[])";

    pub const ATOMICIZE: &str = "atomicize(address[],uint256[],uint256[],bytes)";
}

/// Call addressed to a token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCall {
    Transfer {
        to: Address,
        amount: u128,
    },
    /// Amount for fungible tokens, token id for non-fungible ones
    TransferFrom {
        from: Address,
        to: Address,
        value: u128,
    },
    /// Allowance for fungible tokens, token id for non-fungible ones
    Approve {
        spender: Address,
        value: u128,
    },
    SafeTransferFrom {
        from: Address,
        to: Address,
        token_id: u128,
    },
    SetApprovalForAll {
        operator: Address,
        approved: bool,
    },
    MultiSafeTransferFrom {
        from: Address,
        to: Address,
        token_id: u128,
        amount: u128,
        data: Vec<u8>,
    },
}

/// Which transfer a criteria match issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaKind {
    Erc721,
    Erc721Safe,
    Erc1155,
    Erc20,
}

impl CriteriaKind {
    /// Selector of the token call issued after the proof verifies.
    pub fn transfer_selector(&self) -> Selector {
        match self {
            CriteriaKind::Erc721 | CriteriaKind::Erc20 => abi::selector(sig::TRANSFER_FROM),
            CriteriaKind::Erc721Safe => abi::selector(sig::SAFE_TRANSFER_FROM),
            CriteriaKind::Erc1155 => abi::selector(sig::MULTI_SAFE_TRANSFER_FROM),
        }
    }
}

/// Criteria-gated transfer run by the Merkle validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaMatch {
    pub kind: CriteriaKind,
    pub from: Address,
    pub to: Address,
    pub token: Address,
    /// Token id for NFTs, amount for ERC20
    pub id_or_amount: u128,
    /// ERC1155 only
    pub amount: u128,
    pub root: H256,
    pub proof: Vec<H256>,
}

impl CriteriaMatch {
    /// Value committed in the whitelist leaf.
    pub fn criteria_value(&self) -> u128 {
        self.id_or_amount
    }

    /// Token call the validator issues once the proof verifies.
    pub fn to_token_call(&self) -> TokenCall {
        match self.kind {
            CriteriaKind::Erc721 | CriteriaKind::Erc20 => TokenCall::TransferFrom {
                from: self.from,
                to: self.to,
                value: self.id_or_amount,
            },
            CriteriaKind::Erc721Safe => TokenCall::SafeTransferFrom {
                from: self.from,
                to: self.to,
                token_id: self.id_or_amount,
            },
            CriteriaKind::Erc1155 => TokenCall::MultiSafeTransferFrom {
                from: self.from,
                to: self.to,
                token_id: self.id_or_amount,
                amount: self.amount,
                data: Vec::new(),
            },
        }
    }
}

/// Call addressed to a library contract (executed by delegate call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryCall {
    Criteria(CriteriaMatch),
    Atomicize {
        targets: Vec<Address>,
        values: Vec<u128>,
        calldata_lengths: Vec<u128>,
        calldata: Vec<u8>,
    },
}

// ───────────────────────── Builders ─────────────────────────

pub fn erc20_transfer(to: Address, amount: u128) -> Vec<u8> {
    abi::encode_call(abi::selector(sig::TRANSFER), &[Token::Address(to), Token::Uint(amount)])
}

pub fn transfer_from(from: Address, to: Address, value: u128) -> Vec<u8> {
    abi::encode_call(
        abi::selector(sig::TRANSFER_FROM),
        &[Token::Address(from), Token::Address(to), Token::Uint(value)],
    )
}

pub fn approve(spender: Address, value: u128) -> Vec<u8> {
    abi::encode_call(abi::selector(sig::APPROVE), &[Token::Address(spender), Token::Uint(value)])
}

pub fn safe_transfer_from(from: Address, to: Address, token_id: u128) -> Vec<u8> {
    abi::encode_call(
        abi::selector(sig::SAFE_TRANSFER_FROM),
        &[Token::Address(from), Token::Address(to), Token::Uint(token_id)],
    )
}

pub fn set_approval_for_all(operator: Address, approved: bool) -> Vec<u8> {
    abi::encode_call(
        abi::selector(sig::SET_APPROVAL_FOR_ALL),
        &[Token::Address(operator), Token::Bool(approved)],
    )
}

pub fn multi_safe_transfer_from(
    from: Address,
    to: Address,
    token_id: u128,
    amount: u128,
    data: Vec<u8>,
) -> Vec<u8> {
    abi::encode_call(
        abi::selector(sig::MULTI_SAFE_TRANSFER_FROM),
        &[
            Token::Address(from),
            Token::Address(to),
            Token::Uint(token_id),
            Token::Uint(amount),
            Token::Bytes(data),
        ],
    )
}

/// Calldata for a criteria match on the Merkle validator.
pub fn criteria_match(call: &CriteriaMatch) -> Vec<u8> {
    let mut tokens = vec![
        Token::Address(call.from),
        Token::Address(call.to),
        Token::Address(call.token),
        Token::Uint(call.id_or_amount),
    ];
    if call.kind == CriteriaKind::Erc1155 {
        tokens.push(Token::Uint(call.amount));
    }
    tokens.push(Token::FixedBytes(call.root));
    tokens.push(Token::Words(call.proof.clone()));
    let signature = match call.kind {
        CriteriaKind::Erc721 => sig::MATCH_ERC721,
        CriteriaKind::Erc721Safe => sig::MATCH_ERC721_SAFE,
        CriteriaKind::Erc1155 => sig::MATCH_ERC1155,
        CriteriaKind::Erc20 => sig::MATCH_ERC20,
    };
    abi::encode_call(abi::selector(signature), &tokens)
}

/// Calldata bundling `calls` for the atomicizer.
pub fn atomicize(calls: &[(Address, Vec<u8>)]) -> Vec<u8> {
    let targets = calls.iter().map(|(t, _)| *t).collect();
    let values = vec![0u128; calls.len()];
    let lengths = calls.iter().map(|(_, data)| data.len() as u128).collect();
    let calldata = calls.iter().flat_map(|(_, data)| data.iter().copied()).collect();
    abi::encode_call(
        abi::selector(sig::ATOMICIZE),
        &[
            Token::Addresses(targets),
            Token::Uints(values),
            Token::Uints(lengths),
            Token::Bytes(calldata),
        ],
    )
}

// ───────────────────────── Decoders ─────────────────────────

fn unknown(selector: Selector) -> AbiError {
    AbiError::UnknownSelector(hex::encode(selector))
}

pub fn decode_token_call(calldata: &[u8]) -> Result<TokenCall, AbiError> {
    use ParamType::{Address as A, Bool as B, Bytes as Y, Uint as U};

    let (selector, args) = abi::split_selector(calldata)?;
    let call = if selector == abi::selector(sig::TRANSFER) {
        match abi::decode(&[A, U], args)?.as_slice() {
            [Token::Address(to), Token::Uint(amount)] => TokenCall::Transfer {
                to: *to,
                amount: *amount,
            },
            _ => return Err(AbiError::UnexpectedTokens),
        }
    } else if selector == abi::selector(sig::TRANSFER_FROM) {
        match abi::decode(&[A, A, U], args)?.as_slice() {
            [Token::Address(from), Token::Address(to), Token::Uint(value)] => {
                TokenCall::TransferFrom {
                    from: *from,
                    to: *to,
                    value: *value,
                }
            }
            _ => return Err(AbiError::UnexpectedTokens),
        }
    } else if selector == abi::selector(sig::APPROVE) {
        match abi::decode(&[A, U], args)?.as_slice() {
            [Token::Address(spender), Token::Uint(value)] => TokenCall::Approve {
                spender: *spender,
                value: *value,
            },
            _ => return Err(AbiError::UnexpectedTokens),
        }
    } else if selector == abi::selector(sig::SAFE_TRANSFER_FROM) {
        match abi::decode(&[A, A, U], args)?.as_slice() {
            [Token::Address(from), Token::Address(to), Token::Uint(token_id)] => {
                TokenCall::SafeTransferFrom {
                    from: *from,
                    to: *to,
                    token_id: *token_id,
                }
            }
            _ => return Err(AbiError::UnexpectedTokens),
        }
    } else if selector == abi::selector(sig::SET_APPROVAL_FOR_ALL) {
        match abi::decode(&[A, B], args)?.as_slice() {
            [Token::Address(operator), Token::Bool(approved)] => TokenCall::SetApprovalForAll {
                operator: *operator,
                approved: *approved,
            },
            _ => return Err(AbiError::UnexpectedTokens),
        }
    } else if selector == abi::selector(sig::MULTI_SAFE_TRANSFER_FROM) {
        match abi::decode(&[A, A, U, U, Y], args)?.as_slice() {
            [
                Token::Address(from),
                Token::Address(to),
                Token::Uint(token_id),
                Token::Uint(amount),
                Token::Bytes(data),
            ] => {
                TokenCall::MultiSafeTransferFrom {
                    from: *from,
                    to: *to,
                    token_id: *token_id,
                    amount: *amount,
                    data: data.clone(),
                }
            }
            _ => return Err(AbiError::UnexpectedTokens),
        }
    } else {
        return Err(unknown(selector));
    };
    Ok(call)
}

fn decode_criteria(kind: CriteriaKind, args: &[u8]) -> Result<CriteriaMatch, AbiError> {
    use ParamType::{Address as A, FixedBytes as F, Uint as U, Words as W};

    let types: &[ParamType] = if kind == CriteriaKind::Erc1155 {
        &[A, A, A, U, U, F, W]
    } else {
        &[A, A, A, U, F, W]
    };
    let tokens = abi::decode(types, args)?;
    let (head, amount, tail) = match tokens.as_slice() {
        [a, b, c, d, Token::Uint(amount), e, f] => ([a, b, c, d], *amount, [e, f]),
        [a, b, c, d, e, f] => ([a, b, c, d], 0, [e, f]),
        _ => return Err(AbiError::UnexpectedTokens),
    };
    match (head, tail) {
        (
            [Token::Address(from), Token::Address(to), Token::Address(token), Token::Uint(id)],
            [Token::FixedBytes(root), Token::Words(proof)],
        ) => Ok(CriteriaMatch {
            kind,
            from: *from,
            to: *to,
            token: *token,
            id_or_amount: *id,
            amount,
            root: *root,
            proof: proof.clone(),
        }),
        _ => Err(AbiError::UnexpectedTokens),
    }
}

pub fn decode_library_call(calldata: &[u8]) -> Result<LibraryCall, AbiError> {
    let (selector, args) = abi::split_selector(calldata)?;
    let criteria = [
        (sig::MATCH_ERC721, CriteriaKind::Erc721),
        (sig::MATCH_ERC721_SAFE, CriteriaKind::Erc721Safe),
        (sig::MATCH_ERC1155, CriteriaKind::Erc1155),
        (sig::MATCH_ERC20, CriteriaKind::Erc20),
    ];
    if let Some((_, kind)) = criteria
        .iter()
        .find(|(signature, _)| abi::selector(signature) == selector)
    {
        return decode_criteria(*kind, args).map(LibraryCall::Criteria);
    }
    if selector == abi::selector(sig::ATOMICIZE) {
        use ParamType::{Addresses, Bytes, Uints};
        return match abi::decode(&[Addresses, Uints, Uints, Bytes], args)?.as_slice() {
            [
                Token::Addresses(targets),
                Token::Uints(values),
                Token::Uints(lengths),
                Token::Bytes(data),
            ] => {
                Ok(LibraryCall::Atomicize {
                    targets: targets.clone(),
                    values: values.clone(),
                    calldata_lengths: lengths.clone(),
                    calldata: data.clone(),
                })
            }
            _ => Err(AbiError::UnexpectedTokens),
        };
    }
    Err(unknown(selector))
}
