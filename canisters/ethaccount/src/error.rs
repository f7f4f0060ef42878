//! Unified error taxonomy. Every failure aborts the current call; the
//! endpoint boundary renders the variant with `to_string`.

use candid::CandidType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[derive(Clone, Debug, PartialEq, Eq, CandidType, Deserialize, Serialize, Error)]
pub enum BridgeError {
    #[error("malformed length-prefix encoding")]
    MalformedEncoding,
    #[error("invalid transaction")]
    InvalidTransaction,
    #[error("invalid scalar size: at most {max} bytes, got {actual}")]
    InvalidSize { max: usize, actual: usize },
    #[error("invalid signature {field} length: expected {expected}, got {actual}")]
    InvalidSignatureLength {
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("signature v byte {v} does not encode chain id {chain_id}")]
    WrongChainId { chain_id: u64, v: u8 },
    #[error("public key recovery failed")]
    RecoveryFailed,
    #[error("amount exceeds representable range")]
    AmountOverflow,
    #[error("not a transfer")]
    NotATransfer,
    #[error("invalid method id")]
    InvalidMethodId,
    #[error("sender not found")]
    AccountNotFound,
    #[error("invalid nonce: expected {expected}, got {actual}")]
    NonceMismatch { expected: u64, actual: String },
    #[error("unable to authorize actor {actor}")]
    UnauthorizedActor { actor: String },
    #[error("offered fee {offered} exceeds transaction maximum {max}")]
    FeeExceedsMax { max: String, offered: String },
    #[error("asset not registered")]
    AssetNotRegistered,
    #[error("asset not active")]
    AssetNotActive,
    #[error("first deposit must use the native asset")]
    DepositTokenNotNative,
    #[error("amount must be positive")]
    AmountNotPositive,
    #[error("invalid address length: expected {expected}, got {actual}")]
    InvalidAddressLength { expected: usize, actual: usize },
    #[error("failed to decode hex: {value}")]
    HexDecodeFailed { value: String },
    #[error("invalid account name: {value}")]
    InvalidName { value: String },
    #[error("configuration missing: {field}")]
    ConfigurationMissing { field: String },
    #[error("not authorized")]
    NotAuthorized,
    #[error("service paused")]
    Paused,
}
