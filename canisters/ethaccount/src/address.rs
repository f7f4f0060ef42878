//! 20-byte foreign addresses. The destination field of a transaction
//! may be absent (contract creation); that state is `Option` at the
//! field, not a sentinel value here.

use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, BridgeResult};
use crate::keccak::keccak256;
use crate::rlp::RlpValue;

pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthAddress([u8; ADDRESS_LEN]);

impl EthAddress {
    pub fn from_bytes(bytes: &[u8]) -> BridgeResult<Self> {
        let array: [u8; ADDRESS_LEN] =
            bytes
                .try_into()
                .map_err(|_| BridgeError::InvalidAddressLength {
                    expected: ADDRESS_LEN,
                    actual: bytes.len(),
                })?;
        Ok(EthAddress(array))
    }

    /// Empty byte string means no destination.
    pub fn from_rlp(value: &RlpValue) -> BridgeResult<Option<Self>> {
        let bytes = value.as_bytes()?;
        if bytes.is_empty() {
            Ok(None)
        } else {
            Self::from_bytes(bytes).map(Some)
        }
    }

    /// Low 20 bytes of the Keccak-256 of the uncompressed (x, y) key.
    pub fn from_uncompressed_key(key: &[u8; 64]) -> Self {
        let digest = keccak256(key);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[12..]);
        EthAddress(out)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl FromStr for EthAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(BridgeError::InvalidAddressLength {
                expected: ADDRESS_LEN * 2,
                actual: digits.len(),
            });
        }
        let bytes = hex::decode(digits).map_err(|_| BridgeError::HexDecodeFailed {
            value: trimmed.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
