//! Fixed-width unsigned scalars over `BigUint` and the native
//! fixed-point amount. All narrowing is overflow-checked; nothing in
//! here touches floating point.

use std::fmt;

use candid::CandidType;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::rlp::RlpValue;

/// Foreign smallest units (wei) per native smallest unit.
pub const WEI_PER_NATIVE_UNIT: u64 = 100_000_000_000_000;

/// Largest representable native amount, in smallest units.
pub const MAX_NATIVE_AMOUNT: i64 = (1 << 62) - 1;

/// Decimal places implied by a native smallest unit.
pub const NATIVE_PRECISION: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256(BigUint);

impl U256 {
    pub fn from_u64(value: u64) -> Self {
        U256(BigUint::from(value))
    }

    /// Big-endian bytes, left-padded; more than 32 bytes is an error.
    pub fn from_be_slice(bytes: &[u8]) -> BridgeResult<Self> {
        if bytes.len() > 32 {
            return Err(BridgeError::InvalidSize {
                max: 32,
                actual: bytes.len(),
            });
        }
        Ok(U256(BigUint::from_bytes_be(bytes)))
    }

    pub fn from_rlp(value: &RlpValue) -> BridgeResult<Self> {
        Self::from_be_slice(value.as_bytes()?)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    pub fn widening_mul(&self, rhs: &U256) -> U512 {
        U512(&self.0 * &rhs.0)
    }

    pub fn widen(&self) -> U512 {
        U512(self.0.clone())
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct U512(BigUint);

impl U512 {
    pub fn from_be_slice(bytes: &[u8]) -> BridgeResult<Self> {
        if bytes.len() > 64 {
            return Err(BridgeError::InvalidSize {
                max: 64,
                actual: bytes.len(),
            });
        }
        Ok(U512(BigUint::from_bytes_be(bytes)))
    }

    pub fn to_be_bytes(&self) -> [u8; 64] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 64];
        out[64 - raw.len()..].copy_from_slice(&raw);
        out
    }
}

/// Native ledger amount in smallest units, 4 implied decimals.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, CandidType, Deserialize, Serialize,
)]
pub struct NativeAmount(i64);

impl NativeAmount {
    pub fn new(units: i64) -> BridgeResult<Self> {
        if (0..=MAX_NATIVE_AMOUNT).contains(&units) {
            Ok(NativeAmount(units))
        } else {
            Err(BridgeError::AmountOverflow)
        }
    }

    pub fn zero() -> Self {
        NativeAmount(0)
    }

    pub fn units(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Token smallest units carried verbatim; must be strictly below
    /// the representable maximum.
    pub fn from_token_units(value: &U256) -> BridgeResult<Self> {
        if value.0 >= BigUint::from(MAX_NATIVE_AMOUNT as u64) {
            return Err(BridgeError::AmountOverflow);
        }
        // narrowing cannot fail past the bound above
        Ok(NativeAmount(value.0.to_i64().unwrap_or(i64::MAX)))
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10i64.pow(NATIVE_PRECISION);
        write!(f, "{}.{:04}", self.0 / scale, self.0 % scale)
    }
}

/// Floor-divides a wei quantity by the conversion scale. The quotient
/// must be strictly below the representable native maximum.
pub fn wei_to_native(wei: &U512) -> BridgeResult<NativeAmount> {
    let quotient = &wei.0 / BigUint::from(WEI_PER_NATIVE_UNIT);
    if quotient >= BigUint::from(MAX_NATIVE_AMOUNT as u64) {
        return Err(BridgeError::AmountOverflow);
    }
    Ok(NativeAmount(quotient.to_i64().unwrap_or(i64::MAX)))
}

/// Minimal big-endian scalar bytes: no leading zeroes, zero is empty.
pub fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let raw = value.to_be_bytes();
    let start = raw.iter().position(|&b| b != 0).unwrap_or(raw.len());
    raw[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_width_is_enforced() {
        assert!(U256::from_be_slice(&[0xff; 32]).is_ok());
        assert_eq!(
            U256::from_be_slice(&[0xff; 33]),
            Err(BridgeError::InvalidSize { max: 32, actual: 33 }),
        );
    }

    #[test]
    fn u256_left_pads_short_input() {
        let value = U256::from_be_slice(&[0x12, 0x34]).unwrap();
        let mut expected = [0u8; 32];
        expected[30] = 0x12;
        expected[31] = 0x34;
        assert_eq!(value.to_be_bytes(), expected);
        assert_eq!(value, U256::from_u64(0x1234));
    }

    #[test]
    fn widening_mul_crosses_256_bits() {
        let mut be = [0u8; 17];
        be[0] = 1; // 2^128
        let x = U256::from_be_slice(&be).unwrap();
        let product = x.widening_mul(&x); // 2^256
        let bytes = product.to_be_bytes();
        assert_eq!(bytes[31], 1);
        assert!(bytes[32..].iter().all(|&b| b == 0));
        assert!(bytes[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn wei_conversion_floors() {
        let wei = U256::from_u64(420_000_000_000_000).widen();
        assert_eq!(wei_to_native(&wei).unwrap(), NativeAmount(4));

        let wei = U256::from_u64(WEI_PER_NATIVE_UNIT - 1).widen();
        assert_eq!(wei_to_native(&wei).unwrap(), NativeAmount(0));

        let wei = U256::from_u64(15).widening_mul(&U256::from_u64(10_000_000_000_000));
        assert_eq!(wei_to_native(&wei).unwrap(), NativeAmount(1));
    }

    #[test]
    fn wei_conversion_bounds() {
        // quotient == MAX_NATIVE_AMOUNT is already out of range
        let wei = U256::from_u64(1 << 62).widening_mul(&U256::from_u64(WEI_PER_NATIVE_UNIT));
        assert_eq!(wei_to_native(&wei), Err(BridgeError::AmountOverflow));

        let wei = U256::from_u64((MAX_NATIVE_AMOUNT - 1) as u64)
            .widening_mul(&U256::from_u64(WEI_PER_NATIVE_UNIT));
        assert_eq!(
            wei_to_native(&wei).unwrap(),
            NativeAmount(MAX_NATIVE_AMOUNT - 1),
        );
    }

    #[test]
    fn token_units_are_strictly_bounded() {
        let ok = U256::from_u64((MAX_NATIVE_AMOUNT - 1) as u64);
        assert_eq!(
            NativeAmount::from_token_units(&ok).unwrap().units(),
            MAX_NATIVE_AMOUNT - 1,
        );
        let too_big = U256::from_u64(MAX_NATIVE_AMOUNT as u64);
        assert_eq!(
            NativeAmount::from_token_units(&too_big),
            Err(BridgeError::AmountOverflow),
        );
    }

    #[test]
    fn minimal_scalar_bytes() {
        assert!(minimal_be_bytes(0).is_empty());
        assert_eq!(minimal_be_bytes(1), vec![1]);
        assert_eq!(minimal_be_bytes(59), vec![59]);
        assert_eq!(minimal_be_bytes(0x0400), vec![0x04, 0x00]);
    }
}
