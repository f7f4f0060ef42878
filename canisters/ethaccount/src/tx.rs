//! Foreign transaction ingestion: signature reconstruction, secp256k1
//! recovery, sender derivation, intent classification and fee
//! computation. One pure pass per blob, no partial results.

use candid::{CandidType, Principal};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::address::EthAddress;
use crate::error::{BridgeError, BridgeResult};
use crate::keccak::keccak256;
use crate::name::AccountName;
use crate::rlp::{self, RlpValue};
use crate::uint::{minimal_be_bytes, wei_to_native, NativeAmount, U256};

/// keccak("transfer(address,uint256)")[..4]
pub const TOKEN_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Method id of the embedded native-action payload.
pub const EMBEDDED_ACTIONS_SELECTOR: [u8; 4] = [0xba, 0xfb, 0xb2, 0x08];

/// selector + padded recipient + amount
const TOKEN_TRANSFER_PAYLOAD_LEN: usize = 4 + 32 + 32;

/// selector + reserved word + blob offset + blob length
const EMBEDDED_HEADER_LEN: usize = 4 + 32 * 3;

/// Where the blob's length word sits, relative to the argument region
/// (after the reserved and offset words).
const EMBEDDED_BLOB_OFFSET: u64 = 64;

const TX_FIELD_COUNT: usize = 9;
const UNSIGNED_FIELD_COUNT: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, CandidType, Deserialize, Serialize)]
pub enum TxKind {
    PlainTransfer,
    TokenTransfer,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub recovery_id: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl RecoverableSignature {
    /// Rebuilds the 65-byte recoverable signature from the three RLP
    /// fields. `v` must be the chain-encoded parity byte for the
    /// configured chain; bare pre-replay-protection values are
    /// rejected rather than silently mis-recovered.
    pub fn reconstruct(
        v: &RlpValue,
        r: &RlpValue,
        s: &RlpValue,
        chain_id: u64,
    ) -> BridgeResult<Self> {
        let v_bytes = v.as_bytes()?;
        if v_bytes.len() != 1 {
            return Err(BridgeError::InvalidSignatureLength {
                field: "v".to_string(),
                expected: 1,
                actual: v_bytes.len(),
            });
        }
        let v_byte = v_bytes[0];
        let r = pad_scalar(r, "r")?;
        let s = pad_scalar(s, "s")?;

        let base = chain_id
            .checked_mul(2)
            .and_then(|doubled| doubled.checked_add(35));
        let v_value = v_byte as u64;
        match base {
            Some(base) if v_value == base || v_value == base + 1 => Ok(RecoverableSignature {
                recovery_id: ((v_value - 35) % 2) as u8,
                r,
                s,
            }),
            _ => Err(BridgeError::WrongChainId { chain_id, v: v_byte }),
        }
    }
}

fn pad_scalar(value: &RlpValue, field: &str) -> BridgeResult<[u8; 32]> {
    let bytes = value.as_bytes()?;
    if bytes.len() > 32 {
        return Err(BridgeError::InvalidSignatureLength {
            field: field.to_string(),
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

pub fn recover_public_key(
    hash: &[u8; 32],
    signature: &RecoverableSignature,
) -> BridgeResult<VerifyingKey> {
    let parsed = EcdsaSignature::from_scalars(signature.r, signature.s)
        .map_err(|_| BridgeError::RecoveryFailed)?;
    let recovery_id =
        RecoveryId::from_byte(signature.recovery_id).ok_or(BridgeError::RecoveryFailed)?;
    VerifyingKey::recover_from_prehash(hash, &parsed, recovery_id)
        .map_err(|_| BridgeError::RecoveryFailed)
}

pub fn derive_address(key: &VerifyingKey) -> EthAddress {
    let point = key.to_encoded_point(false);
    let mut xy = [0u8; 64];
    xy.copy_from_slice(&point.as_bytes()[1..65]);
    EthAddress::from_uncompressed_key(&xy)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Option<EthAddress>,
    pub value: U256,
    pub payload: Vec<u8>,
    pub sender: EthAddress,
    pub hash: [u8; 32],
    pub public_key: Vec<u8>,
    pub signature: RecoverableSignature,
    pub kind: TxKind,
}

impl EthTransaction {
    pub fn parse(raw: &[u8], chain_id: u64) -> BridgeResult<Self> {
        let items = match rlp::decode(raw)? {
            RlpValue::List(items) => items,
            RlpValue::Bytes(_) => return Err(BridgeError::InvalidTransaction),
        };
        if items.len() != TX_FIELD_COUNT {
            return Err(BridgeError::InvalidTransaction);
        }

        let nonce = U256::from_rlp(&items[0])?;
        let gas_price = U256::from_rlp(&items[1])?;
        let gas_limit = U256::from_rlp(&items[2])?;
        let to = EthAddress::from_rlp(&items[3])?;
        let value = U256::from_rlp(&items[4])?;
        let payload = items[5].as_bytes()?.to_vec();
        let signature = RecoverableSignature::reconstruct(&items[6], &items[7], &items[8], chain_id)?;

        let hash = signing_hash(items, chain_id);
        let key = recover_public_key(&hash, &signature)?;
        let sender = derive_address(&key);
        let kind = classify(&payload);

        Ok(EthTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            payload,
            sender,
            hash,
            public_key: key.to_encoded_point(true).as_bytes().to_vec(),
            signature,
            kind,
        })
    }

    pub fn is_plain_transfer(&self) -> bool {
        self.kind == TxKind::PlainTransfer
    }

    pub fn is_token_transfer(&self) -> bool {
        self.kind == TxKind::TokenTransfer
    }

    pub fn is_transfer(&self) -> bool {
        self.is_plain_transfer() || self.is_token_transfer()
    }

    pub fn transfer_destination(&self) -> BridgeResult<EthAddress> {
        match self.kind {
            TxKind::PlainTransfer => self.to.ok_or(BridgeError::InvalidTransaction),
            TxKind::TokenTransfer => EthAddress::from_bytes(&self.payload[16..36]),
            TxKind::Other => Err(BridgeError::NotATransfer),
        }
    }

    /// Smallest units moved by a transfer: wei-scaled for a plain
    /// transfer, the token's own units otherwise.
    pub fn transfer_amount(&self) -> BridgeResult<NativeAmount> {
        match self.kind {
            TxKind::PlainTransfer => wei_to_native(&self.value.widen()),
            TxKind::TokenTransfer => {
                let amount = U256::from_be_slice(&self.payload[36..68])?;
                NativeAmount::from_token_units(&amount)
            }
            TxKind::Other => Err(BridgeError::NotATransfer),
        }
    }

    /// Maximum fee the signer agreed to, in native smallest units.
    /// The multiply runs in 512 bits; it cannot wrap.
    pub fn fee(&self) -> BridgeResult<NativeAmount> {
        wei_to_native(&self.gas_price.widening_mul(&self.gas_limit))
    }
}

/// Signing preimage: the six unsigned fields with the chain id and two
/// empty strings appended, re-encoded and hashed.
fn signing_hash(mut fields: Vec<RlpValue>, chain_id: u64) -> [u8; 32] {
    fields.truncate(UNSIGNED_FIELD_COUNT);
    fields.push(RlpValue::Bytes(minimal_be_bytes(chain_id)));
    fields.push(RlpValue::empty_bytes());
    fields.push(RlpValue::empty_bytes());
    keccak256(&rlp::encode(&RlpValue::List(fields)))
}

pub(crate) fn classify(payload: &[u8]) -> TxKind {
    if payload.is_empty() {
        TxKind::PlainTransfer
    } else if payload.len() == TOKEN_TRANSFER_PAYLOAD_LEN
        && payload[..4] == TOKEN_TRANSFER_SELECTOR
    {
        TxKind::TokenTransfer
    } else {
        TxKind::Other
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedAction {
    pub canister: Principal,
    pub method: String,
    pub actor: AccountName,
    pub args: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthTxPayload {
    pub reserved: U256,
    pub actions: Vec<EmbeddedAction>,
}

impl EthTxPayload {
    /// Parses the generic embedded-action payload: the fixed header,
    /// then an RLP list of `[canister, method, actor, args]` lists.
    /// The declared blob length must match the remaining bytes
    /// exactly.
    pub fn parse(data: &[u8]) -> BridgeResult<Self> {
        if data.len() < EMBEDDED_HEADER_LEN {
            return Err(BridgeError::MalformedEncoding);
        }
        if data[..4] != EMBEDDED_ACTIONS_SELECTOR {
            return Err(BridgeError::InvalidMethodId);
        }
        let reserved = U256::from_be_slice(&data[4..36])?;
        let blob_offset = U256::from_be_slice(&data[36..68])?;
        if blob_offset != U256::from_u64(EMBEDDED_BLOB_OFFSET) {
            return Err(BridgeError::MalformedEncoding);
        }
        let declared_len = U256::from_be_slice(&data[68..100])?;
        let blob = &data[EMBEDDED_HEADER_LEN..];
        if declared_len != U256::from_u64(blob.len() as u64) {
            return Err(BridgeError::MalformedEncoding);
        }

        let items = match rlp::decode(blob)? {
            RlpValue::List(items) => items,
            RlpValue::Bytes(_) => return Err(BridgeError::InvalidTransaction),
        };
        let mut actions = Vec::with_capacity(items.len());
        for item in &items {
            let fields = match item {
                RlpValue::List(fields) if fields.len() == 4 => fields,
                _ => return Err(BridgeError::InvalidTransaction),
            };
            let canister = Principal::try_from_slice(fields[0].as_bytes()?)
                .map_err(|_| BridgeError::MalformedEncoding)?;
            let method = String::from_utf8(fields[1].as_bytes()?.to_vec())
                .map_err(|_| BridgeError::MalformedEncoding)?;
            let actor_text = std::str::from_utf8(fields[2].as_bytes()?)
                .map_err(|_| BridgeError::MalformedEncoding)?;
            let actor: AccountName = actor_text.parse()?;
            let args = fields[3].as_bytes()?.to_vec();
            actions.push(EmbeddedAction {
                canister,
                method,
                actor,
                args,
            });
        }
        Ok(EthTxPayload { reserved, actions })
    }
}
