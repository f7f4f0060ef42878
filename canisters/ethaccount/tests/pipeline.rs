//! Full ingestion pipeline over in-memory collaborators: decode,
//! recover, classify, plan, commit.

use std::collections::BTreeMap;

use candid::Principal;
use once_cell::sync::Lazy;

use ethaccount::address::EthAddress;
use ethaccount::error::{BridgeError, BridgeResult};
use ethaccount::ledger::{
    execute_foreign_tx, IdentityRecord, IdentityStore, NativeOperation, TokenRegistry,
};
use ethaccount::name::AccountName;
use ethaccount::tx::TxKind;
use ethaccount::uint::NativeAmount;

// EIP-155 example transaction, chain id 1.
static RAW_TX: Lazy<Vec<u8>> = Lazy::new(|| {
    hex::decode(concat!(
        "f86c098504a817c800825208943535353535353535353535353535353535353535",
        "880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c",
        "71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc",
        "64214b297fb1966a3b6d83",
    ))
    .unwrap()
});

const SENDER: &str = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f";
const DESTINATION: &str = "0x3535353535353535353535353535353535353535";
const SIGNING_HASH: &str = "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53";

#[derive(Default)]
struct MemoryStore {
    records: BTreeMap<[u8; 20], IdentityRecord>,
}

impl IdentityStore for MemoryStore {
    fn lookup_by_foreign_address(&self, address: &EthAddress) -> Option<IdentityRecord> {
        self.records.get(address.as_bytes()).cloned()
    }

    fn record_new_identity(&mut self, account: AccountName, address: EthAddress) {
        self.records.insert(
            *address.as_bytes(),
            IdentityRecord {
                account,
                foreign_address: address,
                nonce: 0,
            },
        );
    }

    fn increment_nonce(&mut self, account: AccountName) {
        for record in self.records.values_mut() {
            if record.account == account {
                record.nonce += 1;
            }
        }
    }
}

struct NativeOnly(Principal);

impl TokenRegistry for NativeOnly {
    fn resolve_foreign_token(&self, _contract: &EthAddress) -> BridgeResult<Principal> {
        Err(BridgeError::AssetNotRegistered)
    }

    fn native_token(&self) -> BridgeResult<Principal> {
        Ok(self.0.clone())
    }
}

fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::default();
    store.record_new_identity(
        "relayone".parse().unwrap(),
        SENDER.parse().unwrap(),
    );
    for _ in 0..9 {
        store.increment_nonce("relayone".parse().unwrap());
    }
    store
}

#[test]
fn golden_vector_end_to_end() {
    let mut store = seeded_store();
    let registry = NativeOnly(Principal::from_slice(&[9; 4]));
    let mut ops: Vec<NativeOperation> = Vec::new();

    let receipt = execute_foreign_tx(
        &mut store,
        &registry,
        &mut ops,
        1,
        &RAW_TX,
        NativeAmount::new(4).unwrap(),
        "collector".parse().unwrap(),
        b"pipeline entropy",
    )
    .unwrap();

    assert_eq!(receipt.tx_hash, SIGNING_HASH);
    assert_eq!(receipt.sender, SENDER);
    assert_eq!(receipt.account, "relayone");
    assert_eq!(receipt.kind, TxKind::PlainTransfer);
    assert_eq!(receipt.fee_charged.units(), 4);
    assert_eq!(receipt.operations, 3);

    let destination: EthAddress = DESTINATION.parse().unwrap();
    let created = store.lookup_by_foreign_address(&destination).unwrap();
    assert_eq!(created.nonce, 0);
    assert_eq!(
        store
            .lookup_by_foreign_address(&SENDER.parse().unwrap())
            .unwrap()
            .nonce,
        10,
    );

    // value moved to the freshly created account, then the fee
    match &ops[1] {
        NativeOperation::Transfer { to, amount, .. } => {
            assert_eq!(*to, created.account);
            assert_eq!(amount.units(), 10_000);
        }
        other => panic!("unexpected op {other:?}"),
    }
    match &ops[2] {
        NativeOperation::Transfer { amount, memo, .. } => {
            assert_eq!(amount.units(), 4);
            assert_eq!(memo, "fee");
        }
        other => panic!("unexpected op {other:?}"),
    }
}

#[test]
fn independent_executors_agree() {
    let registry = NativeOnly(Principal::from_slice(&[9; 4]));
    let entropy = b"shared deterministic context";

    let run = || {
        let mut store = seeded_store();
        let mut ops: Vec<NativeOperation> = Vec::new();
        let receipt = execute_foreign_tx(
            &mut store,
            &registry,
            &mut ops,
            1,
            &RAW_TX,
            NativeAmount::zero(),
            "collector".parse().unwrap(),
            entropy,
        )
        .unwrap();
        let destination: EthAddress = DESTINATION.parse().unwrap();
        let created = store.lookup_by_foreign_address(&destination).unwrap();
        (receipt.tx_hash, receipt.sender, created.account)
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
}

#[test]
fn failed_push_leaves_both_collaborators_untouched() {
    let mut store = seeded_store();
    let registry = NativeOnly(Principal::from_slice(&[9; 4]));
    let mut ops: Vec<NativeOperation> = Vec::new();

    // wrong chain id: the v byte no longer matches
    let err = execute_foreign_tx(
        &mut store,
        &registry,
        &mut ops,
        59,
        &RAW_TX,
        NativeAmount::zero(),
        "collector".parse().unwrap(),
        b"entropy",
    )
    .unwrap_err();
    assert_eq!(
        err,
        BridgeError::WrongChainId {
            chain_id: 59,
            v: 0x25,
        },
    );
    assert!(ops.is_empty());
    assert_eq!(
        store
            .lookup_by_foreign_address(&SENDER.parse().unwrap())
            .unwrap()
            .nonce,
        9,
    );
}
