//! Canister letting holders of a foreign-signed (Ethereum-style)
//! transaction act on this ledger. Holds the identity table, the
//! asset registry and the submitted-operation log; the decoding and
//! verification pipeline lives in the library modules.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use candid::{CandidType, Nat, Principal};
use ic_cdk::api::caller;
use ic_cdk::api::time;
use ic_cdk::storage::{stable_restore, stable_save};
use ic_cdk::trap;
use ic_cdk_macros::{init, post_upgrade, pre_upgrade, query, update};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

pub mod address;
pub mod error;
pub mod keccak;
pub mod ledger;
pub mod name;
pub mod rlp;
pub mod tx;
pub mod uint;

use address::EthAddress;
use error::{BridgeError, BridgeResult};
use keccak::keccak256;
use ledger::{
    DepositReceipt, IdentityRecord, IdentityStore, NativeOperation, PushReceipt, TokenRegistry,
};
use name::AccountName;
use uint::NativeAmount;

pub const DEFAULT_CHAIN_ID: u64 = 59;

thread_local! {
    static STATE: RefCell<Option<BridgeState>> = RefCell::new(None);
}

#[derive(Clone, Debug, Default, CandidType, Deserialize, Serialize)]
struct BridgeState {
    admins: BTreeSet<Principal>,
    config: BridgeConfig,
    accounts: BTreeMap<u64, AccountRecord>,
    address_index: BTreeMap<String, u64>,
    assets: BTreeMap<Principal, AssetConfig>,
    ops: Vec<OpLogEntry>,
    next_op_id: u64,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
struct BridgeConfig {
    chain_id: u64,
    native_token: Option<Principal>,
    paused: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            chain_id: DEFAULT_CHAIN_ID,
            native_token: None,
            paused: true,
        }
    }
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
struct AccountRecord {
    foreign_address: String,
    nonce: u64,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
struct AssetConfig {
    foreign_address: String,
    status: AssetStatus,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
enum AssetStatus {
    Active,
    Deprecated,
    Disabled,
}

impl Default for AssetStatus {
    fn default() -> Self {
        AssetStatus::Active
    }
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct OpLogEntry {
    pub id: u64,
    pub ts_sec: u64,
    pub tx_hash: Option<String>,
    pub op: NativeOperation,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct AccountInfo {
    pub account: String,
    pub nonce: u64,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct InfoResponse {
    pub chain_id: u64,
    pub native_token: Option<Principal>,
    pub accounts: u64,
    pub operations: u64,
    pub paused: bool,
}

#[derive(Clone, Debug, Default, CandidType, Deserialize)]
pub struct InitArgs {
    pub admins: Vec<Principal>,
    pub chain_id: Option<u64>,
    pub native_token: Option<Principal>,
}

fn state_mut<T>(f: impl FnOnce(&mut BridgeState) -> T) -> T {
    STATE.with(|cell| {
        let mut guard = cell.borrow_mut();
        let state = guard.as_mut().expect("bridge state not initialized");
        f(state)
    })
}

fn state_ref<T>(f: impl FnOnce(&BridgeState) -> T) -> T {
    STATE.with(|cell| {
        let guard = cell.borrow();
        let state = guard.as_ref().expect("bridge state not initialized");
        f(state)
    })
}

fn ensure_admin() -> BridgeResult<()> {
    let caller = caller();
    state_ref(|state| {
        if state.admins.contains(&caller) {
            Ok(())
        } else {
            Err(BridgeError::NotAuthorized)
        }
    })
}

#[init]
fn init(args: Option<InitArgs>) {
    let args = args.unwrap_or_default();
    let mut admins: BTreeSet<Principal> = args.admins.into_iter().collect();
    admins.insert(caller());

    let config = BridgeConfig {
        chain_id: args.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
        native_token: args.native_token,
        paused: true,
    };

    let state = BridgeState {
        admins,
        config,
        accounts: BTreeMap::new(),
        address_index: BTreeMap::new(),
        assets: BTreeMap::new(),
        ops: Vec::new(),
        next_op_id: 1,
    };

    STATE.with(|cell| {
        *cell.borrow_mut() = Some(state);
    });
}

#[pre_upgrade]
fn pre_upgrade() {
    let snapshot = STATE.with(|cell| cell.borrow().clone());
    if let Err(e) = stable_save((snapshot,)) {
        trap(&format!("failed to save state: {}", e));
    }
}

#[post_upgrade]
fn post_upgrade() {
    let (snapshot,): (Option<BridgeState>,) =
        stable_restore().unwrap_or_else(|e| trap(&format!("failed to restore state: {}", e)));
    STATE.with(|cell| {
        *cell.borrow_mut() = Some(snapshot.unwrap_or_default());
    });
}

/// Identity table adapter: account records keyed by packed name with
/// a by-address index, the way the table is actually stored.
struct StateIdentityStore<'a> {
    accounts: &'a mut BTreeMap<u64, AccountRecord>,
    address_index: &'a mut BTreeMap<String, u64>,
}

impl IdentityStore for StateIdentityStore<'_> {
    fn lookup_by_foreign_address(&self, address: &EthAddress) -> Option<IdentityRecord> {
        let value = self.address_index.get(&address.to_string())?;
        let record = self.accounts.get(value)?;
        Some(IdentityRecord {
            account: AccountName::from_value(*value),
            foreign_address: *address,
            nonce: record.nonce,
        })
    }

    fn record_new_identity(&mut self, account: AccountName, address: EthAddress) {
        let key = address.to_string();
        self.accounts.insert(
            account.value(),
            AccountRecord {
                foreign_address: key.clone(),
                nonce: 0,
            },
        );
        self.address_index.insert(key, account.value());
    }

    fn increment_nonce(&mut self, account: AccountName) {
        if let Some(record) = self.accounts.get_mut(&account.value()) {
            record.nonce += 1;
        }
    }
}

struct StateTokenRegistry<'a> {
    assets: &'a BTreeMap<Principal, AssetConfig>,
    native_token: Option<Principal>,
}

impl TokenRegistry for StateTokenRegistry<'_> {
    fn resolve_foreign_token(&self, contract: &EthAddress) -> BridgeResult<Principal> {
        let key = contract.to_string();
        for (principal, asset) in self.assets.iter() {
            if asset.foreign_address == key {
                return match asset.status {
                    AssetStatus::Active | AssetStatus::Deprecated => Ok(principal.clone()),
                    AssetStatus::Disabled => Err(BridgeError::AssetNotActive),
                };
            }
        }
        Err(BridgeError::AssetNotRegistered)
    }

    fn native_token(&self) -> BridgeResult<Principal> {
        self.native_token
            .clone()
            .ok_or(BridgeError::ConfigurationMissing {
                field: "native_token".to_string(),
            })
    }
}

#[update]
fn push_tx(raw_tx: Vec<u8>, fee: Nat, fee_collector: String) -> Result<PushReceipt, String> {
    push_tx_internal(raw_tx, fee, fee_collector).map_err(|err| err.to_string())
}

fn push_tx_internal(
    raw_tx: Vec<u8>,
    fee: Nat,
    fee_collector: String,
) -> BridgeResult<PushReceipt> {
    let fee = nat_to_amount(&fee)?;
    let fee_collector: AccountName = fee_collector.parse()?;
    let entropy = invocation_entropy(&raw_tx);

    state_mut(|state| {
        if state.config.paused {
            return Err(BridgeError::Paused);
        }
        let chain_id = state.config.chain_id;
        let native_token = state.config.native_token.clone();
        let BridgeState {
            accounts,
            address_index,
            assets,
            ops,
            next_op_id,
            ..
        } = state;
        let mut store = StateIdentityStore {
            accounts,
            address_index,
        };
        let registry = StateTokenRegistry {
            assets,
            native_token,
        };
        let mut planned: Vec<NativeOperation> = Vec::new();

        let receipt = ledger::execute_foreign_tx(
            &mut store,
            &registry,
            &mut planned,
            chain_id,
            &raw_tx,
            fee,
            fee_collector,
            &entropy,
        )?;
        append_ops(ops, next_op_id, Some(receipt.tx_hash.clone()), planned);
        Ok(receipt)
    })
}

#[update]
fn deposit(token: Principal, amount: Nat, memo: String) -> Result<DepositReceipt, String> {
    deposit_internal(token, amount, memo).map_err(|err| err.to_string())
}

fn deposit_internal(token: Principal, amount: Nat, memo: String) -> BridgeResult<DepositReceipt> {
    let amount = nat_to_amount(&amount)?;
    let entropy = invocation_entropy(memo.as_bytes());

    state_mut(|state| {
        if state.config.paused {
            return Err(BridgeError::Paused);
        }
        let native_token = state.config.native_token.clone();
        let BridgeState {
            accounts,
            address_index,
            assets,
            ops,
            next_op_id,
            ..
        } = state;
        let mut store = StateIdentityStore {
            accounts,
            address_index,
        };
        let registry = StateTokenRegistry {
            assets,
            native_token,
        };
        let mut planned: Vec<NativeOperation> = Vec::new();

        let receipt = ledger::handle_deposit(
            &mut store,
            &registry,
            &mut planned,
            token,
            amount,
            &memo,
            &entropy,
        )?;
        append_ops(ops, next_op_id, None, planned);
        Ok(receipt)
    })
}

fn append_ops(
    log: &mut Vec<OpLogEntry>,
    next_op_id: &mut u64,
    tx_hash: Option<String>,
    planned: Vec<NativeOperation>,
) {
    let ts_sec = time() / 1_000_000_000;
    for op in planned {
        let id = *next_op_id;
        *next_op_id += 1;
        log.push(OpLogEntry {
            id,
            ts_sec,
            tx_hash: tx_hash.clone(),
            op,
        });
    }
}

#[query]
fn account_of(address: String) -> Option<AccountInfo> {
    let parsed: EthAddress = match address.parse() {
        Ok(value) => value,
        Err(_) => return None,
    };
    state_ref(|state| {
        let value = state.address_index.get(&parsed.to_string())?;
        let record = state.accounts.get(value)?;
        Some(AccountInfo {
            account: AccountName::from_value(*value).to_string(),
            nonce: record.nonce,
        })
    })
}

#[query]
fn submitted_operations(start_after: Option<u64>, limit: u32) -> Vec<OpLogEntry> {
    state_ref(|state| {
        let mut entries = Vec::new();
        for entry in state.ops.iter().rev() {
            if let Some(cursor) = start_after {
                if entry.id >= cursor {
                    continue;
                }
            }
            if entries.len() as u32 >= limit.max(1) {
                break;
            }
            entries.push(entry.clone());
        }
        entries
    })
}

#[query]
fn info() -> InfoResponse {
    state_ref(|state| InfoResponse {
        chain_id: state.config.chain_id,
        native_token: state.config.native_token.clone(),
        accounts: state.accounts.len() as u64,
        operations: state.ops.len() as u64,
        paused: state.config.paused,
    })
}

#[update]
fn set_chain_id(chain_id: u64) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| state.config.chain_id = chain_id);
}

#[update]
fn set_native_token(token: Principal) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| state.config.native_token = Some(token));
}

#[update]
fn add_asset(token: Principal, foreign_address: String) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    let normalized: EthAddress = match foreign_address.parse() {
        Ok(value) => value,
        Err(err) => trap(&err.to_string()),
    };
    state_mut(|state| {
        state.assets.insert(
            token,
            AssetConfig {
                foreign_address: normalized.to_string(),
                status: AssetStatus::Active,
            },
        );
    });
}

#[update]
fn deprecate_asset(token: Principal) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| {
        if let Some(asset) = state.assets.get_mut(&token) {
            asset.status = AssetStatus::Deprecated;
        }
    });
}

#[update]
fn disable_asset(token: Principal) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| {
        if let Some(asset) = state.assets.get_mut(&token) {
            asset.status = AssetStatus::Disabled;
        }
    });
}

#[update]
fn pause(flag: bool) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| state.config.paused = flag);
}

/// Entropy for name generation: consensus-agreed context only, so
/// every node replaying this call derives the same bytes.
fn invocation_entropy(payload: &[u8]) -> Vec<u8> {
    let mut entropy = Vec::with_capacity(64);
    entropy.extend_from_slice(caller().as_slice());
    entropy.extend_from_slice(&time().to_le_bytes());
    entropy.extend_from_slice(&keccak256(payload));
    entropy
}

fn nat_to_amount(value: &Nat) -> BridgeResult<NativeAmount> {
    let units = value.0.to_i64().ok_or(BridgeError::AmountOverflow)?;
    NativeAmount::new(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nat_amounts_are_bounded() {
        assert_eq!(nat_to_amount(&Nat::from(100u32)).unwrap().units(), 100);
        assert_eq!(
            nat_to_amount(&Nat::from(1u128 << 63)),
            Err(BridgeError::AmountOverflow),
        );
        assert_eq!(
            nat_to_amount(&Nat::from(u128::MAX)),
            Err(BridgeError::AmountOverflow),
        );
    }

    #[test]
    fn config_defaults_to_paused() {
        let config = BridgeConfig::default();
        assert_eq!(config.chain_id, DEFAULT_CHAIN_ID);
        assert!(config.paused);
        assert!(config.native_token.is_none());
    }
}
