//! Collaborator seams and the two entry flows. The identity store,
//! asset registry and action dispatcher are injected; the flows plan
//! every operation first and only touch the store once no further
//! failure is possible.

use candid::{CandidType, Principal};
use serde::{Deserialize, Serialize};

use crate::address::EthAddress;
use crate::error::{BridgeError, BridgeResult};
use crate::name::{generate_account_name, AccountName};
use crate::tx::{EthTransaction, EthTxPayload, TxKind};
use crate::uint::{NativeAmount, U256};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityRecord {
    pub account: AccountName,
    pub foreign_address: EthAddress,
    pub nonce: u64,
}

pub trait IdentityStore {
    fn lookup_by_foreign_address(&self, address: &EthAddress) -> Option<IdentityRecord>;
    fn record_new_identity(&mut self, account: AccountName, address: EthAddress);
    fn increment_nonce(&mut self, account: AccountName);
}

pub trait TokenRegistry {
    /// Token canister behind a foreign token-contract address.
    fn resolve_foreign_token(&self, contract: &EthAddress) -> BridgeResult<Principal>;
    fn native_token(&self) -> BridgeResult<Principal>;
}

/// Fire-and-forget dispatch boundary; the core decides what to
/// submit, never executes anything itself.
pub trait ActionSink {
    fn submit(&mut self, op: NativeOperation);
}

impl ActionSink for Vec<NativeOperation> {
    fn submit(&mut self, op: NativeOperation) {
        self.push(op);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, CandidType, Deserialize, Serialize)]
pub enum NativeOperation {
    Transfer {
        token: Principal,
        /// `None` means the bridge treasury itself.
        from: Option<AccountName>,
        to: AccountName,
        amount: NativeAmount,
        memo: String,
    },
    CreateAccount {
        creator: Option<AccountName>,
        account: AccountName,
        foreign_address: String,
    },
    BindPublicKey {
        account: AccountName,
        #[serde(with = "serde_bytes")]
        public_key: Vec<u8>,
    },
    CallAction {
        canister: Principal,
        method: String,
        actor: AccountName,
        #[serde(with = "serde_bytes")]
        args: Vec<u8>,
    },
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct PushReceipt {
    pub tx_hash: String,
    pub sender: String,
    pub account: String,
    pub kind: TxKind,
    pub fee_charged: NativeAmount,
    pub operations: u64,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct DepositReceipt {
    pub account: String,
    pub created: bool,
    pub operations: u64,
}

pub fn execute_foreign_tx(
    store: &mut impl IdentityStore,
    tokens: &impl TokenRegistry,
    sink: &mut impl ActionSink,
    chain_id: u64,
    raw_tx: &[u8],
    offered_fee: NativeAmount,
    fee_collector: AccountName,
    entropy: &[u8],
) -> BridgeResult<PushReceipt> {
    let tx = EthTransaction::parse(raw_tx, chain_id)?;
    apply_foreign_tx(store, tokens, sink, &tx, offered_fee, fee_collector, entropy)
}

pub fn apply_foreign_tx(
    store: &mut impl IdentityStore,
    tokens: &impl TokenRegistry,
    sink: &mut impl ActionSink,
    tx: &EthTransaction,
    offered_fee: NativeAmount,
    fee_collector: AccountName,
    entropy: &[u8],
) -> BridgeResult<PushReceipt> {
    let sender = store
        .lookup_by_foreign_address(&tx.sender)
        .ok_or(BridgeError::AccountNotFound)?;
    if tx.nonce != U256::from_u64(sender.nonce) {
        return Err(BridgeError::NonceMismatch {
            expected: sender.nonce,
            actual: tx.nonce.to_string(),
        });
    }
    let max_fee = tx.fee()?;
    if offered_fee > max_fee {
        return Err(BridgeError::FeeExceedsMax {
            max: max_fee.to_string(),
            offered: offered_fee.to_string(),
        });
    }

    let mut planned: Vec<NativeOperation> = Vec::new();
    let mut new_identity: Option<(AccountName, EthAddress)> = None;

    match tx.kind {
        TxKind::PlainTransfer | TxKind::TokenTransfer => {
            let destination = tx.transfer_destination()?;
            let amount = tx.transfer_amount()?;
            let token = if tx.is_plain_transfer() {
                tokens.native_token()?
            } else {
                let contract = tx.to.ok_or(BridgeError::InvalidTransaction)?;
                tokens.resolve_foreign_token(&contract)?
            };
            let to_account = match store.lookup_by_foreign_address(&destination) {
                Some(record) => record.account,
                None => {
                    let account = generate_account_name(entropy);
                    planned.push(NativeOperation::CreateAccount {
                        creator: Some(sender.account),
                        account,
                        foreign_address: destination.to_string(),
                    });
                    new_identity = Some((account, destination));
                    account
                }
            };
            planned.push(NativeOperation::Transfer {
                token,
                from: Some(sender.account),
                to: to_account,
                amount,
                memo: String::new(),
            });
        }
        TxKind::Other => {
            let payload = EthTxPayload::parse(&tx.payload)?;
            for action in &payload.actions {
                if action.actor != sender.account {
                    return Err(BridgeError::UnauthorizedActor {
                        actor: action.actor.to_string(),
                    });
                }
            }
            for action in payload.actions {
                planned.push(NativeOperation::CallAction {
                    canister: action.canister,
                    method: action.method,
                    actor: action.actor,
                    args: action.args,
                });
            }
        }
    }

    // first use of the mapping binds the recovered key to the account
    if sender.nonce == 0 {
        planned.push(NativeOperation::BindPublicKey {
            account: sender.account,
            public_key: tx.public_key.clone(),
        });
    }
    if offered_fee.is_positive() {
        planned.push(NativeOperation::Transfer {
            token: tokens.native_token()?,
            from: Some(sender.account),
            to: fee_collector,
            amount: offered_fee,
            memo: "fee".to_string(),
        });
    }

    // nothing below can fail
    if let Some((account, address)) = new_identity {
        store.record_new_identity(account, address);
    }
    store.increment_nonce(sender.account);
    let operations = planned.len() as u64;
    for op in planned {
        sink.submit(op);
    }

    Ok(PushReceipt {
        tx_hash: format!("0x{}", hex::encode(tx.hash)),
        sender: tx.sender.to_string(),
        account: sender.account.to_string(),
        kind: tx.kind,
        fee_charged: offered_fee,
        operations,
    })
}

pub fn handle_deposit(
    store: &mut impl IdentityStore,
    tokens: &impl TokenRegistry,
    sink: &mut impl ActionSink,
    token: Principal,
    amount: NativeAmount,
    memo: &str,
    entropy: &[u8],
) -> BridgeResult<DepositReceipt> {
    if !amount.is_positive() {
        return Err(BridgeError::AmountNotPositive);
    }
    let (address, requested_name) = parse_memo(memo)?;

    match store.lookup_by_foreign_address(&address) {
        Some(record) => {
            sink.submit(NativeOperation::Transfer {
                token,
                from: None,
                to: record.account,
                amount,
                memo: String::new(),
            });
            Ok(DepositReceipt {
                account: record.account.to_string(),
                created: false,
                operations: 1,
            })
        }
        None => {
            let native = tokens.native_token()?;
            if token != native {
                return Err(BridgeError::DepositTokenNotNative);
            }
            let account = match requested_name {
                Some(name) => name,
                None => generate_account_name(entropy),
            };
            store.record_new_identity(account, address);
            sink.submit(NativeOperation::CreateAccount {
                creator: None,
                account,
                foreign_address: address.to_string(),
            });
            sink.submit(NativeOperation::Transfer {
                token,
                from: None,
                to: account,
                amount,
                memo: String::new(),
            });
            Ok(DepositReceipt {
                account: account.to_string(),
                created: true,
                operations: 2,
            })
        }
    }
}

/// Deposit memos carry `"<address>[,<account name>]"`.
pub fn parse_memo(memo: &str) -> BridgeResult<(EthAddress, Option<AccountName>)> {
    let (address_part, name_part) = match memo.split_once(',') {
        Some((address, name)) => (address, Some(name)),
        None => (memo, None),
    };
    let address: EthAddress = address_part.parse()?;
    let name = match name_part {
        Some(text) if !text.trim().is_empty() => Some(text.trim().parse()?),
        _ => None,
    };
    Ok((address, name))
}
