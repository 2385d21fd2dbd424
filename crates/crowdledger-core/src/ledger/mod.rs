use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::abi::StateMutability;
use crate::contracts::{CallContext, ContractKind, ContractState, Revert};
use crate::crypto::{serde_hash, Address};
use crate::tx::{Event, Receipt, ReceiptStatus, SignedTransaction, TxAction, TxError, TxHash};
use crate::units::{serde_amount, Amount};

pub type BlockNumber = u64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds in account {account}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        account: Address,
        balance: Amount,
        needed: Amount,
    },
    #[error("unknown account {account}")]
    UnknownAccount { account: Address },
    #[error("balance of {account} would overflow")]
    BalanceOverflow { account: Address },
    #[error("no contract deployed at {address}")]
    UnknownContract { address: Address },
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TxError),
    #[error("wrong chain id: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },
    #[error("nonce mismatch for {account}: expected {expected}, got {actual}")]
    NonceMismatch {
        account: Address,
        expected: u64,
        actual: u64,
    },
    #[error("duplicate transaction")]
    DuplicateTransaction,
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("block {0} not found")]
    UnknownBlock(BlockNumber),
    #[error("source verification failed: {0}")]
    SourceMismatch(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountState {
    #[serde(with = "serde_amount")]
    pub balance: Amount,
    pub nonce: u64,
}

/// Balance changes requested by contracts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMutation {
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub kind: ContractKind,
    pub deployer: Address,
    pub constructor_args: Value,
    #[serde(with = "serde_hash")]
    pub code_hash: [u8; 32],
    pub block_number: BlockNumber,
    pub state: ContractState,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub timestamp: u64,
    #[serde(with = "serde_hash")]
    pub parent_hash: [u8; 32],
    pub transactions: Vec<String>,
    #[serde(with = "serde_hash")]
    pub state_root: [u8; 32],
    #[serde(with = "serde_hash")]
    pub hash: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genesis {
    pub chain_id: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub alloc: BTreeMap<Address, GenesisAccount>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct GenesisAccount(#[serde(with = "serde_amount")] pub Amount);

impl Genesis {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            timestamp: 0,
            alloc: BTreeMap::new(),
        }
    }

    pub fn fund(mut self, account: Address, amount: Amount) -> Self {
        self.alloc.insert(account, GenesisAccount(amount));
        self
    }
}

/// Authoritative chain state: balances, deployed contracts, mined blocks
/// and receipts.
#[derive(Clone, Debug)]
pub struct LedgerState {
    chain_id: u64,
    accounts: BTreeMap<Address, AccountState>,
    contracts: BTreeMap<Address, Deployment>,
    blocks: Vec<BlockHeader>,
    receipts: BTreeMap<TxHash, Receipt>,
}

impl LedgerState {
    pub fn new(genesis: &Genesis) -> Self {
        let mut ledger = Self {
            chain_id: genesis.chain_id,
            accounts: BTreeMap::new(),
            contracts: BTreeMap::new(),
            blocks: Vec::new(),
            receipts: BTreeMap::new(),
        };
        for (account, GenesisAccount(amount)) in &genesis.alloc {
            ledger.accounts.insert(
                *account,
                AccountState {
                    balance: *amount,
                    nonce: 0,
                },
            );
        }
        ledger.seal_block(genesis.timestamp, Vec::new());
        ledger
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn head(&self) -> &BlockHeader {
        // Genesis is sealed in `new`, so there is always a head.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn height(&self) -> BlockNumber {
        self.head().number
    }

    pub fn timestamp(&self) -> u64 {
        self.head().timestamp
    }

    pub fn block(&self, number: BlockNumber) -> Result<&BlockHeader, LedgerError> {
        usize::try_from(number)
            .ok()
            .and_then(|idx| self.blocks.get(idx))
            .ok_or(LedgerError::UnknownBlock(number))
    }

    pub fn account(&self, account: &Address) -> AccountState {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    pub fn balance(&self, account: &Address) -> Amount {
        self.account(account).balance
    }

    pub fn nonce(&self, account: &Address) -> u64 {
        self.account(account).nonce
    }

    pub fn contract(&self, address: &Address) -> Option<&Deployment> {
        self.contracts.get(address)
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<&Receipt> {
        self.receipts.get(hash)
    }

    /// Apply `mutations` all at once or not at all.
    pub fn apply_mutations(&mut self, mutations: &[LedgerMutation]) -> Result<(), LedgerError> {
        let mut staged = self.accounts.clone();
        apply_all(&mut staged, mutations)?;
        self.accounts = staged;
        Ok(())
    }

    /// Mine a block without transactions.
    pub fn mine_empty(&mut self, timestamp: u64) -> &BlockHeader {
        let timestamp = timestamp.max(self.timestamp());
        self.seal_block(timestamp, Vec::new());
        self.head()
    }

    /// Admit a signed transaction and mine it into its own block.
    ///
    /// Admission failures leave the ledger untouched. A transaction that
    /// reverts is still mined: the nonce advances, nothing else changes.
    pub fn submit(&mut self, stx: &SignedTransaction, timestamp: u64) -> Result<Receipt, LedgerError> {
        stx.verify()?;
        let tx = &stx.tx;
        if tx.chain_id != self.chain_id {
            return Err(LedgerError::ChainIdMismatch {
                expected: self.chain_id,
                actual: tx.chain_id,
            });
        }
        let tx_hash = stx.hash().map_err(|_| TxError::Encoding)?;
        if self.receipts.contains_key(&tx_hash) {
            return Err(LedgerError::DuplicateTransaction);
        }
        let sender = self.account(&tx.from);
        if sender.nonce != tx.nonce {
            return Err(LedgerError::NonceMismatch {
                account: tx.from,
                expected: sender.nonce,
                actual: tx.nonce,
            });
        }
        if sender.balance < tx.value {
            return Err(LedgerError::InsufficientFunds {
                account: tx.from,
                balance: sender.balance,
                needed: tx.value,
            });
        }

        let timestamp = timestamp.max(self.timestamp());
        let block_number = self.height() + 1;
        self.accounts.entry(tx.from).or_default().nonce += 1;

        let (to, contract_address, result) = match &tx.action {
            TxAction::Transfer { to } => (Some(*to), None, self.execute_transfer(stx, *to)),
            TxAction::Deploy { contract, args } => {
                let address = Address::contract(&tx.from, tx.nonce);
                let result = self.execute_deploy(stx, address, contract, args, timestamp, block_number);
                let created = result.is_ok().then_some(address);
                (None, created, result)
            }
            TxAction::Call { to, method, args } => {
                (Some(*to), None, self.execute_call(stx, *to, method, args, timestamp))
            }
        };

        let (status, events, output) = match result {
            Ok((events, output)) => (ReceiptStatus::Success, events, output),
            Err(revert) => {
                debug!(tx = %crate::tx::hash_hex(&tx_hash), reason = %revert, "transaction reverted");
                (ReceiptStatus::Reverted { reason: revert.0 }, Vec::new(), Value::Null)
            }
        };

        let receipt = Receipt {
            tx_hash,
            block_number,
            from: tx.from,
            to,
            contract_address,
            status,
            events,
            output,
        };
        self.receipts.insert(tx_hash, receipt.clone());
        self.seal_block(timestamp, vec![crate::tx::hash_hex(&tx_hash)]);
        Ok(receipt)
    }

    /// Read-only contract call against the head state.
    pub fn call_view(&self, to: &Address, method: &str, args: &Value) -> Result<Value, LedgerError> {
        let deployment = self
            .contracts
            .get(to)
            .ok_or(LedgerError::UnknownContract { address: *to })?;
        let abi = deployment.kind.abi();
        match abi.function(method) {
            Some(f) if f.state_mutability == StateMutability::View => {}
            Some(_) => {
                return Err(LedgerError::Reverted(format!(
                    "{method} changes state and must be sent as a transaction"
                )))
            }
            None => return Err(LedgerError::Reverted(format!("unknown method {method}"))),
        }
        deployment
            .state
            .query(method, args)
            .map_err(|r| LedgerError::Reverted(r.0))
    }

    /// Compare a claimed source against the deployment record at `address`.
    pub fn verify_source(
        &self,
        address: &Address,
        contract_name: &str,
        code_hash: &[u8; 32],
        constructor_args: &Value,
    ) -> Result<(), LedgerError> {
        let deployment = self
            .contracts
            .get(address)
            .ok_or(LedgerError::UnknownContract { address: *address })?;
        if deployment.kind.name() != contract_name {
            return Err(LedgerError::SourceMismatch(format!(
                "{address} is a {}, not a {contract_name}",
                deployment.kind.name()
            )));
        }
        if &deployment.code_hash != code_hash {
            return Err(LedgerError::SourceMismatch("code hash differs".into()));
        }
        if !same_args(&deployment.constructor_args, constructor_args) {
            return Err(LedgerError::SourceMismatch("constructor arguments differ".into()));
        }
        Ok(())
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_merkle_root(&self.accounts, &self.contracts)
    }

    fn execute_transfer(&mut self, stx: &SignedTransaction, to: Address) -> Result<(Vec<Event>, Value), Revert> {
        let tx = &stx.tx;
        let mut staged = self.accounts.clone();
        move_value(&mut staged, &tx.from, &to, tx.value)?;
        self.accounts = staged;
        Ok((
            vec![Event::ValueTransferred {
                from: tx.from,
                to,
                amount: tx.value,
            }],
            Value::Null,
        ))
    }

    fn execute_deploy(
        &mut self,
        stx: &SignedTransaction,
        address: Address,
        contract: &str,
        args: &Value,
        timestamp: u64,
        block_number: BlockNumber,
    ) -> Result<(Vec<Event>, Value), Revert> {
        let tx = &stx.tx;
        let kind = ContractKind::from_name(contract)
            .ok_or_else(|| Revert::new(format!("unknown contract type {contract}")))?;
        if tx.value != 0 {
            return Err(Revert::new(format!("{contract} constructor is not payable")));
        }
        if self.contracts.contains_key(&address) {
            return Err(Revert::new(format!("address {address} already holds a contract")));
        }
        let ctx = CallContext {
            sender: tx.from,
            value: 0,
            timestamp,
            this: address,
        };
        let state = ContractState::instantiate(kind, args, &ctx)?;
        self.contracts.insert(
            address,
            Deployment {
                kind,
                deployer: tx.from,
                constructor_args: args.clone(),
                code_hash: kind.abi().code_hash(),
                block_number,
                state,
            },
        );
        Ok((
            vec![Event::ContractDeployed {
                address,
                contract: kind.name().to_string(),
                deployer: tx.from,
            }],
            Value::String(address.to_string()),
        ))
    }

    fn execute_call(
        &mut self,
        stx: &SignedTransaction,
        to: Address,
        method: &str,
        args: &Value,
        timestamp: u64,
    ) -> Result<(Vec<Event>, Value), Revert> {
        let tx = &stx.tx;
        let deployment = self
            .contracts
            .get(&to)
            .ok_or_else(|| Revert::new(format!("no contract deployed at {to}")))?;
        let abi = deployment.kind.abi();
        let function = abi
            .function(method)
            .ok_or_else(|| Revert::new(format!("unknown method {method}")))?;
        match function.state_mutability {
            StateMutability::View => {
                return Err(Revert::new(format!("{method} is read-only")));
            }
            StateMutability::NonPayable if tx.value != 0 => {
                return Err(Revert::new(format!("{method} is not payable")));
            }
            _ => {}
        }

        let mut state = deployment.state.clone();
        let mut staged = self.accounts.clone();
        let mut events = Vec::new();
        if tx.value != 0 {
            move_value(&mut staged, &tx.from, &to, tx.value)?;
            events.push(Event::ValueTransferred {
                from: tx.from,
                to,
                amount: tx.value,
            });
        }
        let ctx = CallContext {
            sender: tx.from,
            value: tx.value,
            timestamp,
            this: to,
        };
        let outcome = state.execute(&ctx, method, args)?;
        apply_all(&mut staged, &outcome.mutations).map_err(|e| Revert::new(e.to_string()))?;
        for mutation in &outcome.mutations {
            if let LedgerMutation::Transfer { from, to, amount } = mutation {
                events.push(Event::ValueTransferred {
                    from: *from,
                    to: *to,
                    amount: *amount,
                });
            }
        }
        events.extend(outcome.events);

        self.accounts = staged;
        if let Some(deployment) = self.contracts.get_mut(&to) {
            deployment.state = state;
        }
        Ok((events, outcome.output))
    }

    fn seal_block(&mut self, timestamp: u64, transactions: Vec<String>) {
        let (number, parent_hash) = match self.blocks.last() {
            Some(parent) => (parent.number + 1, parent.hash),
            None => (0, [0u8; 32]),
        };
        let state_root = self.state_root();
        let mut hasher = Sha256::new();
        hasher.update(b"block");
        hasher.update(number.to_le_bytes());
        hasher.update(timestamp.to_le_bytes());
        hasher.update(parent_hash);
        for tx in &transactions {
            hasher.update(tx.as_bytes());
        }
        hasher.update(state_root);
        self.blocks.push(BlockHeader {
            number,
            timestamp,
            parent_hash,
            transactions,
            state_root,
            hash: hasher.finalize().into(),
        });
    }
}

fn credit(
    accounts: &mut BTreeMap<Address, AccountState>,
    account: &Address,
    amount: Amount,
) -> Result<(), LedgerError> {
    let state = accounts.entry(*account).or_default();
    state.balance = state
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow { account: *account })?;
    Ok(())
}

fn debit(
    accounts: &mut BTreeMap<Address, AccountState>,
    account: &Address,
    amount: Amount,
) -> Result<(), LedgerError> {
    let state = accounts
        .get_mut(account)
        .ok_or(LedgerError::UnknownAccount { account: *account })?;
    if state.balance < amount {
        return Err(LedgerError::InsufficientFunds {
            account: *account,
            balance: state.balance,
            needed: amount,
        });
    }
    state.balance -= amount;
    Ok(())
}

fn apply_all(
    accounts: &mut BTreeMap<Address, AccountState>,
    mutations: &[LedgerMutation],
) -> Result<(), LedgerError> {
    for mutation in mutations {
        match mutation {
            LedgerMutation::Transfer { from, to, amount } => {
                debit(accounts, from, *amount)?;
                credit(accounts, to, *amount)?;
            }
        }
    }
    Ok(())
}

fn move_value(
    accounts: &mut BTreeMap<Address, AccountState>,
    from: &Address,
    to: &Address,
    amount: Amount,
) -> Result<(), Revert> {
    debit(accounts, from, amount).map_err(|e| Revert::new(e.to_string()))?;
    credit(accounts, to, amount).map_err(|e| Revert::new(e.to_string()))
}

/// Constructor arguments compare equal when both are "empty" or both decode
/// to the same JSON value.
fn same_args(a: &Value, b: &Value) -> bool {
    let empty = |v: &Value| match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    (empty(a) && empty(b)) || a == b
}

fn compute_merkle_root(
    accounts: &BTreeMap<Address, AccountState>,
    contracts: &BTreeMap<Address, Deployment>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, state) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(account.as_bytes());
        hasher.update(state.balance.to_le_bytes());
        hasher.update(state.nonce.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (address, deployment) in contracts {
        let mut hasher = Sha256::new();
        hasher.update(b"contract");
        hasher.update(address.as_bytes());
        hasher.update(deployment.code_hash);
        // Contract state only holds strings, integers and maps, so encoding cannot fail.
        if let Ok(encoded) = serde_json::to_vec(&deployment.state) {
            hasher.update(encoded);
        }
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"crowdledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests;
