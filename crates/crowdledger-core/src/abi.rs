//! Machine-readable contract interfaces.
//!
//! The ledger consults these to reject calls to unknown or read-only
//! methods, the deployment tool persists them for clients, and the code hash
//! derived from them is what explorer verification compares.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever contract semantics change without an interface change.
pub const CONTRACT_REVISION: u32 = 1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    View,
    NonPayable,
    Payable,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    #[serde(rename = "stateMutability")]
    pub state_mutability: StateMutability,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbiEvent {
    pub name: String,
    pub fields: Vec<AbiParam>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractAbi {
    #[serde(rename = "contractName")]
    pub contract_name: String,
    pub constructor: Vec<AbiParam>,
    pub functions: Vec<AbiFunction>,
    pub events: Vec<AbiEvent>,
}

impl ContractAbi {
    pub fn function(&self, name: &str) -> Option<&AbiFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Digest standing in for deployed bytecode.
    pub fn code_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"crowdledger-code");
        hasher.update(CONTRACT_REVISION.to_le_bytes());
        hasher.update(self.contract_name.as_bytes());
        for f in &self.functions {
            hasher.update(f.name.as_bytes());
            for p in f.inputs.iter().chain(f.outputs.iter()) {
                hasher.update(p.name.as_bytes());
                hasher.update(p.kind.as_bytes());
            }
            hasher.update([f.state_mutability as u8]);
        }
        for p in &self.constructor {
            hasher.update(p.name.as_bytes());
            hasher.update(p.kind.as_bytes());
        }
        hasher.finalize().into()
    }

    pub fn code_hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.code_hash()))
    }
}

pub(crate) fn param(name: &str, kind: &str) -> AbiParam {
    AbiParam {
        name: name.to_string(),
        kind: kind.to_string(),
    }
}

pub(crate) fn function(
    name: &str,
    inputs: Vec<AbiParam>,
    outputs: Vec<AbiParam>,
    state_mutability: StateMutability,
) -> AbiFunction {
    AbiFunction {
        name: name.to_string(),
        inputs,
        outputs,
        state_mutability,
    }
}

pub(crate) fn event(name: &str, fields: Vec<AbiParam>) -> AbiEvent {
    AbiEvent {
        name: name.to_string(),
        fields,
    }
}
