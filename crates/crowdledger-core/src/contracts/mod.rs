//! Contracts hosted by the ledger.
//!
//! A contract never touches balances directly: a successful call returns an
//! [`Outcome`] whose mutations the ledger applies atomically together with
//! the contract's new state.

pub mod campaign_manager;
pub mod gas_lot;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abi::ContractAbi;
use crate::crypto::Address;
use crate::ledger::LedgerMutation;
use crate::tx::Event;
use crate::units::Amount;

pub use campaign_manager::{Campaign, CampaignManager, Donation};
pub use gas_lot::GasLot;

/// Execution environment of a state-changing call.
#[derive(Clone, Debug)]
pub struct CallContext {
    pub sender: Address,
    pub value: Amount,
    pub timestamp: u64,
    pub this: Address,
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub output: Value,
    pub mutations: Vec<LedgerMutation>,
    pub events: Vec<Event>,
}

impl Outcome {
    pub fn returning<T: Serialize>(value: T) -> Result<Self, Revert> {
        Ok(Self {
            output: encode(value)?,
            ..Self::default()
        })
    }
}

/// Contract-level failure. The transaction is still mined but has no effect.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Revert(pub String);

impl Revert {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    CampaignManager,
    GasLot,
}

impl ContractKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            campaign_manager::NAME => Some(Self::CampaignManager),
            gas_lot::NAME => Some(Self::GasLot),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CampaignManager => campaign_manager::NAME,
            Self::GasLot => gas_lot::NAME,
        }
    }

    pub fn abi(&self) -> ContractAbi {
        match self {
            Self::CampaignManager => campaign_manager::abi(),
            Self::GasLot => gas_lot::abi(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "contract", rename_all = "snake_case")]
pub enum ContractState {
    CampaignManager(CampaignManager),
    GasLot(GasLot),
}

impl ContractState {
    pub fn instantiate(kind: ContractKind, args: &Value, ctx: &CallContext) -> Result<Self, Revert> {
        match kind {
            ContractKind::CampaignManager => {
                CampaignManager::construct(args, ctx).map(Self::CampaignManager)
            }
            ContractKind::GasLot => GasLot::construct(args, ctx).map(Self::GasLot),
        }
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            Self::CampaignManager(_) => ContractKind::CampaignManager,
            Self::GasLot(_) => ContractKind::GasLot,
        }
    }

    pub fn execute(&mut self, ctx: &CallContext, method: &str, args: &Value) -> Result<Outcome, Revert> {
        match self {
            Self::CampaignManager(c) => c.execute(ctx, method, args),
            Self::GasLot(c) => c.execute(ctx, method, args),
        }
    }

    pub fn query(&self, method: &str, args: &Value) -> Result<Value, Revert> {
        match self {
            Self::CampaignManager(c) => c.query(method, args),
            Self::GasLot(c) => c.query(method, args),
        }
    }
}

pub(crate) fn decode_args<T: DeserializeOwned>(method: &str, args: &Value) -> Result<T, Revert> {
    serde_json::from_value(args.clone())
        .map_err(|e| Revert::new(format!("invalid arguments for {method}: {e}")))
}

pub(crate) fn encode<T: Serialize>(value: T) -> Result<Value, Revert> {
    serde_json::to_value(value).map_err(|e| Revert::new(format!("cannot encode output: {e}")))
}

pub(crate) fn expect_no_args(what: &str, args: &Value) -> Result<(), Revert> {
    match args {
        Value::Null => Ok(()),
        Value::Object(map) if map.is_empty() => Ok(()),
        Value::Array(items) if items.is_empty() => Ok(()),
        _ => Err(Revert::new(format!("{what} takes no arguments"))),
    }
}
