//! Core primitives for the crowdledger stack.
//!
//! The crate holds everything that has to agree bit-for-bit between the node
//! and its clients:
//!
//! * [`units`]: fixed-point currency amounts and their wire encoding.
//! * [`crypto`]: ed25519 keypairs and the [`Address`] type derived from them.
//! * [`tx`]: signed transactions, receipts and contract events.
//! * [`abi`]: machine-readable descriptions of the deployable contracts.
//! * [`contracts`]: `CampaignManager` and `GasLot`.
//! * [`ledger`]: the state machine that admits transactions and mines blocks.
//! * [`rpc`]: JSON-RPC 2.0 envelopes and the request dispatcher.
//!
//! Higher level crates (the node server, the deployment tool, the client
//! gateway) only move these types around; none of them re-implement ledger
//! rules.

pub mod abi;
pub mod contracts;
pub mod crypto;
pub mod ledger;
pub mod rpc;
pub mod tx;
pub mod units;

mod error;

pub use crypto::{Address, Keypair};
pub use error::CoreError;
pub use units::Amount;
