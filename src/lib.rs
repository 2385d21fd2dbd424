//! Host side of crowdledger: the development node, the transports that
//! reach it, the client data gateway and the one-shot deployment pipeline.
//!
//! Ledger rules live in [`crowdledger_core`]; this crate only moves requests
//! and artifacts around.

pub mod artifacts;
pub mod client;
pub mod config;
pub mod deploy;
pub mod gateway;
pub mod logging;
pub mod node;
pub mod server;
pub mod transport;
pub mod verify;

pub use client::{RpcClient, RpcClientError};
pub use gateway::{CampaignGateway, GatewayError, NewCampaign};
pub use node::{Node, SharedNode};
pub use transport::{HttpTransport, LocalTransport, Transport};
