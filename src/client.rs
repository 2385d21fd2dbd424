//! Typed JSON-RPC client.

use std::sync::atomic::{AtomicU64, Ordering};

use crowdledger_core::ledger::BlockHeader;
use crowdledger_core::rpc::{self, CallRequest, RpcRequest};
use crowdledger_core::tx::{hash_hex, Receipt, SignedTransaction, Transaction, TxAction, TxHash};
use crowdledger_core::{Address, Amount, Keypair};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("cannot decode {method} result: {reason}")]
    Decode { method: String, reason: String },
    #[error("cannot encode request: {0}")]
    Encode(String),
}

impl RpcClientError {
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub struct RpcClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RpcClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        let response = self.transport.send(&request)?;
        if let Some(err) = response.error {
            debug!(method, code = err.code, message = %err.message, "rpc error");
            return Err(RpcClientError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| RpcClientError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn chain_id(&self) -> Result<u64, RpcClientError> {
        self.request(rpc::CHAIN_ID, Value::Null)
    }

    pub fn block_number(&self) -> Result<u64, RpcClientError> {
        self.request(rpc::BLOCK_NUMBER, Value::Null)
    }

    pub fn block(&self, number: u64) -> Result<BlockHeader, RpcClientError> {
        self.request(rpc::GET_BLOCK, json!([number]))
    }

    /// Timestamp of the current head block.
    pub fn head_timestamp(&self) -> Result<u64, RpcClientError> {
        let head = self.block_number()?;
        Ok(self.block(head)?.timestamp)
    }

    pub fn balance(&self, account: &Address) -> Result<Amount, RpcClientError> {
        let text: String = self.request(rpc::GET_BALANCE, json!([account]))?;
        text.parse().map_err(|e: std::num::ParseIntError| RpcClientError::Decode {
            method: rpc::GET_BALANCE.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn nonce(&self, account: &Address) -> Result<u64, RpcClientError> {
        self.request(rpc::GET_NONCE, json!([account]))
    }

    pub fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, RpcClientError> {
        self.request(rpc::GET_RECEIPT, json!([hash_hex(hash)]))
    }

    pub fn code(&self, address: &Address) -> Result<Option<Value>, RpcClientError> {
        self.request(rpc::GET_CODE, json!([address]))
    }

    pub fn call<R: DeserializeOwned>(&self, to: &Address, method: &str, args: Value) -> Result<R, RpcClientError> {
        let call = CallRequest {
            to: *to,
            method: method.to_string(),
            args,
        };
        self.request(rpc::CALL, json!([call]))
    }

    pub fn send_transaction(&self, stx: &SignedTransaction) -> Result<Receipt, RpcClientError> {
        self.request(rpc::SEND_TRANSACTION, json!([stx]))
    }

    /// Fill in chain id and nonce, sign with `key` and submit.
    pub fn submit(&self, key: &Keypair, value: Amount, action: TxAction) -> Result<Receipt, RpcClientError> {
        let from = key.address();
        let tx = Transaction {
            chain_id: self.chain_id()?,
            from,
            nonce: self.nonce(&from)?,
            value,
            action,
        };
        let stx = tx.sign(key).map_err(|e| RpcClientError::Encode(e.to_string()))?;
        let receipt = self.send_transaction(&stx)?;
        debug!(
            tx = %hash_hex(&receipt.tx_hash),
            block = receipt.block_number,
            success = receipt.is_success(),
            "transaction mined"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::node::{ManualClock, Node};
    use crate::transport::LocalTransport;
    use crowdledger_core::ledger::Genesis;
    use crowdledger_core::rpc::codes;

    fn client_with(key: &Keypair, funds: Amount) -> RpcClient<LocalTransport> {
        let node = Node::new(
            &Genesis::new(99).fund(key.address(), funds),
            Arc::new(ManualClock::new(100)),
        )
        .into_shared();
        RpcClient::new(LocalTransport::new(node))
    }

    #[test]
    fn submit_fills_nonce_and_chain() {
        let alice = Keypair::generate();
        let bob = Keypair::generate().address();
        let client = client_with(&alice, 1_000);
        for expected_block in 1..=2 {
            let receipt = client
                .submit(&alice, 10, TxAction::Transfer { to: bob })
                .unwrap();
            assert_eq!(receipt.block_number, expected_block);
        }
        assert_eq!(client.nonce(&alice.address()).unwrap(), 2);
        assert_eq!(client.balance(&bob).unwrap(), 20);
        assert_eq!(client.chain_id().unwrap(), 99);
        assert_eq!(client.head_timestamp().unwrap(), 100);
    }

    #[test]
    fn rpc_errors_keep_their_code() {
        let alice = Keypair::generate();
        let client = client_with(&alice, 1);
        let err = client
            .submit(&alice, 10, TxAction::Transfer { to: Address::ZERO })
            .unwrap_err();
        assert_eq!(err.code(), Some(codes::INSUFFICIENT_FUNDS));
    }

    #[test]
    fn missing_receipt_is_none() {
        let alice = Keypair::generate();
        let client = client_with(&alice, 1);
        assert_eq!(client.receipt(&[3u8; 32]).unwrap(), None);
        assert_eq!(client.code(&Address::ZERO).unwrap(), None);
    }
}
