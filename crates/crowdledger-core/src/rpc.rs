//! JSON-RPC 2.0 envelopes and the dispatcher that maps requests onto a
//! [`LedgerState`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::{decode_fixed, Address};
use crate::ledger::{LedgerError, LedgerState};
use crate::tx::SignedTransaction;

pub const JSONRPC_VERSION: &str = "2.0";

pub const CHAIN_ID: &str = "chain_chainId";
pub const BLOCK_NUMBER: &str = "chain_blockNumber";
pub const GET_BLOCK: &str = "chain_getBlock";
pub const GET_BALANCE: &str = "chain_getBalance";
pub const GET_NONCE: &str = "chain_getNonce";
pub const SEND_TRANSACTION: &str = "chain_sendTransaction";
pub const GET_RECEIPT: &str = "chain_getReceipt";
pub const CALL: &str = "chain_call";
pub const GET_CODE: &str = "chain_getCode";
pub const DEV_MINE: &str = "dev_mine";

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const TRANSACTION_REJECTED: i64 = -32000;
    pub const INSUFFICIENT_FUNDS: i64 = -32001;
    pub const NONCE_MISMATCH: i64 = -32002;
    pub const EXECUTION_REVERTED: i64 = -32003;
    pub const UNKNOWN_CONTRACT: i64 = -32004;
}

/// Request id: JSON-RPC allows numbers and strings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Id,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Id::Number(id),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn ok(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<Id>, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Parameters of [`CALL`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CallRequest {
    pub to: Address,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

fn error(code: i64, message: impl Into<String>) -> RpcErrorObject {
    RpcErrorObject {
        code,
        message: message.into(),
        data: None,
    }
}

impl From<LedgerError> for RpcErrorObject {
    fn from(err: LedgerError) -> Self {
        let code = match &err {
            LedgerError::InsufficientFunds { .. } => codes::INSUFFICIENT_FUNDS,
            LedgerError::NonceMismatch { .. } => codes::NONCE_MISMATCH,
            LedgerError::Reverted(_) => codes::EXECUTION_REVERTED,
            LedgerError::UnknownContract { .. } => codes::UNKNOWN_CONTRACT,
            LedgerError::UnknownBlock(_) => codes::INVALID_PARAMS,
            _ => codes::TRANSACTION_REJECTED,
        };
        let mut obj = error(code, err.to_string());
        if let LedgerError::InsufficientFunds { balance, needed, .. } = &err {
            obj.data = Some(json!({
                "balance": balance.to_string(),
                "needed": needed.to_string(),
            }));
        }
        obj
    }
}

/// Decode positional parameters given either as `[x]` or bare `x`.
fn single_param<T: DeserializeOwned>(params: &Value) -> Result<T, RpcErrorObject> {
    let value = match params {
        Value::Array(items) if items.len() == 1 => items[0].clone(),
        Value::Array(_) => return Err(error(codes::INVALID_PARAMS, "expected exactly one parameter")),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| error(codes::INVALID_PARAMS, e.to_string()))
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcErrorObject> {
    serde_json::to_value(value).map_err(|e| error(codes::TRANSACTION_REJECTED, e.to_string()))
}

/// Dispatch a request against `ledger`; `now` stamps any block mined.
pub fn dispatch(ledger: &mut LedgerState, now: u64, request: &RpcRequest) -> RpcResponse {
    if request.jsonrpc != JSONRPC_VERSION {
        return RpcResponse::err(
            Some(request.id.clone()),
            error(codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }
    match handle(ledger, now, &request.method, &request.params) {
        Ok(result) => RpcResponse::ok(request.id.clone(), result),
        Err(err) => RpcResponse::err(Some(request.id.clone()), err),
    }
}

/// Decode and dispatch a raw request body.
///
/// Bodies that are not JSON get [`codes::PARSE_ERROR`]; JSON that is not a
/// request gets [`codes::INVALID_REQUEST`], echoing the id when readable.
pub fn dispatch_raw(ledger: &mut LedgerState, now: u64, body: &[u8]) -> RpcResponse {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return RpcResponse::err(None, error(codes::PARSE_ERROR, e.to_string())),
    };
    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<Id>(id.clone()).ok());
    match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => dispatch(ledger, now, &request),
        Err(e) => RpcResponse::err(id, error(codes::INVALID_REQUEST, e.to_string())),
    }
}

fn handle(ledger: &mut LedgerState, now: u64, method: &str, params: &Value) -> Result<Value, RpcErrorObject> {
    match method {
        CHAIN_ID => encode(ledger.chain_id()),
        BLOCK_NUMBER => encode(ledger.height()),
        GET_BLOCK => {
            let number: u64 = single_param(params)?;
            encode(ledger.block(number)?)
        }
        GET_BALANCE => {
            let account: Address = single_param(params)?;
            encode(ledger.balance(&account).to_string())
        }
        GET_NONCE => {
            let account: Address = single_param(params)?;
            encode(ledger.nonce(&account))
        }
        SEND_TRANSACTION => {
            let stx: SignedTransaction = single_param(params)?;
            encode(ledger.submit(&stx, now)?)
        }
        GET_RECEIPT => {
            let hash: String = single_param(params)?;
            let body = hash.strip_prefix("0x").unwrap_or(&hash);
            let hash = decode_fixed::<32>("transaction hash", body)
                .map_err(|e| error(codes::INVALID_PARAMS, e.to_string()))?;
            encode(ledger.receipt(&hash))
        }
        CALL => {
            let call: CallRequest = single_param(params)?;
            Ok(ledger.call_view(&call.to, &call.method, &call.args)?)
        }
        GET_CODE => {
            let address: Address = single_param(params)?;
            encode(ledger.contract(&address).map(|d| {
                json!({
                    "contract": d.kind.name(),
                    "codeHash": format!("0x{}", hex::encode(d.code_hash)),
                    "deployer": d.deployer,
                    "blockNumber": d.block_number,
                })
            }))
        }
        DEV_MINE => encode(ledger.mine_empty(now).number),
        other => Err(error(codes::METHOD_NOT_FOUND, format!("method {other} not found"))),
    }
}
