//! How a client reaches a node: over HTTP, or straight into an in-process
//! [`SharedNode`].

use std::time::Duration;

use crowdledger_core::rpc::{RpcRequest, RpcResponse};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use crate::node::{lock, SharedNode};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),
    #[error("node returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

pub trait Transport {
    fn send(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        (**self).send(request)
    }
}

pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Dispatches straight into a node living in the same process.
#[derive(Clone)]
pub struct LocalTransport {
    node: SharedNode,
}

impl LocalTransport {
    pub fn new(node: SharedNode) -> Self {
        Self { node }
    }
}

impl Transport for LocalTransport {
    fn send(&self, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        Ok(lock(&self.node).handle(request))
    }
}
