//! HTTP front of the development node.
//!
//! `POST /` carries JSON-RPC; `POST /api` answers explorer-style
//! verification requests against the node's own deployment records.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crowdledger_core::rpc::{codes, RpcErrorObject, RpcResponse};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

use crate::node::{lock, SharedNode};
use crate::verify::{ExplorerResponse, VerificationRequest};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

pub struct NodeServer {
    server: Arc<Server>,
    node: SharedNode,
    addr: SocketAddr,
}

impl NodeServer {
    pub fn bind(addr: &str, node: SharedNode) -> Result<Self, ServerError> {
        let server = Server::http(addr).map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        let addr = server.server_addr().to_ip().ok_or_else(|| ServerError::Bind {
            addr: addr.to_string(),
            reason: "unable to determine bound address".into(),
        })?;
        Ok(Self {
            server: Arc::new(server),
            node,
            addr,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Serve until the server is unblocked.
    pub fn serve(&self) {
        info!(addr = %self.addr, "node listening");
        for request in self.server.incoming_requests() {
            handle_request(&self.node, request);
        }
    }

    /// Serve on a background thread.
    pub fn spawn(self) -> ServerHandle {
        let server = self.server.clone();
        let addr = self.addr;
        let handle = thread::spawn(move || self.serve());
        ServerHandle {
            server,
            addr,
            handle: Some(handle),
        }
    }
}

pub struct ServerHandle {
    server: Arc<Server>,
    addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_request(node: &SharedNode, mut request: Request) {
    let path = request.url().split('?').next().unwrap_or("/").to_string();
    debug!(method = %request.method(), %path, "http request");

    if request.method() != &Method::Post {
        respond_json(request, 405, &RpcResponse::err(None, rpc_error(codes::INVALID_REQUEST, "use POST")));
        return;
    }

    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        warn!(error = %e, "failed to read request body");
        respond_json(request, 400, &RpcResponse::err(None, rpc_error(codes::PARSE_ERROR, e.to_string())));
        return;
    }

    match path.as_str() {
        "/" | "/rpc" => {
            let response = lock(node).handle_raw(&body);
            respond_json(request, 200, &response);
        }
        "/api" => {
            let reply = match serde_json::from_slice::<VerificationRequest>(&body) {
                Ok(req) => lock(node).verify_source(&req),
                Err(e) => ExplorerResponse::error(format!("malformed request: {e}")),
            };
            respond_json(request, 200, &reply);
        }
        _ => respond_json(
            request,
            404,
            &RpcResponse::err(None, rpc_error(codes::METHOD_NOT_FOUND, format!("no route {path}"))),
        ),
    }
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcErrorObject {
    RpcErrorObject {
        code,
        message: message.into(),
        data: None,
    }
}

fn respond_json<T: Serialize>(request: Request, status: u16, body: &T) {
    let text = match serde_json::to_string(body) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode response");
            return;
        }
    };
    let mut response = Response::from_string(text).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!(error = %e, "failed to write response");
    }
}
