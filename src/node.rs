//! In-process development node: a [`LedgerState`] plus the clock that stamps
//! its blocks, shared between the HTTP server and the interval miner.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crowdledger_core::ledger::{Genesis, LedgerState};
use crowdledger_core::rpc::{self, RpcRequest, RpcResponse};
use serde_json::Value;
use tracing::{debug, info};

use crate::verify::{ExplorerResponse, VerificationRequest};

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock driven by hand, for tests and scripted demos.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Node {
    ledger: LedgerState,
    clock: Arc<dyn Clock>,
}

pub type SharedNode = Arc<Mutex<Node>>;

impl Node {
    pub fn new(genesis: &Genesis, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: LedgerState::new(genesis),
            clock,
        }
    }

    pub fn into_shared(self) -> SharedNode {
        Arc::new(Mutex::new(self))
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn handle(&mut self, request: &RpcRequest) -> RpcResponse {
        let now = self.clock.now();
        debug!(method = %request.method, id = %request.id, "rpc request");
        rpc::dispatch(&mut self.ledger, now, request)
    }

    pub fn handle_raw(&mut self, body: &[u8]) -> RpcResponse {
        let now = self.clock.now();
        rpc::dispatch_raw(&mut self.ledger, now, body)
    }

    /// Mine an empty block, returning its number.
    pub fn mine(&mut self) -> u64 {
        let now = self.clock.now();
        self.ledger.mine_empty(now).number
    }

    /// Explorer-style verification against the local deployment records.
    pub fn verify_source(&self, request: &VerificationRequest) -> ExplorerResponse {
        let body = request.code_hash.strip_prefix("0x").unwrap_or(&request.code_hash);
        let code_hash: [u8; 32] = match hex::decode(body).ok().and_then(|b| b.try_into().ok()) {
            Some(hash) => hash,
            None => return ExplorerResponse::error("malformed code hash"),
        };
        match self.ledger.verify_source(
            &request.contract_address,
            &request.contract_name,
            &code_hash,
            &request.constructor_arguments,
        ) {
            Ok(()) => ExplorerResponse::ok(Value::String(format!(
                "{} verified at {}",
                request.contract_name, request.contract_address
            ))),
            Err(e) => ExplorerResponse::error(e.to_string()),
        }
    }
}

/// Lock the node, recovering from a poisoned mutex: every ledger mutation
/// either completes or leaves state untouched, so the inner value is sound.
pub fn lock(node: &SharedNode) -> MutexGuard<'_, Node> {
    node.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background thread that mines an empty block every `period`.
pub struct IntervalMiner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IntervalMiner {
    pub fn spawn(node: SharedNode, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            info!(period_ms = period.as_millis() as u64, "interval mining enabled");
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(period);
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let number = lock(&node).mine();
                debug!(block = number, "mined empty block");
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IntervalMiner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
