//! Scriptable in-process master controller backed by a jsonrpsee server.
//! Exposes the four master-side operations (`ready`, `get_nodes`,
//! `complete`, `require`) and records everything the worker sends.

use anyhow::{Context, Result};
use jsonrpsee::server::{RpcModule, Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct MasterState {
    pub nodes: Vec<String>,
    pub default_grant: u32,
    /// Scripted grants consumed front-first; `default_grant` afterwards.
    pub grants: Mutex<VecDeque<u32>>,
    /// `complete` answers "stop" once this many items have been reported.
    pub stop_after_completions: Option<u64>,
    pub ready_nodes: Mutex<Vec<String>>,
    pub completed: Mutex<Vec<String>>,
    pub require_calls: AtomicU64,
}

impl MasterState {
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            default_grant: 10,
            grants: Mutex::new(VecDeque::new()),
            stop_after_completions: None,
            ready_nodes: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            require_calls: AtomicU64::new(0),
        }
    }

    pub fn require_calls(&self) -> u64 {
        self.require_calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn ready_nodes(&self) -> Vec<String> {
        self.ready_nodes.lock().unwrap().clone()
    }
}

pub struct MockMaster {
    pub state: Arc<MasterState>,
    addr: SocketAddr,
    handle: ServerHandle,
}

impl MockMaster {
    pub async fn start(state: MasterState) -> Result<Self> {
        let state = Arc::new(state);
        let server = Server::builder()
            .build("127.0.0.1:0".parse::<SocketAddr>().expect("valid addr"))
            .await
            .context("failed to bind mock master")?;
        let addr = server
            .local_addr()
            .context("failed to read mock master address")?;

        let mut module = RpcModule::new(state.clone());
        module
            .register_async_method("ready", |params, state, _ext| async move {
                let node: String = params.one()?;
                state.ready_nodes.lock().unwrap().push(node);
                Ok::<_, ErrorObjectOwned>(true)
            })
            .context("failed to register ready")?;
        module
            .register_async_method("get_nodes", |_params, state, _ext| async move {
                Ok::<_, ErrorObjectOwned>(state.nodes.clone())
            })
            .context("failed to register get_nodes")?;
        module
            .register_async_method("complete", |params, state, _ext| async move {
                let item: String = params.one()?;
                let reported = {
                    let mut completed = state.completed.lock().unwrap();
                    completed.push(item);
                    completed.len() as u64
                };
                let stop = state
                    .stop_after_completions
                    .map(|limit| reported >= limit)
                    .unwrap_or(false);
                Ok::<_, ErrorObjectOwned>(stop)
            })
            .context("failed to register complete")?;
        module
            .register_async_method("require", |params, state, _ext| async move {
                let requested: u32 = params.one()?;
                state.require_calls.fetch_add(1, Ordering::SeqCst);
                let grant = state
                    .grants
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(state.default_grant);
                Ok::<_, ErrorObjectOwned>(grant.min(requested))
            })
            .context("failed to register require")?;

        let handle = server.start(module);
        Ok(Self {
            state,
            addr,
            handle,
        })
    }

    /// Address in the `host:port` form the worker configuration expects.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    pub async fn shutdown(self) {
        let _ = self.handle.stop();
        self.handle.stopped().await;
    }
}
