//! Worker-exposed RPC surface. The master drives a worker's lifecycle with
//! exactly two calls, `run` and `stop`; each is delivered to the runner as a
//! [`RemoteCommand`] over an mpsc channel so the waiting side blocks on the
//! channel instead of polling.

use anyhow::{anyhow, Context, Result};
use jsonrpsee::server::{RpcModule, Server, ServerHandle};
use std::net::SocketAddr;
use tokio::sync::mpsc;

const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Lifecycle command issued by the master through the worker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Run,
    Stop,
}

pub type CommandSender = mpsc::Sender<RemoteCommand>;
pub type CommandReceiver = mpsc::Receiver<RemoteCommand>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(COMMAND_CHANNEL_CAPACITY)
}

/// Bound JSON-RPC server answering the master's `run`/`stop` calls.
pub struct WorkerEndpoint {
    local_addr: SocketAddr,
    handle: ServerHandle,
}

impl WorkerEndpoint {
    pub async fn bind(bind_addr: &str, commands: CommandSender) -> Result<Self> {
        let addr: SocketAddr = bind_addr
            .parse()
            .with_context(|| format!("invalid worker endpoint address {bind_addr:?}"))?;
        let server = Server::builder()
            .build(addr)
            .await
            .with_context(|| format!("failed to bind worker RPC endpoint on {bind_addr}"))?;
        let local_addr = server
            .local_addr()
            .context("failed to read worker endpoint address")?;

        let mut module = RpcModule::new(commands);
        module
            .register_async_method("run", |_params, commands, _ext| async move {
                tracing::info!("remote run command received");
                commands.send(RemoteCommand::Run).await.is_ok()
            })
            .map_err(|err| anyhow!("failed to register run method: {err}"))?;
        module
            .register_async_method("stop", |_params, commands, _ext| async move {
                tracing::info!("remote stop command received");
                commands.send(RemoteCommand::Stop).await.is_ok()
            })
            .map_err(|err| anyhow!("failed to register stop method: {err}"))?;

        let handle = server.start(module);
        tracing::info!(addr = %local_addr, "worker RPC endpoint bound");

        Ok(Self { local_addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Releases the endpoint and waits for the server task to finish.
    pub async fn shutdown(self) {
        if self.handle.stop().is_err() {
            tracing::debug!("worker RPC endpoint was already stopping");
        }
        self.handle.stopped().await;
        tracing::info!("worker RPC endpoint released");
    }
}
