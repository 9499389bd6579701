//! Thin protocol clients for the externally running actors.
//!
//! Each trait mirrors the subset of the actor's protocol the orchestrator
//! consumes. The `ready`/`wallet_loaded` probes convert "not reachable yet"
//! into `Ok(false)` so readiness can be polled; every other operation
//! propagates transport and protocol faults as fatal.

use crate::actor::Actor;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

mod backend;
mod node;
mod rpc;
mod wallet;

pub use backend::BackendClient;
pub use node::NodeClient;
pub use rpc::JsonRpcClient;
pub(crate) use rpc::is_unreachable;
pub use wallet::WalletClient;

/// The regtest blockchain node.
#[async_trait]
pub trait NodeOps: Send + Sync {
    /// Whether the node answers RPC yet.
    async fn ready(&self) -> Result<bool, Error>;
    /// Sends `sats` from the node's own wallet to `address`.
    async fn fund_address(&self, address: &str, sats: u64) -> Result<(), Error>;
    async fn mine_block(&self) -> Result<(), Error>;
    async fn get_block_count(&self) -> Result<u64, Error>;
    async fn get_block_hash(&self, height: u64) -> Result<String, Error>;
    async fn get_block_info(&self, hash: &str) -> Result<Value, Error>;
}

/// The coordinator backend.
#[async_trait]
pub trait BackendOps: Send + Sync {
    /// Whether the coordinator answers its status endpoint yet.
    async fn ready(&self) -> Result<bool, Error>;
}

/// A wallet client (distributor or participant).
#[async_trait]
pub trait WalletOps: Send + Sync {
    async fn create_wallet(&self) -> Result<(), Error>;
    /// Whether the wallet is created and loaded yet.
    async fn wallet_loaded(&self) -> Result<bool, Error>;
    async fn get_new_address(&self) -> Result<String, Error>;
    /// Confirmed balance in satoshis, observed as the sum of unspent coins.
    async fn get_balance(&self) -> Result<u64, Error>;
    /// Broadcasts one batched transaction paying every `(address, sats)`
    /// destination. Not cancellable once issued.
    async fn send(&self, addressed_amounts: &[(String, u64)]) -> Result<(), Error>;
    async fn start_coinjoin(&self) -> Result<(), Error>;
    async fn list_coins(&self) -> Result<Value, Error>;
    async fn list_unspent_coins(&self) -> Result<Value, Error>;
    async fn list_keys(&self) -> Result<Value, Error>;
}

/// Builds protocol clients for registered actors. Tests substitute a stub
/// layer; production connects over HTTP to the actor's mapped host port.
pub trait Connector: Send + Sync {
    fn node(&self, actor: &Actor) -> Arc<dyn NodeOps>;
    fn backend(&self, actor: &Actor) -> Arc<dyn BackendOps>;
    fn wallet(&self, actor: &Actor) -> Arc<dyn WalletOps>;
}

/// [`Connector`] backed by JSON-RPC and HTTP over reqwest.
#[derive(Default, Clone)]
pub struct RpcConnector {
    http: reqwest::Client,
}

impl Connector for RpcConnector {
    fn node(&self, actor: &Actor) -> Arc<dyn NodeOps> {
        Arc::new(NodeClient::new(self.http.clone(), actor))
    }

    fn backend(&self, actor: &Actor) -> Arc<dyn BackendOps> {
        Arc::new(BackendClient::new(self.http.clone(), actor))
    }

    fn wallet(&self, actor: &Actor) -> Arc<dyn WalletOps> {
        Arc::new(WalletClient::new(self.http.clone(), actor))
    }
}
