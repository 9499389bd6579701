//! Regtest bitcoin node client.

use super::{rpc::JsonRpcClient, NodeOps};
use crate::actor::Actor;
use crate::{Error, SATS_PER_BTC};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Regtest RPC credentials baked into the node image.
const RPC_USER: &str = "rpcuser";
const RPC_PASSWORD: &str = "rpcpassword";

/// JSON-RPC client for the regtest node's wallet-enabled endpoint.
pub struct NodeClient {
    rpc: JsonRpcClient,
}

impl NodeClient {
    pub fn new(http: reqwest::Client, actor: &Actor) -> Self {
        let url = format!("http://{}/", actor.endpoint);
        Self {
            rpc: JsonRpcClient::new(http, &actor.name, url)
                .with_basic_auth(RPC_USER, RPC_PASSWORD),
        }
    }

    fn unexpected(&self, reason: &str) -> Error {
        Error::Rpc {
            actor: self.rpc.actor().to_string(),
            message: reason.to_string(),
        }
    }
}

#[async_trait]
impl NodeOps for NodeClient {
    async fn ready(&self) -> Result<bool, Error> {
        self.rpc.probe("getblockchaininfo", json!([])).await
    }

    async fn fund_address(&self, address: &str, sats: u64) -> Result<(), Error> {
        // The node RPC takes decimal BTC.
        let btc = format!("{:.8}", sats as f64 / SATS_PER_BTC as f64);
        self.rpc
            .call("sendtoaddress", json!([address, btc]))
            .await?;
        Ok(())
    }

    async fn mine_block(&self) -> Result<(), Error> {
        let address = self
            .rpc
            .call("getnewaddress", json!([]))
            .await?
            .as_str()
            .ok_or_else(|| self.unexpected("getnewaddress returned no address"))?
            .to_string();
        self.rpc
            .call("generatetoaddress", json!([1, address]))
            .await?;
        Ok(())
    }

    async fn get_block_count(&self) -> Result<u64, Error> {
        self.rpc
            .call("getblockcount", json!([]))
            .await?
            .as_u64()
            .ok_or_else(|| self.unexpected("getblockcount returned no integer"))
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, Error> {
        Ok(self
            .rpc
            .call("getblockhash", json!([height]))
            .await?
            .as_str()
            .ok_or_else(|| self.unexpected("getblockhash returned no hash"))?
            .to_string())
    }

    async fn get_block_info(&self, hash: &str) -> Result<Value, Error> {
        // Verbosity 2 inlines full transaction data, making the snapshot
        // replayable without further node queries.
        self.rpc.call("getblock", json!([hash, 2])).await
    }
}
