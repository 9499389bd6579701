//! Wallet client (distributor and participants).

use super::{rpc::JsonRpcClient, WalletOps};
use crate::actor::Actor;
use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Name of the single wallet each client daemon manages.
const WALLET_NAME: &str = "wallet";

/// JSON-RPC client for a wallet daemon.
pub struct WalletClient {
    rpc: JsonRpcClient,
}

impl WalletClient {
    pub fn new(http: reqwest::Client, actor: &Actor) -> Self {
        let url = format!("http://{}/", actor.endpoint);
        Self {
            rpc: JsonRpcClient::new(http, &actor.name, url),
        }
    }
}

#[async_trait]
impl WalletOps for WalletClient {
    async fn create_wallet(&self) -> Result<(), Error> {
        match self
            .rpc
            .call("createwallet", json!([WALLET_NAME, ""]))
            .await
        {
            Ok(_) => Ok(()),
            // Wallet creation survives a restarted daemon.
            Err(Error::Rpc { message, .. }) if message.contains("already exists") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn wallet_loaded(&self) -> Result<bool, Error> {
        self.rpc.probe("getwalletinfo", json!([])).await
    }

    async fn get_new_address(&self) -> Result<String, Error> {
        let result = self
            .rpc
            .call("getnewaddress", json!(["funding"]))
            .await?;
        result
            .get("address")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Rpc {
                actor: self.rpc.actor().to_string(),
                message: "getnewaddress returned no address".to_string(),
            })
    }

    async fn get_balance(&self) -> Result<u64, Error> {
        let coins = self.list_unspent_coins().await?;
        let total = coins
            .as_array()
            .map(|coins| {
                coins
                    .iter()
                    .filter_map(|coin| coin.get("amount").and_then(Value::as_u64))
                    .sum()
            })
            .unwrap_or(0);
        Ok(total)
    }

    async fn send(&self, addressed_amounts: &[(String, u64)]) -> Result<(), Error> {
        let payments: Vec<Value> = addressed_amounts
            .iter()
            .map(|(address, sats)| {
                json!({
                    "sendto": address,
                    "amount": sats,
                    "label": "funding",
                })
            })
            .collect();
        self.rpc
            .call(
                "send",
                json!({
                    "payments": payments,
                    "coins": [],
                    "feeTarget": 2,
                    "password": "",
                }),
            )
            .await?;
        Ok(())
    }

    async fn start_coinjoin(&self) -> Result<(), Error> {
        self.rpc
            .call("startcoinjoin", json!(["", "True", "True"]))
            .await?;
        Ok(())
    }

    async fn list_coins(&self) -> Result<Value, Error> {
        self.rpc.call("listcoins", json!([])).await
    }

    async fn list_unspent_coins(&self) -> Result<Value, Error> {
        self.rpc.call("listunspentcoins", json!([])).await
    }

    async fn list_keys(&self) -> Result<Value, Error> {
        self.rpc.call("listkeys", json!([])).await
    }
}
