//! Shared JSON-RPC 2.0 plumbing for the node and wallet protocols.

use crate::Error;
use serde_json::{json, Value};

/// One JSON-RPC endpoint belonging to a named actor.
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    actor: String,
    auth: Option<(String, String)>,
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, actor: &str, url: String) -> Self {
        Self {
            http,
            url,
            actor: actor.to_string(),
            auth: None,
        }
    }

    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        self.auth = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Issues one call, surfacing a protocol-level error object as
    /// [`Error::Rpc`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "method": method,
            "params": params,
        });
        let mut request = self.http.post(&self.url).json(&body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }
        let response: Value = request.send().await?.json().await?;
        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(Error::Rpc {
                actor: self.actor.clone(),
                message: error.to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Like [`Self::call`], but reads "not reachable yet" and "not serving
    /// this method yet" (still warming up, wallet not loaded) as `Ok(false)`.
    /// Used only for readiness probes.
    pub async fn probe(&self, method: &str, params: Value) -> Result<bool, Error> {
        match self.call(method, params).await {
            Ok(_) => Ok(true),
            Err(Error::Rpc { .. }) => Ok(false),
            Err(Error::Http(err)) if is_unreachable(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Whether a transport error means the actor has not come up yet.
pub(crate) fn is_unreachable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}
