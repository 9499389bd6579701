//! Coordinator backend client.

use super::{rpc::is_unreachable, BackendOps};
use crate::actor::Actor;
use crate::Error;
use async_trait::async_trait;

/// Status endpoint polled for coordinator readiness.
const STATUS_PATH: &str = "api/v4/btc/blockchain/status";

/// HTTP probe against the coordinator's status endpoint.
pub struct BackendClient {
    http: reqwest::Client,
    url: String,
}

impl BackendClient {
    pub fn new(http: reqwest::Client, actor: &Actor) -> Self {
        Self {
            http,
            url: format!("http://{}/{}", actor.endpoint, STATUS_PATH),
        }
    }
}

#[async_trait]
impl BackendOps for BackendClient {
    async fn ready(&self) -> Result<bool, Error> {
        match self.http.get(&self.url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(err) if is_unreachable(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
