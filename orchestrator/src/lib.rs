//! Orchestrate reproducible coinjoin simulations across containerized actors.
//!
//! A simulation run provisions a regtest bitcoin node, a coordinator backend,
//! and one wallet client per entry in the scenario's funding plan, fans funds
//! out through a distributor wallet, drives the clients through mixing rounds,
//! snapshots every actor's state, and releases all provisioned resources.
//!
//! The run is a strict phase sequence owned by [`run::Orchestrator`]. Artifact
//! collection and teardown execute on every exit path (success, fatal error,
//! or Ctrl-C), exactly once per run.

use std::time::Duration;
use thiserror::Error;

pub mod actor;
pub mod clients;
pub mod collect;
pub mod context;
pub mod poller;
pub mod provision;
pub mod run;
pub mod scenario;
pub mod teardown;

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Errors raised by the orchestrator.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed scenario: {0}")]
    Scenario(#[from] serde_json::Error),
    #[error("rpc fault from {actor}: {message}")]
    Rpc { actor: String, message: String },
    #[error("provisioning failed: {0}")]
    Provision(String),
    #[error("{0} is not provisioned")]
    NotProvisioned(&'static str),
    #[error("convergence timed out after {0:?}")]
    ConvergenceTimeout(Duration),
    #[error("interrupted")]
    Interrupted,
}
