//! Stub actor layer shared by the orchestration tests.

use async_trait::async_trait;
use coinjoin_orchestrator::{
    actor::Actor,
    clients::{BackendOps, Connector, NodeOps, WalletOps},
    context::NetworkContext,
    provision::{Provisioner, RunSpec},
    Error,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the container runtime and every actor protocol.
///
/// Wallet balances live in a shared ledger: `send` and `fund_address` credit
/// the wallet owning each destination address, so funding convergence behaves
/// like the real system without any timing.
#[derive(Clone, Default)]
pub struct StubPlatform {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<String>>,
    running: Mutex<Vec<String>>,
    ledger: Mutex<Ledger>,
    fail_build: Mutex<bool>,
    fail_run: Mutex<Option<String>>,
    fail_archive: Mutex<HashSet<String>>,
    archive: Mutex<Vec<u8>>,
}

#[derive(Default)]
struct Ledger {
    balances: HashMap<String, u64>,
    owners: HashMap<String, String>,
    next_address: u64,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// All provisioner invocations, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn running(&self) -> Vec<String> {
        self.inner.running.lock().unwrap().clone()
    }

    /// Seeds a container as already running (a leftover of a previous run).
    pub fn seed_running(&self, name: &str) {
        self.inner.running.lock().unwrap().push(name.to_string());
    }

    pub fn balance(&self, actor: &str) -> u64 {
        *self
            .inner
            .ledger
            .lock()
            .unwrap()
            .balances
            .get(actor)
            .unwrap_or(&0)
    }

    pub fn fail_build(&self) {
        *self.inner.fail_build.lock().unwrap() = true;
    }

    /// Makes starting the named container fail.
    pub fn fail_run(&self, name: &str) {
        *self.inner.fail_run.lock().unwrap() = Some(name.to_string());
    }

    /// Makes archive retrieval fail for the named actor.
    pub fn fail_archive(&self, name: &str) {
        self.inner
            .fail_archive
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// Tar bytes served for every successful archive retrieval.
    pub fn set_archive(&self, bytes: Vec<u8>) {
        *self.inner.archive.lock().unwrap() = bytes;
    }

    fn record(&self, call: String) {
        self.inner.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Provisioner for StubPlatform {
    async fn build_image(&self, _path: &std::path::Path, tag: &str) -> Result<(), Error> {
        self.record(format!("build {tag}"));
        if *self.inner.fail_build.lock().unwrap() {
            return Err(Error::Provision(format!("build of {tag} failed")));
        }
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<(), Error> {
        self.record(format!("create_network {name}"));
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<(), Error> {
        self.record(format!("run {}", spec.name));
        if self.inner.fail_run.lock().unwrap().as_deref() == Some(spec.name.as_str()) {
            return Err(Error::Provision(format!("could not start {}", spec.name)));
        }
        self.inner.running.lock().unwrap().push(spec.name.clone());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), Error> {
        self.record(format!("stop {name}"));
        // Stopping an absent container is success.
        self.inner.running.lock().unwrap().retain(|n| n != name);
        Ok(())
    }

    async fn get_archive(&self, name: &str, _path: &str) -> Result<Vec<u8>, Error> {
        self.record(format!("get_archive {name}"));
        if self.inner.fail_archive.lock().unwrap().contains(name) {
            return Err(Error::Provision(format!("no archive for {name}")));
        }
        Ok(self.inner.archive.lock().unwrap().clone())
    }

    async fn remove_network(&self, name: &str) -> Result<(), Error> {
        self.record(format!("remove_network {name}"));
        Ok(())
    }

    async fn list_labeled(&self) -> Result<Vec<String>, Error> {
        self.record("list_labeled".to_string());
        Ok(self.running())
    }
}

impl Connector for StubPlatform {
    fn node(&self, actor: &Actor) -> Arc<dyn NodeOps> {
        Arc::new(StubNode {
            inner: self.inner.clone(),
            name: actor.name.clone(),
        })
    }

    fn backend(&self, _actor: &Actor) -> Arc<dyn BackendOps> {
        Arc::new(StubBackend)
    }

    fn wallet(&self, actor: &Actor) -> Arc<dyn WalletOps> {
        Arc::new(StubWallet {
            inner: self.inner.clone(),
            name: actor.name.clone(),
        })
    }
}

struct StubNode {
    inner: Arc<Inner>,
    #[allow(dead_code)]
    name: String,
}

#[async_trait]
impl NodeOps for StubNode {
    async fn ready(&self) -> Result<bool, Error> {
        Ok(true)
    }

    async fn fund_address(&self, address: &str, sats: u64) -> Result<(), Error> {
        let mut ledger = self.inner.ledger.lock().unwrap();
        let owner = ledger
            .owners
            .get(address)
            .cloned()
            .expect("funding an unissued address");
        *ledger.balances.entry(owner).or_default() += sats;
        Ok(())
    }

    async fn mine_block(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn get_block_count(&self) -> Result<u64, Error> {
        Ok(2)
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, Error> {
        Ok(format!("hash-{height}"))
    }

    async fn get_block_info(&self, hash: &str) -> Result<Value, Error> {
        Ok(json!({ "hash": hash, "tx": [] }))
    }
}

struct StubBackend;

#[async_trait]
impl BackendOps for StubBackend {
    async fn ready(&self) -> Result<bool, Error> {
        Ok(true)
    }
}

struct StubWallet {
    inner: Arc<Inner>,
    name: String,
}

#[async_trait]
impl WalletOps for StubWallet {
    async fn create_wallet(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn wallet_loaded(&self) -> Result<bool, Error> {
        Ok(true)
    }

    async fn get_new_address(&self) -> Result<String, Error> {
        let mut ledger = self.inner.ledger.lock().unwrap();
        let address = format!("addr-{}", ledger.next_address);
        ledger.next_address += 1;
        ledger.owners.insert(address.clone(), self.name.clone());
        Ok(address)
    }

    async fn get_balance(&self) -> Result<u64, Error> {
        Ok(*self
            .inner
            .ledger
            .lock()
            .unwrap()
            .balances
            .get(&self.name)
            .unwrap_or(&0))
    }

    async fn send(&self, addressed_amounts: &[(String, u64)]) -> Result<(), Error> {
        let mut ledger = self.inner.ledger.lock().unwrap();
        for (address, sats) in addressed_amounts {
            let owner = ledger
                .owners
                .get(address)
                .cloned()
                .expect("paying an unissued address");
            *ledger.balances.entry(owner).or_default() += sats;
        }
        Ok(())
    }

    async fn start_coinjoin(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn list_coins(&self) -> Result<Value, Error> {
        Ok(json!([]))
    }

    async fn list_unspent_coins(&self) -> Result<Value, Error> {
        let balance = self.get_balance().await?;
        Ok(json!([{ "amount": balance }]))
    }

    async fn list_keys(&self) -> Result<Value, Error> {
        Ok(json!([]))
    }
}

/// Scratch directory holding the image build contexts and run state a test
/// needs on disk.
pub struct TestEnv {
    pub base: PathBuf,
}

impl TestEnv {
    pub fn create(test_name: &str) -> Self {
        let base = std::env::temp_dir().join(format!("coinjoin_sim_test_{test_name}"));
        std::fs::remove_dir_all(&base).ok();
        for image in ["btc-node", "wasabi-backend", "wasabi-client"] {
            std::fs::create_dir_all(base.join(image)).unwrap();
        }
        // Config seeds copied into the backend mount during provisioning
        std::fs::write(base.join("wasabi-backend").join("Config.json"), "{}").unwrap();
        std::fs::write(
            base.join("wasabi-backend").join("WabiSabiConfig.json"),
            "{}",
        )
        .unwrap();
        Self { base }
    }

    pub fn ctx(&self) -> NetworkContext {
        NetworkContext::new(&self.base)
    }

    /// Appends `lines` completed rounds to the coordinator's round record.
    pub fn record_rounds(&self, lines: u64) {
        let record = self.ctx().round_record();
        std::fs::create_dir_all(record.parent().unwrap()).unwrap();
        let mut content = std::fs::read_to_string(&record).unwrap_or_default();
        for _ in 0..lines {
            content.push_str("round\n");
        }
        std::fs::write(&record, content).unwrap();
    }

    /// A small but valid tar archive, built with the system `tar` binary.
    pub fn tar_fixture(&self) -> Vec<u8> {
        let dir = self.base.join("archive_fixture");
        std::fs::create_dir_all(dir.join("Logs")).unwrap();
        std::fs::write(dir.join("Logs").join("Logs.txt"), "log line\n").unwrap();
        let tarball = self.base.join("archive_fixture.tar");
        let status = std::process::Command::new("tar")
            .arg("-cf")
            .arg(&tarball)
            .arg("-C")
            .arg(&dir)
            .arg(".")
            .status()
            .unwrap();
        assert!(status.success());
        std::fs::read(&tarball).unwrap()
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.base).ok();
    }
}
