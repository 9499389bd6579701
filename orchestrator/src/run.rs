//! The orchestration state machine: phase sequencing, convergence waits, and
//! the guarantee that artifact collection and teardown happen exactly once
//! regardless of how the run ends.

use crate::actor::{Actor, ActorKind, Registry};
use crate::clients::{is_unreachable, Connector, NodeOps, WalletOps};
use crate::collect::Collector;
use crate::context::{
    count_rounds, NetworkContext, BACKEND_CONFIG_FILES, BACKEND_DATA_DIR,
};
use crate::poller::{Interrupt, Poller};
use crate::provision::{Provisioner, RunSpec};
use crate::scenario::Scenario;
use crate::teardown::teardown;
use crate::{Error, SATS_PER_BTC};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Image tag (and build-context directory name) of the regtest node.
pub const NODE_IMAGE: &str = "btc-node";
/// Image tag (and build-context directory name) of the coordinator.
pub const BACKEND_IMAGE: &str = "wasabi-backend";
/// Image tag (and build-context directory name) of the wallet client.
pub const CLIENT_IMAGE: &str = "wasabi-client";

/// Node RPC port, mapped 1:1 to the host.
const NODE_RPC_PORT: u16 = 18443;
/// Coordinator HTTP port, mapped 1:1 to the host.
const BACKEND_PORT: u16 = 37127;
/// Wallet daemon RPC port inside every wallet container.
const WALLET_PORT: u16 = 37128;
/// Host port of the distributor's wallet daemon.
const DISTRIBUTOR_PORT: u16 = 37128;
/// First host port assigned to participant clients (base + index).
const CLIENT_PORT_BASE: u16 = 37129;

/// Initial distributor funding: enough to fan out any default-sized plan.
const DISTRIBUTOR_FUND: u64 = 49 * SATS_PER_BTC;

/// Interval for actor readiness probes.
const READY_POLL: Duration = Duration::from_millis(500);
/// Interval for funding-balance convergence.
const BALANCE_POLL: Duration = Duration::from_millis(100);
/// Interval for round-count convergence.
const ROUND_POLL: Duration = Duration::from_secs(1);

/// Phases of a run, executed strictly in order. Collecting and TearingDown
/// execute on every exit path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Building,
    Provisioning,
    FundingDistributor,
    ProvisioningClients,
    FundingClients,
    Running,
    Collecting,
    TearingDown,
    Done,
}

/// The single mutable structure of a run, exclusively owned by the
/// [`Orchestrator`].
pub struct RunState {
    pub phase: Phase,
    pub registry: Registry,
    pub rounds_observed: u64,
}

/// A funding request against one actor, satisfied when the actor's observed
/// balance covers the sum of the requested amounts.
#[derive(Clone, Debug)]
pub struct Invoice {
    pub actor: Actor,
    pub requested: Vec<u64>,
}

impl Invoice {
    pub fn total(&self) -> u64 {
        self.requested.iter().sum()
    }
}

/// What a finished run produced.
pub struct RunReport {
    pub actors: Vec<Actor>,
    pub rounds: u64,
    pub artifacts: Option<PathBuf>,
    pub interrupted: bool,
}

/// Drives one simulation run through its phases.
pub struct Orchestrator {
    ctx: NetworkContext,
    provisioner: Arc<dyn Provisioner>,
    connector: Arc<dyn Connector>,
    interrupt: Interrupt,
    state: RunState,
    started: DateTime<Local>,
    node: Option<(Actor, Arc<dyn NodeOps>)>,
    backend: Option<Actor>,
    distributor: Option<(Actor, Arc<dyn WalletOps>)>,
    clients: Vec<(Actor, Arc<dyn WalletOps>)>,
}

fn endpoint(port: u16) -> String {
    format!("127.0.0.1:{port}")
}

impl Orchestrator {
    pub fn new(
        ctx: NetworkContext,
        provisioner: Arc<dyn Provisioner>,
        connector: Arc<dyn Connector>,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            ctx,
            provisioner,
            connector,
            interrupt,
            state: RunState {
                phase: Phase::Building,
                registry: Registry::default(),
                rounds_observed: 0,
            },
            started: Local::now(),
            node: None,
            backend: None,
            distributor: None,
            clients: Vec::new(),
        }
    }

    /// Executes the run. Forward phases stop at the first unrecoverable error
    /// or interruption; collection and teardown then run unconditionally,
    /// once, before the outcome is returned.
    pub async fn run(mut self, scenario: &Scenario) -> Result<RunReport, Error> {
        info!(
            scenario = scenario.name.as_str(),
            rounds = scenario.rounds,
            wallets = scenario.wallets.len(),
            "starting scenario"
        );
        let outcome = self.advance(scenario).await;
        match &outcome {
            Ok(()) => info!(rounds = self.state.rounds_observed, "round target reached"),
            Err(Error::Interrupted) => info!("interrupted, finalizing"),
            Err(err) => error!(error = %err, "run failed, finalizing"),
        }

        self.state.phase = Phase::Collecting;
        let collector = Collector {
            ctx: &self.ctx,
            scenario: &scenario.name,
            started: self.started,
            node: self.node.clone(),
            backend: self.backend.clone(),
            clients: &self.clients,
            provisioner: self.provisioner.as_ref(),
        };
        let artifacts = match collector.collect().await {
            Ok(path) => Some(path),
            Err(err) => {
                error!(error = %err, "artifact collection failed");
                None
            }
        };

        self.state.phase = Phase::TearingDown;
        teardown(
            &self.state.registry,
            &self.ctx,
            self.provisioner.as_ref(),
        )
        .await;
        self.state.phase = Phase::Done;

        let interrupted = matches!(&outcome, Err(Error::Interrupted));
        match outcome {
            Ok(()) | Err(Error::Interrupted) => Ok(RunReport {
                actors: self.state.registry.all().to_vec(),
                rounds: self.state.rounds_observed,
                artifacts,
                interrupted,
            }),
            Err(err) => Err(err),
        }
    }

    /// Forward phases, in fixed order.
    async fn advance(&mut self, scenario: &Scenario) -> Result<(), Error> {
        self.build().await?;
        self.provision().await?;
        self.fund_distributor().await?;
        self.provision_clients(scenario).await?;
        self.fund_clients(scenario).await?;
        self.start_rounds().await?;
        self.monitor(scenario).await
    }

    fn poller(&self, interval: Duration) -> Poller {
        Poller::new(interval, self.interrupt.clone())
    }

    async fn build(&mut self) -> Result<(), Error> {
        self.state.phase = Phase::Building;
        for image in [NODE_IMAGE, BACKEND_IMAGE, CLIENT_IMAGE] {
            self.interrupt.check()?;
            self.provisioner
                .build_image(&self.ctx.images.join(image), image)
                .await?;
            info!(image, "image built");
        }
        Ok(())
    }

    /// Starts the node, the coordinator, and the distributor wallet inside a
    /// fresh network context. Leftovers of a previous run under the managed
    /// label are destroyed first: at most one context is active at a time.
    async fn provision(&mut self) -> Result<(), Error> {
        self.state.phase = Phase::Provisioning;
        for name in self.provisioner.list_labeled().await? {
            self.provisioner.stop(&name).await?;
            info!(container = name.as_str(), "stopped leftover container");
        }
        self.provisioner.remove_network(&self.ctx.network).await?;
        if self.ctx.mounts.exists() {
            std::fs::remove_dir_all(&self.ctx.mounts)?;
        }
        std::fs::create_dir_all(&self.ctx.mounts)?;
        self.provisioner.create_network(&self.ctx.network).await?;
        info!(network = self.ctx.network.as_str(), "created network");

        // Node
        let actor = self
            .state
            .registry
            .register(ActorKind::Node, endpoint(NODE_RPC_PORT));
        let spec = RunSpec::new(NODE_IMAGE, &actor.name, &self.ctx.network)
            .port(NODE_RPC_PORT, NODE_RPC_PORT);
        self.provisioner.run(&spec).await?;
        let node = self.connector.node(&actor);
        let probe = node.clone();
        self.poller(READY_POLL)
            .await_condition(move || {
                let probe = probe.clone();
                async move { probe.ready().await }
            })
            .await?;
        self.state.registry.mark_ready(&actor.name);
        info!(actor = actor.name.as_str(), "started node");
        self.node = Some((actor, node));

        // Coordinator, with its working directory bind-mounted so the round
        // record is observable from the host.
        let backend_mount = self.ctx.backend_mount();
        std::fs::create_dir_all(&backend_mount)?;
        for file in BACKEND_CONFIG_FILES {
            std::fs::copy(
                self.ctx.images.join(BACKEND_IMAGE).join(file),
                backend_mount.join(file),
            )?;
        }
        let actor = self
            .state
            .registry
            .register(ActorKind::Backend, endpoint(BACKEND_PORT));
        let spec = RunSpec::new(BACKEND_IMAGE, &actor.name, &self.ctx.network)
            .port(BACKEND_PORT, BACKEND_PORT)
            .env("WASABI_BIND", &format!("http://0.0.0.0:{BACKEND_PORT}"))
            .mount(backend_mount, BACKEND_DATA_DIR);
        self.provisioner.run(&spec).await?;
        let backend = self.connector.backend(&actor);
        self.poller(READY_POLL)
            .await_condition(move || {
                let probe = backend.clone();
                async move { probe.ready().await }
            })
            .await?;
        self.state.registry.mark_ready(&actor.name);
        info!(actor = actor.name.as_str(), "started backend");
        self.backend = Some(actor);

        // Distributor wallet
        let actor = self
            .state
            .registry
            .register(ActorKind::Distributor, endpoint(DISTRIBUTOR_PORT));
        let spec = RunSpec::new(CLIENT_IMAGE, &actor.name, &self.ctx.network)
            .port(DISTRIBUTOR_PORT, WALLET_PORT);
        self.provisioner.run(&spec).await?;
        let wallet = self.connector.wallet(&actor);
        self.wait_wallet(&wallet).await?;
        self.state.registry.mark_ready(&actor.name);
        info!(actor = actor.name.as_str(), "started distributor");
        self.distributor = Some((actor, wallet));
        Ok(())
    }

    /// Creates the daemon's wallet (retrying while the daemon is still coming
    /// up) and waits until it is loaded.
    async fn wait_wallet(&self, wallet: &Arc<dyn WalletOps>) -> Result<(), Error> {
        let poller = self.poller(READY_POLL);
        let target = wallet.clone();
        poller
            .await_condition(move || {
                let target = target.clone();
                async move {
                    match target.create_wallet().await {
                        Ok(()) => Ok(true),
                        Err(Error::Http(err)) if is_unreachable(&err) => Ok(false),
                        Err(err) => Err(err),
                    }
                }
            })
            .await?;
        let target = wallet.clone();
        poller
            .await_condition(move || {
                let target = target.clone();
                async move { target.wallet_loaded().await }
            })
            .await
    }

    async fn fund_distributor(&mut self) -> Result<(), Error> {
        self.state.phase = Phase::FundingDistributor;
        let (_, node) = self.node.as_ref().ok_or(Error::NotProvisioned("node"))?;
        let (actor, wallet) = self
            .distributor
            .as_ref()
            .ok_or(Error::NotProvisioned("distributor"))?;
        let address = wallet.get_new_address().await?;
        node.fund_address(&address, DISTRIBUTOR_FUND).await?;
        node.mine_block().await?;
        let target = wallet.clone();
        self.poller(BALANCE_POLL)
            .await_condition(move || {
                let target = target.clone();
                async move { Ok(target.get_balance().await? >= DISTRIBUTOR_FUND) }
            })
            .await?;
        info!(
            actor = actor.name.as_str(),
            sats = DISTRIBUTOR_FUND,
            "funded distributor"
        );
        Ok(())
    }

    /// Starts one wallet client per scenario wallet, then awaits their
    /// wallets in registration order.
    async fn provision_clients(&mut self, scenario: &Scenario) -> Result<(), Error> {
        self.state.phase = Phase::ProvisioningClients;
        for i in 0..scenario.wallets.len() {
            self.interrupt.check()?;
            let host_port = CLIENT_PORT_BASE + i as u16;
            let actor = self
                .state
                .registry
                .register(ActorKind::Client, endpoint(host_port));
            let spec = RunSpec::new(CLIENT_IMAGE, &actor.name, &self.ctx.network)
                .port(host_port, WALLET_PORT);
            self.provisioner.run(&spec).await?;
            let wallet = self.connector.wallet(&actor);
            self.clients.push((actor, wallet));
        }
        let clients = self.clients.clone();
        for (actor, wallet) in &clients {
            self.wait_wallet(wallet).await?;
            self.state.registry.mark_ready(&actor.name);
            info!(actor = actor.name.as_str(), "started client");
        }
        Ok(())
    }

    /// Fans funds out to every client in a single batched transaction, then
    /// polls each invoice to convergence in registration order. The broadcast
    /// is not cancellable once issued.
    async fn fund_clients(&mut self, scenario: &Scenario) -> Result<(), Error> {
        self.state.phase = Phase::FundingClients;
        let (_, node) = self.node.as_ref().ok_or(Error::NotProvisioned("node"))?;
        let (_, distributor) = self
            .distributor
            .as_ref()
            .ok_or(Error::NotProvisioned("distributor"))?;

        let invoices: Vec<Invoice> = self
            .clients
            .iter()
            .zip(&scenario.wallets)
            .map(|((actor, _), wallet)| Invoice {
                actor: actor.clone(),
                requested: wallet.funds.clone(),
            })
            .collect();
        let mut addressed = Vec::new();
        for ((_, wallet), invoice) in self.clients.iter().zip(&invoices) {
            for amount in &invoice.requested {
                addressed.push((wallet.get_new_address().await?, *amount));
            }
        }
        distributor.send(&addressed).await?;
        info!(
            destinations = addressed.len(),
            "created wallet-funding transaction"
        );
        node.mine_block().await?;

        for ((_, wallet), invoice) in self.clients.iter().zip(&invoices) {
            let need = invoice.total();
            let target = wallet.clone();
            self.poller(BALANCE_POLL)
                .await_condition(move || {
                    let target = target.clone();
                    async move { Ok(target.get_balance().await? >= need) }
                })
                .await?;
            info!(actor = invoice.actor.name.as_str(), sats = need, "funded");
        }
        Ok(())
    }

    /// Starts coinjoin on every client, in registration order.
    async fn start_rounds(&mut self) -> Result<(), Error> {
        self.state.phase = Phase::Running;
        for (actor, wallet) in &self.clients {
            self.interrupt.check()?;
            wallet.start_coinjoin().await?;
            info!(actor = actor.name.as_str(), "started coinjoin");
        }
        Ok(())
    }

    /// Blocks until the coordinator's round record shows the scenario's round
    /// target, or the run is interrupted.
    async fn monitor(&mut self, scenario: &Scenario) -> Result<(), Error> {
        let record = self.ctx.round_record();
        let target = scenario.rounds;
        let seen = Arc::new(AtomicU64::new(0));
        let observed = seen.clone();
        let result = self
            .poller(ROUND_POLL)
            .await_condition(move || {
                let record = record.clone();
                let observed = observed.clone();
                async move {
                    let rounds = count_rounds(&record)?;
                    observed.store(rounds, Ordering::Relaxed);
                    info!(rounds, target, "observed completed rounds");
                    Ok(rounds >= target)
                }
            })
            .await;
        self.state.rounds_observed = seen.load(Ordering::Relaxed);
        result
    }
}
