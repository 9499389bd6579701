//! Coinjoin simulation CLI

use clap::{Arg, ArgAction, Command};
use coinjoin_orchestrator::{
    clients::RpcConnector,
    context::NetworkContext,
    poller::Interrupt,
    provision::DockerCli,
    run::Orchestrator,
    scenario::Scenario,
    teardown,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

/// Flag for cleanup-only mode
const CLEANUP_FLAG: &str = "cleanup-only";

/// Flag for the scenario override file
const SCENARIO_FLAG: &str = "scenario";

/// Entrypoint for the coinjoin simulation CLI
#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Define application
    let matches = Command::new("coinjoin-sim")
        .version(crate_version())
        .about("Run a reproducible coinjoin simulation across containerized actors.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(CLEANUP_FLAG)
                .long(CLEANUP_FLAG)
                .action(ArgAction::SetTrue)
                .help("Stop managed containers, remove the network and mounts, and exit"),
        )
        .arg(
            Arg::new(SCENARIO_FLAG)
                .long(SCENARIO_FLAG)
                .help("Path to a JSON scenario override, shallow-merged over the default")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let ctx = NetworkContext::new(Path::new("."));
    let provisioner = DockerCli;

    // Cleanup-only mode releases leftovers and never provisions anything
    if matches.get_flag(CLEANUP_FLAG) {
        return match teardown::cleanup(&ctx, &provisioner).await {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "cleanup failed");
                std::process::ExitCode::FAILURE
            }
        };
    }

    // Load the scenario
    let path = matches.get_one::<PathBuf>(SCENARIO_FLAG);
    let scenario = match Scenario::load(path.map(PathBuf::as_path)) {
        Ok(scenario) => scenario,
        Err(err) => {
            error!(error = %err, "could not load scenario");
            return std::process::ExitCode::FAILURE;
        }
    };

    // Interruption is observed between poll iterations and still finalizes
    let interrupt = Interrupt::default();
    interrupt.listen();

    // Run
    let orchestrator = Orchestrator::new(
        ctx,
        Arc::new(provisioner),
        Arc::new(RpcConnector::default()),
        interrupt,
    );
    match orchestrator.run(&scenario).await {
        Ok(report) => {
            info!(
                rounds = report.rounds,
                interrupted = report.interrupted,
                artifacts = ?report.artifacts,
                "simulation finished"
            );
            std::process::ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "simulation failed");
            std::process::ExitCode::FAILURE
        }
    }
}
