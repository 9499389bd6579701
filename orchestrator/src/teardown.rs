//! Releases all provisioned resources exactly once.

use crate::actor::Registry;
use crate::context::NetworkContext;
use crate::provision::Provisioner;
use crate::Error;
use tracing::{info, warn};

/// Stops every registered actor, removes the network, and removes the mount
/// directory, in that order, so mounts outlive artifact collection.
///
/// "Already absent" is success. Any other failure is logged and the remaining
/// steps still run; the returned count is the number of steps that failed.
/// Running teardown against already-released resources is a no-op, so a
/// second invocation succeeds.
pub async fn teardown(
    registry: &Registry,
    ctx: &NetworkContext,
    provisioner: &dyn Provisioner,
) -> usize {
    let mut failures = 0;
    for actor in registry.all() {
        match provisioner.stop(&actor.name).await {
            Ok(()) => info!(actor = actor.name.as_str(), "stopped"),
            Err(err) => {
                warn!(actor = actor.name.as_str(), error = %err, "could not stop");
                failures += 1;
            }
        }
    }
    match provisioner.remove_network(&ctx.network).await {
        Ok(()) => info!(network = ctx.network.as_str(), "removed network"),
        Err(err) => {
            warn!(network = ctx.network.as_str(), error = %err, "could not remove network");
            failures += 1;
        }
    }
    if ctx.mounts.exists() {
        match std::fs::remove_dir_all(&ctx.mounts) {
            Ok(()) => info!(path = %ctx.mounts.display(), "removed mounts"),
            Err(err) => {
                warn!(path = %ctx.mounts.display(), error = %err, "could not remove mounts");
                failures += 1;
            }
        }
    }
    failures
}

/// `--cleanup-only`: releases leftovers of a previous run without running a
/// scenario. Only resources carrying the managed label are touched.
pub async fn cleanup(ctx: &NetworkContext, provisioner: &dyn Provisioner) -> Result<(), Error> {
    for name in provisioner.list_labeled().await? {
        match provisioner.stop(&name).await {
            Ok(()) => info!(container = name.as_str(), "stopped"),
            Err(err) => warn!(container = name.as_str(), error = %err, "could not stop"),
        }
    }
    match provisioner.remove_network(&ctx.network).await {
        Ok(()) => info!(network = ctx.network.as_str(), "removed network"),
        Err(err) => warn!(network = ctx.network.as_str(), error = %err, "could not remove network"),
    }
    if ctx.mounts.exists() {
        std::fs::remove_dir_all(&ctx.mounts)?;
        info!(path = %ctx.mounts.display(), "removed mounts");
    }
    Ok(())
}
