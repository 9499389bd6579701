//! Snapshots every actor's state after the run ends.
//!
//! Collection is per-actor isolated: a failure snapshotting one actor is
//! logged and never prevents snapshotting the others. Only failure to create
//! the run directory itself is fatal.

use crate::actor::Actor;
use crate::clients::{NodeOps, WalletOps};
use crate::context::{NetworkContext, CLIENT_DATA_DIR};
use crate::provision::Provisioner;
use crate::Error;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Snapshots collected from every actor at the end of a run.
pub struct Collector<'a> {
    pub ctx: &'a NetworkContext,
    pub scenario: &'a str,
    pub started: DateTime<Local>,
    pub node: Option<(Actor, Arc<dyn NodeOps>)>,
    pub backend: Option<Actor>,
    pub clients: &'a [(Actor, Arc<dyn WalletOps>)],
    pub provisioner: &'a dyn Provisioner,
}

impl Collector<'_> {
    /// Writes all artifacts and returns the run's data directory.
    pub async fn collect(&self) -> Result<PathBuf, Error> {
        let run_dir = format!(
            "{}_{}",
            self.scenario,
            self.started.format("%Y-%m-%d_%H-%M")
        );
        let data = self.ctx.logs.join(run_dir).join("data");
        std::fs::create_dir_all(&data)?;

        if let Some((actor, node)) = &self.node {
            if let Err(err) = self.collect_node(&data, actor, node.as_ref()).await {
                warn!(actor = actor.name.as_str(), error = %err, "could not store node blocks");
            }
        }

        if let Some(actor) = &self.backend {
            match copy_dir(&self.ctx.backend_mount(), &data.join(&actor.name)) {
                Ok(()) => info!(actor = actor.name.as_str(), "stored backend working directory"),
                // Logs may legitimately be missing on a fast abort.
                Err(err) => {
                    warn!(actor = actor.name.as_str(), error = %err, "could not store backend working directory")
                }
            }
        }

        for (actor, wallet) in self.clients {
            if let Err(err) = self.collect_client(&data, actor, wallet.as_ref()).await {
                warn!(actor = actor.name.as_str(), error = %err, "could not store client records");
            }
            if let Err(err) = self.collect_client_archive(&data, actor).await {
                warn!(actor = actor.name.as_str(), error = %err, "could not store client archive");
            }
        }

        info!(path = %data.display(), "stored artifacts");
        Ok(data)
    }

    /// Records every block from height 0 to the current tip as an
    /// individually addressable record, yielding a replayable snapshot.
    async fn collect_node(
        &self,
        data: &Path,
        actor: &Actor,
        node: &dyn NodeOps,
    ) -> Result<(), Error> {
        let dir = data.join(&actor.name);
        std::fs::create_dir_all(&dir)?;
        let tip = node.get_block_count().await?;
        let mut stored = 0;
        while stored < tip {
            let hash = node.get_block_hash(stored).await?;
            let block = node.get_block_info(&hash).await?;
            let path = dir.join(format!("block_{stored}.json"));
            std::fs::write(path, serde_json::to_string_pretty(&block)?)?;
            stored += 1;
        }
        info!(actor = actor.name.as_str(), blocks = stored, "stored blocks");
        Ok(())
    }

    /// Records the coin, unspent-coin, and key lists as three structured
    /// records.
    async fn collect_client(
        &self,
        data: &Path,
        actor: &Actor,
        wallet: &dyn WalletOps,
    ) -> Result<(), Error> {
        let dir = data.join(&actor.name);
        std::fs::create_dir_all(&dir)?;
        let records = [
            ("coins.json", wallet.list_coins().await?),
            ("unspent_coins.json", wallet.list_unspent_coins().await?),
            ("keys.json", wallet.list_keys().await?),
        ];
        for (file, record) in records {
            std::fs::write(dir.join(file), serde_json::to_string_pretty(&record)?)?;
        }
        info!(actor = actor.name.as_str(), "stored client records");
        Ok(())
    }

    /// Best-effort retrieval and extraction of the client's internal log
    /// archive.
    async fn collect_client_archive(&self, data: &Path, actor: &Actor) -> Result<(), Error> {
        let dir = data.join(&actor.name);
        std::fs::create_dir_all(&dir)?;
        let archive = self
            .provisioner
            .get_archive(&actor.name, CLIENT_DATA_DIR)
            .await?;
        extract_tar(&archive, &dir).await?;
        info!(actor = actor.name.as_str(), "stored client archive");
        Ok(())
    }
}

/// Extracts a tar stream into `dir` via the system `tar` binary.
async fn extract_tar(archive: &[u8], dir: &Path) -> Result<(), Error> {
    let tarball = dir.join(".archive.tar");
    std::fs::write(&tarball, archive)?;
    let output = Command::new("tar")
        .arg("-xf")
        .arg(&tarball)
        .arg("-C")
        .arg(dir)
        .output()
        .await?;
    std::fs::remove_file(&tarball).ok();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Provision(format!("tar: {}", stderr.trim())));
    }
    Ok(())
}

/// Recursive directory copy.
fn copy_dir(src: &Path, dst: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_dir_is_recursive() {
        let base = std::env::temp_dir().join("collect_copy_dir_test");
        std::fs::remove_dir_all(&base).ok();
        let src = base.join("src");
        std::fs::create_dir_all(src.join("WabiSabi")).unwrap();
        std::fs::write(src.join("Config.json"), "{}").unwrap();
        std::fs::write(src.join("WabiSabi").join("CoinJoinIdStore.txt"), "x\n").unwrap();

        let dst = base.join("dst");
        copy_dir(&src, &dst).unwrap();
        assert!(dst.join("Config.json").exists());
        assert!(dst.join("WabiSabi").join("CoinJoinIdStore.txt").exists());
        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn copy_dir_missing_source_fails() {
        let base = std::env::temp_dir().join("collect_copy_missing_test");
        std::fs::remove_dir_all(&base).ok();
        assert!(copy_dir(&base.join("absent"), &base.join("dst")).is_err());
        std::fs::remove_dir_all(&base).ok();
    }
}
