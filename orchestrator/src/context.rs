//! Filesystem and network state backing exactly one active run.

use crate::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Name of the isolated network.
pub const NETWORK_NAME: &str = "coinjoin";

/// Container-side path of a wallet client's working directory.
pub const CLIENT_DATA_DIR: &str = "/home/wasabi/.walletwasabi/client/";

/// Container-side path of the coordinator's working directory.
pub const BACKEND_DATA_DIR: &str = "/home/wasabi/.walletwasabi/backend/";

/// Configuration files seeded into the coordinator mount before it starts.
pub const BACKEND_CONFIG_FILES: [&str; 2] = ["Config.json", "WabiSabiConfig.json"];

/// The isolated network plus the mount and artifact directories backing one
/// run. At most one context may be active under the managed label; any
/// leftovers are destroyed before a new context is provisioned.
#[derive(Clone, Debug)]
pub struct NetworkContext {
    pub network: String,
    /// Host directories holding the three actor image build contexts.
    pub images: PathBuf,
    /// Host directory bind-mounted into the coordinator.
    pub mounts: PathBuf,
    /// Host directory receiving per-run artifact snapshots.
    pub logs: PathBuf,
}

impl NetworkContext {
    pub fn new(base: &Path) -> Self {
        Self {
            network: NETWORK_NAME.to_string(),
            images: base.to_path_buf(),
            mounts: base.join("mounts"),
            logs: base.join("logs"),
        }
    }

    /// Host side of the coordinator's bind mount.
    pub fn backend_mount(&self) -> PathBuf {
        self.mounts.join("backend")
    }

    /// The coordinator's round record: one line per completed round.
    ///
    /// The path and line-per-round format are an external contract owned by
    /// the coordinator.
    pub fn round_record(&self) -> PathBuf {
        self.backend_mount().join("WabiSabi").join("CoinJoinIdStore.txt")
    }
}

/// Counts completed rounds by counting lines in the round record.
///
/// The record only appears once the coordinator completes its first round, so
/// a missing file reads as zero; any other read failure is fatal.
pub fn count_rounds(record: &Path) -> Result<u64, Error> {
    let file = match File::open(record) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let mut rounds = 0;
    for line in BufReader::new(file).lines() {
        line?;
        rounds += 1;
    }
    Ok(rounds)
}
