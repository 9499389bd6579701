//! Process-provisioning seam and its `docker` CLI implementation.
//!
//! The orchestrator consumes the container runtime as an opaque capability
//! through [`Provisioner`]; tests substitute a stub. Every resource the
//! production implementation creates carries the managed label, and cleanup
//! filters by that label rather than by name or image matching.

use crate::Error;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Label attached to every container and network this system provisions.
pub const MANAGED_LABEL: &str = "coinjoin-sim=managed";

/// Everything needed to start one named actor process.
#[derive(Clone, Debug)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    /// (host, container) port pairs.
    pub ports: Vec<(u16, u16)>,
    pub env: Vec<(String, String)>,
    /// (host directory, container path) bind mounts.
    pub mounts: Vec<(PathBuf, String)>,
    pub network: String,
}

impl RunSpec {
    pub fn new(image: &str, name: &str, network: &str) -> Self {
        Self {
            image: image.to_string(),
            name: name.to_string(),
            ports: Vec::new(),
            env: Vec::new(),
            mounts: Vec::new(),
            network: network.to_string(),
        }
    }

    pub fn port(mut self, host: u16, container: u16) -> Self {
        self.ports.push((host, container));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn mount(mut self, host: PathBuf, container: &str) -> Self {
        self.mounts.push((host, container.to_string()));
        self
    }
}

/// Creates an isolated network, starts and stops named processes, and
/// retrieves a process's file archive.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn build_image(&self, path: &Path, tag: &str) -> Result<(), Error>;
    async fn create_network(&self, name: &str) -> Result<(), Error>;
    async fn run(&self, spec: &RunSpec) -> Result<(), Error>;
    /// Stops a named process. A process that is already gone is success.
    async fn stop(&self, name: &str) -> Result<(), Error>;
    /// Retrieves `path` from inside the named process as a tar stream.
    async fn get_archive(&self, name: &str, path: &str) -> Result<Vec<u8>, Error>;
    /// Removes the named network. An absent network is success.
    async fn remove_network(&self, name: &str) -> Result<(), Error>;
    /// Names of all processes carrying the managed label, running or not.
    async fn list_labeled(&self) -> Result<Vec<String>, Error>;
}

/// [`Provisioner`] backed by the `docker` binary.
#[derive(Default, Clone)]
pub struct DockerCli;

/// Runs a docker subcommand, returning its output on exit 0.
async fn docker(args: &[&str]) -> Result<Output, Error> {
    debug!(?args, "docker");
    let output = Command::new("docker").args(args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Provision(format!(
            "docker {}: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }
    Ok(output)
}

/// Whether a failed docker invocation means the resource is already gone.
fn is_absent(err: &Error) -> bool {
    match err {
        Error::Provision(message) => {
            let message = message.to_lowercase();
            message.contains("no such") || message.contains("not found")
        }
        _ => false,
    }
}

#[async_trait]
impl Provisioner for DockerCli {
    async fn build_image(&self, path: &Path, tag: &str) -> Result<(), Error> {
        let path = path.to_str().ok_or_else(|| {
            Error::Provision(format!("non-utf8 build context: {}", path.display()))
        })?;
        docker(&["build", "--rm", "-t", tag, path]).await?;
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<(), Error> {
        docker(&[
            "network", "create", "--driver", "bridge", "--label", MANAGED_LABEL, name,
        ])
        .await?;
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<(), Error> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--rm".into(),
            "--name".into(),
            spec.name.clone(),
            "--hostname".into(),
            spec.name.clone(),
            "--label".into(),
            MANAGED_LABEL.into(),
            "--network".into(),
            spec.network.clone(),
        ];
        for (host, container) in &spec.ports {
            args.push("-p".into());
            args.push(format!("{host}:{container}"));
        }
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for (host, container) in &spec.mounts {
            let host = std::fs::canonicalize(host)?;
            args.push("-v".into());
            args.push(format!("{}:{container}", host.display()));
        }
        args.push(spec.image.clone());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        docker(&args).await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), Error> {
        match docker(&["stop", name]).await {
            Ok(_) => Ok(()),
            Err(err) if is_absent(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn get_archive(&self, name: &str, path: &str) -> Result<Vec<u8>, Error> {
        let source = format!("{name}:{path}");
        let output = docker(&["cp", &source, "-"]).await?;
        Ok(output.stdout)
    }

    async fn remove_network(&self, name: &str) -> Result<(), Error> {
        match docker(&["network", "rm", name]).await {
            Ok(_) => Ok(()),
            Err(err) if is_absent(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn list_labeled(&self) -> Result<Vec<String>, Error> {
        let filter = format!("label={MANAGED_LABEL}");
        let output = docker(&[
            "ps",
            "-a",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Names}}",
        ])
        .await?;
        let names = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Ok(names)
    }
}
