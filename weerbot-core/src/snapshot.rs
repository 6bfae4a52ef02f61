//! Local snapshot of the last raw weather payload and its remote mirror.

use async_trait::async_trait;
use serde_json::Value;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::process::Command;

use crate::{
    config::RelayConfig,
    error::{PublishError, RelayError},
    report::escape_html,
};

/// Copies a local file to the remote mirror.
#[async_trait]
pub trait Relay: Send + Sync + Debug {
    async fn relay(&self, file: &Path) -> Result<(), RelayError>;
}

/// `scp` with a private key to `host:remote_path` on a custom port.
#[derive(Debug, Clone)]
pub struct ScpRelay {
    ssh_key: PathBuf,
    host: String,
    port: u16,
    remote_path: String,
}

impl ScpRelay {
    pub fn new(ssh_key: PathBuf, host: String, port: u16, remote_path: String) -> Self {
        Self {
            ssh_key,
            host,
            port,
            remote_path,
        }
    }

    /// Build from config; `None` when the relay is disabled.
    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let (host, port) = config.host_and_port()?;
        Ok(Some(Self::new(
            config.ssh_key.clone(),
            host.to_string(),
            port,
            config.remote_path.clone(),
        )))
    }

    pub fn args(&self, file: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.ssh_key.display().to_string(),
            "-P".to_string(),
            self.port.to_string(),
            file.display().to_string(),
            format!("{}:{}", self.host, self.remote_path),
        ]
    }
}

#[async_trait]
impl Relay for ScpRelay {
    async fn relay(&self, file: &Path) -> Result<(), RelayError> {
        let args = self.args(file);
        tracing::debug!("running scp {}", args.join(" "));

        let output = Command::new("scp").args(&args).output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.trim().is_empty() {
            return Ok(());
        }

        let text = if stdout.trim().is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            stdout.into_owned()
        };
        let text = if text.trim().is_empty() {
            format!("scp exited with {}", output.status)
        } else {
            text
        };

        Err(RelayError::Output(escape_html(text.trim())))
    }
}

/// Writes the raw payload to the snapshot path and relays it.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    path: PathBuf,
    relay: Option<Arc<dyn Relay>>,
}

impl SnapshotPublisher {
    pub fn new(path: impl Into<PathBuf>, relay: Option<Arc<dyn Relay>>) -> Self {
        Self {
            path: path.into(),
            relay,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the local snapshot. No history is kept.
    pub async fn store(&self, raw: &Value) -> Result<(), PublishError> {
        let body = serde_json::to_string_pretty(raw)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PublishError::Store {
                    path: self.path.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, body)
            .await
            .map_err(|source| PublishError::Store {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!("weather snapshot written to {}", self.path.display());
        Ok(())
    }

    /// Store, then relay. Relay is skipped when none is configured.
    pub async fn publish(&self, raw: &Value) -> Result<(), PublishError> {
        self.store(raw).await?;

        if let Some(relay) = &self.relay {
            relay.relay(&self.path).await?;
            tracing::info!("weather snapshot relayed");
        }

        Ok(())
    }
}
