//! Thin resource facade.
//!
//! Every method maps to one verb + path + parameter set and returns an
//! [`ApiRequest`]; task-producing endpoints return `ApiRequest<Upid>` so the
//! caller decides whether to wait, track in the background, or neither.

mod nodes;
pub use nodes::{Node, NodeSummary, Nodes};

mod qemu;
pub use qemu::{CloneOptions, Qemu, QemuStatus, Snapshot, Snapshots};

mod lxc;
pub use lxc::Lxc;

mod tasks;
pub use tasks::Tasks;

use std::time::Duration;

use pve_core::{ApiClient, ApiError, ApiRequest, WorkerPool};
use pve_model::{TaskStatus, Upid};
use serde::{Deserialize, Serialize};

use crate::{ClientConfig, ConfigError, ReqwestTransport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub repoid: String,
}

/// Entry point of the resource facade.
#[derive(Debug, Clone)]
pub struct Proxmox {
    client: ApiClient,
}

impl Proxmox {
    /// Client over HTTP with the request defaults from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self {
            client: ApiClient::new(transport).with_defaults(config.request_defaults()),
        })
    }

    pub fn from_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Run polls and callbacks on `pool` instead of the shared one.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.client = self.client.with_pool(pool);
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn version(&self) -> ApiRequest<Version> {
        self.client.get("version")
    }

    pub fn nodes(&self) -> Nodes {
        Nodes::new(self.client.clone())
    }

    pub fn tasks(&self) -> Tasks {
        Tasks::new(self.client.clone())
    }

    /// Wait for a task started elsewhere, using the configured check interval.
    pub async fn wait_for_task(
        &self,
        upid: &Upid,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus, ApiError> {
        let delay = self.client.defaults().task_check_delay;
        self.client.wait_for_task(upid, delay, timeout).await
    }
}
