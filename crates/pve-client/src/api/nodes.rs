use pve_core::{ApiClient, ApiRequest};
use serde::{Deserialize, Serialize};

use super::{Lxc, Qemu};

/// One entry of `GET /nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node: String,
    pub status: String,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub maxcpu: Option<u32>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Nodes {
    client: ApiClient,
}

impl Nodes {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn list(&self) -> ApiRequest<Vec<NodeSummary>> {
        self.client.get("nodes")
    }

    pub fn get(&self, name: impl Into<String>) -> Node {
        Node {
            client: self.client.clone(),
            name: name.into(),
        }
    }
}

/// A single cluster node.
#[derive(Debug, Clone)]
pub struct Node {
    client: ApiClient,
    name: String,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qemu(&self, vmid: u32) -> Qemu {
        Qemu::new(self.client.clone(), self.name.clone(), vmid)
    }

    pub fn lxc(&self, vmid: u32) -> Lxc {
        Lxc::new(self.client.clone(), self.name.clone(), vmid)
    }
}
