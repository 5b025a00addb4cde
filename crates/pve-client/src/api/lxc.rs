use pve_core::{ApiClient, ApiRequest};
use pve_model::Upid;

/// An LXC container.
#[derive(Debug, Clone)]
pub struct Lxc {
    client: ApiClient,
    node: String,
    vmid: u32,
}

impl Lxc {
    pub(crate) fn new(client: ApiClient, node: String, vmid: u32) -> Self {
        Self { client, node, vmid }
    }

    pub fn vmid(&self) -> u32 {
        self.vmid
    }

    fn path(&self, tail: &str) -> String {
        format!("nodes/{}/lxc/{}/{tail}", self.node, self.vmid)
    }

    pub fn start(&self) -> ApiRequest<Upid> {
        self.client.post(self.path("status/start"), None)
    }

    pub fn stop(&self) -> ApiRequest<Upid> {
        self.client.post(self.path("status/stop"), None)
    }
}
