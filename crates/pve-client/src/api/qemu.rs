use pve_core::{ApiClient, ApiRequest};
use pve_model::Upid;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// `GET nodes/{node}/qemu/{vmid}/status/current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QemuStatus {
    pub vmid: u32,
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub qmpstatus: Option<String>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub lock: Option<String>,
}

impl QemuStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// Parameters of `POST nodes/{node}/qemu/{vmid}/clone`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    pub newid: u32,
    pub name: Option<String>,
    pub target: Option<String>,
    pub storage: Option<String>,
    pub pool: Option<String>,
    pub description: Option<String>,
    pub full: Option<bool>,
}

impl CloneOptions {
    pub fn new(newid: u32) -> Self {
        Self {
            newid,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_target(mut self, node: impl Into<String>) -> Self {
        self.target = Some(node.into());
        self
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Full copy instead of a linked clone.
    pub fn full(mut self, full: bool) -> Self {
        self.full = Some(full);
        self
    }

    /// Request body; unset options are left out and `full` goes as `0`/`1`.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("newid".into(), json!(self.newid));

        let text = [
            ("name", &self.name),
            ("target", &self.target),
            ("storage", &self.storage),
            ("pool", &self.pool),
            ("description", &self.description),
        ];
        for (key, value) in text {
            if let Some(v) = value {
                body.insert(key.into(), json!(v));
            }
        }
        if let Some(full) = self.full {
            body.insert("full".into(), json!(u8::from(full)));
        }
        Value::Object(body)
    }
}

/// A QEMU virtual machine.
#[derive(Debug, Clone)]
pub struct Qemu {
    client: ApiClient,
    node: String,
    vmid: u32,
}

impl Qemu {
    pub(crate) fn new(client: ApiClient, node: String, vmid: u32) -> Self {
        Self { client, node, vmid }
    }

    pub fn vmid(&self) -> u32 {
        self.vmid
    }

    fn path(&self, tail: &str) -> String {
        format!("nodes/{}/qemu/{}/{tail}", self.node, self.vmid)
    }

    pub fn status(&self) -> ApiRequest<QemuStatus> {
        self.client.get(self.path("status/current"))
    }

    pub fn start(&self) -> ApiRequest<Upid> {
        self.client.post(self.path("status/start"), None)
    }

    /// Hard stop.
    pub fn stop(&self) -> ApiRequest<Upid> {
        self.client.post(self.path("status/stop"), None)
    }

    /// ACPI shutdown.
    pub fn shutdown(&self) -> ApiRequest<Upid> {
        self.client.post(self.path("status/shutdown"), None)
    }

    pub fn reboot(&self) -> ApiRequest<Upid> {
        self.client.post(self.path("status/reboot"), None)
    }

    pub fn clone_vm(&self, options: CloneOptions) -> ApiRequest<Upid> {
        self.client.post(self.path("clone"), Some(options.to_body()))
    }

    pub fn snapshots(&self) -> Snapshots {
        Snapshots {
            client: self.client.clone(),
            base: self.path("snapshot"),
        }
    }
}

/// One entry of `GET nodes/{node}/qemu/{vmid}/snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub snaptime: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Snapshots {
    client: ApiClient,
    base: String,
}

impl Snapshots {
    pub fn list(&self) -> ApiRequest<Vec<Snapshot>> {
        self.client.get(self.base.clone())
    }

    pub fn create(&self, name: impl Into<String>) -> ApiRequest<Upid> {
        let name: String = name.into();
        self.client
            .post(self.base.clone(), Some(json!({ "snapname": name })))
    }
}
