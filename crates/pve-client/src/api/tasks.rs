use pve_core::{ApiClient, ApiRequest};
use pve_model::{TaskStatus, Upid};

/// Task endpoints; each request is routed to the node that owns the task.
#[derive(Debug, Clone)]
pub struct Tasks {
    client: ApiClient,
}

impl Tasks {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn status(&self, upid: &Upid) -> ApiRequest<TaskStatus> {
        self.client
            .get(format!("nodes/{}/tasks/{}/status", upid.node(), upid.as_str()))
    }
}
