use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use pve_model::{TaskStatus, Upid};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{
    ApiError, ApiRequest, HttpRequest, Method, Normalizer, RequestDefaults, StatusSource,
    TaskPoller, TimeoutGuard, Transport, WorkerPool,
};

/// Dispatcher shared by every resource facade.
///
/// Turns an [`HttpRequest`] into an [`ApiRequest`] that sends it over the
/// transport, classifies `>= 400` statuses and decodes the normalized body. The
/// client is also the status source for tasks its requests start.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    normalizer: Arc<Normalizer>,
    pool: Option<WorkerPool>,
    defaults: RequestDefaults,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("normalizer", &self.normalizer)
            .field("pool", &self.pool)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            normalizer: Arc::new(Normalizer::new()),
            pool: None,
            defaults: RequestDefaults::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    /// Pool for polls and callbacks; defaults to [`WorkerPool::shared`].
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &RequestDefaults {
        &self.defaults
    }

    pub fn pool(&self) -> WorkerPool {
        self.pool.clone().unwrap_or_else(WorkerPool::shared)
    }

    /// One attempt: send, classify the status, decode the body.
    pub async fn send_decoded<T: DeserializeOwned>(&self, req: HttpRequest) -> Result<T, ApiError> {
        let method = req.method;
        let resp = self.transport.send(req).await?;
        trace!(target: "pve.core.client", %method, url = %resp.url, status = resp.status, "response");

        if resp.is_error() {
            return Err(ApiError::from_status(resp.status, resp.url, resp.body));
        }
        self.normalizer.decode(&resp.body)
    }

    /// Build a request for `req` with the client's defaults, pool and status source.
    pub fn request<T>(&self, req: HttpRequest) -> ApiRequest<T>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        let client = self.clone();
        let mut out = ApiRequest::new(move || {
            let client = client.clone();
            let req = req.clone();
            async move { client.send_decoded(req).await }
        })
        .with_defaults(&self.defaults)
        .with_status_source(Arc::new(self.clone()));

        if let Some(pool) = &self.pool {
            out = out.with_pool(pool.clone());
        }
        out
    }

    pub fn get<T>(&self, path: impl Into<String>) -> ApiRequest<T>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        self.request(HttpRequest::new(Method::Get, path))
    }

    pub fn post<T>(&self, path: impl Into<String>, body: Option<Value>) -> ApiRequest<T>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        self.request(with_body(HttpRequest::new(Method::Post, path), body))
    }

    pub fn put<T>(&self, path: impl Into<String>, body: Option<Value>) -> ApiRequest<T>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        self.request(with_body(HttpRequest::new(Method::Put, path), body))
    }

    pub fn delete<T>(&self, path: impl Into<String>) -> ApiRequest<T>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        self.request(HttpRequest::new(Method::Delete, path))
    }

    /// Wait for a task obtained elsewhere and return its final status.
    pub async fn wait_for_task(
        &self,
        upid: &Upid,
        check_delay: Duration,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus, ApiError> {
        let poller = TaskPoller::new(Arc::new(self.clone()), check_delay, self.pool());
        let handle = poller.spawn(upid.clone(), CancellationToken::new())?;
        TimeoutGuard::new(timeout).watch(handle).await
    }
}

fn with_body(req: HttpRequest, body: Option<Value>) -> HttpRequest {
    match body {
        Some(body) => req.with_body(body),
        None => req,
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn task_status(&self, upid: &Upid) -> Result<TaskStatus, ApiError> {
        let path = format!("nodes/{}/tasks/{}/status", upid.node(), upid.as_str());
        self.send_decoded(HttpRequest::new(Method::Get, path)).await
    }
}
