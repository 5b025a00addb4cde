use std::time::Duration;

use async_trait::async_trait;
use pve_core::{ApiError, HttpRequest, HttpResponse, Method, Transport};
use reqwest::{Url, header::AUTHORIZATION};
use tracing::debug;

use crate::{config::ClientConfig, errors::ConfigError};

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base: Url,
    auth: Option<String>,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .build()?;

        Ok(Self {
            http,
            base: cfg.base_url()?,
            auth: cfg.api_token.as_ref().map(|t| format!("PVEAPIToken={t}")),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, req: &HttpRequest) -> Result<Url, ApiError> {
        let mut url = self
            .base
            .join(req.path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("bad path {:?}: {e}", req.path)))?;

        if !req.query.is_empty() {
            url.query_pairs_mut().extend_pairs(req.query.iter());
        }
        Ok(url)
    }
}

fn method(m: Method) -> reqwest::Method {
    match m {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = self.url(&req)?;

        let mut builder = self.http.request(method(req.method), url.clone());
        if let Some(auth) = &self.auth {
            builder = builder.header(AUTHORIZATION, auth.as_str());
        }
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        debug!(target: "pve.client.http", method = %req.method, url = %url, status, "request completed");
        Ok(HttpResponse::new(status, url.to_string(), body))
    }
}
