use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing API call. `path` is relative to the API root (`nodes/pve/qemu/100/status/start`).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response as seen by the transport; status classification happens in the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Sends a request and returns the raw status and body.
///
/// Implementations report failures without a response (DNS, TLS, reset) as
/// [`ApiError::Network`]; any status, including `>= 400`, is returned as a response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_parts() {
        let req = HttpRequest::post("nodes/pve/qemu/100/clone")
            .with_query("full", 1)
            .with_header("CSRFPreventionToken", "abc")
            .with_body(serde_json::json!({"newid": 101}));

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "nodes/pve/qemu/100/clone");
        assert_eq!(req.query, vec![("full".to_string(), "1".to_string())]);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.body, Some(serde_json::json!({"newid": 101})));
    }

    #[test]
    fn error_statuses() {
        assert!(!HttpResponse::new(200, "u", "").is_error());
        assert!(!HttpResponse::new(399, "u", "").is_error());
        assert!(HttpResponse::new(400, "u", "").is_error());
        assert!(HttpResponse::new(503, "u", "").is_error());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
