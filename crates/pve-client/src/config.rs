use std::time::Duration;

use pve_core::RequestDefaults;
use pve_model::RetryPolicy;
use reqwest::Url;

use crate::errors::ConfigError;

const ENV_HOST: &str = "PVE_HOST";
const ENV_PORT: &str = "PVE_PORT";
const ENV_API_TOKEN: &str = "PVE_API_TOKEN";
const ENV_VERIFY_TLS: &str = "PVE_VERIFY_TLS";

/// Connection settings and per-request defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name or address; may carry an explicit `http://` or `https://` scheme.
    pub host: String,
    pub port: u16,
    /// `USER@REALM!TOKENID=SECRET`, sent as `Authorization: PVEAPIToken=<token>`.
    pub api_token: Option<String>,
    pub verify_tls: bool,
    pub connect_timeout_ms: u64,

    pub retry: RetryPolicy,
    pub task_check_delay_ms: u64,
    pub task_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8006,
            api_token: None,
            verify_tls: true,
            connect_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            task_check_delay_ms: 1_000,
            task_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `PVE_HOST`, `PVE_PORT`, `PVE_API_TOKEN` and `PVE_VERIFY_TLS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            cfg.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            cfg.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_PORT,
                value: port,
            })?;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            cfg.api_token = Some(token);
        }
        if let Some(verify) = lookup(ENV_VERIFY_TLS) {
            cfg.verify_tls = parse_flag(&verify).ok_or(ConfigError::InvalidEnv {
                key: ENV_VERIFY_TLS,
                value: verify,
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if strip_scheme(&self.host).1.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if let Some(token) = &self.api_token {
            let well_formed = token
                .split_once('!')
                .and_then(|(user, rest)| rest.split_once('=').map(|(id, secret)| (user, id, secret)))
                .is_some_and(|(user, id, secret)| {
                    user.contains('@') && !id.is_empty() && !secret.is_empty()
                });
            if !well_formed {
                return Err(ConfigError::InvalidToken);
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "connect_timeout_ms",
            });
        }
        if self.task_check_delay_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "task_check_delay_ms",
            });
        }
        Ok(())
    }

    /// `scheme://host[:port]/api2/json/`; the port is omitted when it is the scheme default.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let (scheme, host) = strip_scheme(&self.host);
        let host = host.trim_end_matches('/');

        let default_port = match scheme {
            "http" => 80,
            _ => 443,
        };
        let raw = if self.port == default_port {
            format!("{scheme}://{host}/api2/json/")
        } else {
            format!("{scheme}://{host}:{}/api2/json/", self.port)
        };

        Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            retry: self.retry,
            task_check_delay: Duration::from_millis(self.task_check_delay_ms),
            task_timeout: self.task_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn strip_scheme(host: &str) -> (&str, &str) {
    if let Some(rest) = host.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = host.strip_prefix("http://") {
        ("http", rest)
    } else {
        ("https", host)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 8006);
        assert!(cfg.verify_tls);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.base_url().unwrap().as_str(), "https://localhost:8006/api2/json/");

        let d = cfg.request_defaults();
        assert_eq!(d.retry.max_attempts(), 1);
        assert_eq!(d.task_check_delay, Duration::from_secs(1));
        assert_eq!(d.task_timeout, None);
    }

    #[test]
    fn base_url_omits_default_ports() {
        let cfg = ClientConfig {
            host: "pve.example.com".into(),
            port: 443,
            ..Default::default()
        };
        assert_eq!(cfg.base_url().unwrap().as_str(), "https://pve.example.com/api2/json/");

        let cfg = ClientConfig {
            host: "http://10.0.0.5/".into(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(cfg.base_url().unwrap().as_str(), "http://10.0.0.5/api2/json/");

        let cfg = ClientConfig {
            host: "http://10.0.0.5".into(),
            port: 8006,
            ..Default::default()
        };
        assert_eq!(cfg.base_url().unwrap().as_str(), "http://10.0.0.5:8006/api2/json/");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = |cfg: ClientConfig| cfg.validate().unwrap_err();

        assert!(matches!(
            bad(ClientConfig { host: "https://".into(), ..Default::default() }),
            ConfigError::EmptyHost
        ));
        assert!(matches!(
            bad(ClientConfig { port: 0, ..Default::default() }),
            ConfigError::ZeroPort
        ));
        assert!(matches!(
            bad(ClientConfig { api_token: Some("secret".into()), ..Default::default() }),
            ConfigError::InvalidToken
        ));
        assert!(matches!(
            bad(ClientConfig { task_check_delay_ms: 0, ..Default::default() }),
            ConfigError::ZeroDuration { field: "task_check_delay_ms" }
        ));
    }

    #[test]
    fn accepts_well_formed_token() {
        let cfg = ClientConfig {
            api_token: Some("root@pam!ci=0b3c1f3e-1111-2222-3333-444455556666".into()),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("PVE_HOST", "pve1.lab"),
            ("PVE_PORT", "8443"),
            ("PVE_API_TOKEN", "automation@pve!deploy=abc"),
            ("PVE_VERIFY_TLS", "false"),
        ]))
        .unwrap();

        assert_eq!(cfg.host, "pve1.lab");
        assert_eq!(cfg.port, 8443);
        assert_eq!(cfg.api_token.as_deref(), Some("automation@pve!deploy=abc"));
        assert!(!cfg.verify_tls);
    }

    #[test]
    fn env_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup(&[("PVE_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "PVE_PORT", .. }));

        let err = ClientConfig::from_lookup(lookup(&[("PVE_VERIFY_TLS", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "PVE_VERIFY_TLS", .. }));
    }
}
