mod config;
pub use config::ClientConfig;

mod errors;
pub use errors::ConfigError;

mod transport;
pub use transport::ReqwestTransport;

pub mod api;
pub use api::Proxmox;
